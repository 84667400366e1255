//! Row streams that page through a select in batches.

use super::select::Select;
use crate::error::{OrmError, OrmResult};
use crate::executor::Executor;
use crate::row::{FromRow, Row};
use futures_core::Stream;
use futures_util::{StreamExt, TryStreamExt, stream};

/// Rows fetched per round trip by [`Select::stream`].
pub const STREAM_BATCH: u64 = 200;

struct Paging {
    select: Select,
    size: u64,
    next: u64,
    /// Rows the caller's own LIMIT still allows.
    remaining: Option<u64>,
    pending: Option<OrmError>,
    done: bool,
}

impl Paging {
    fn new(select: Select, size: u64) -> Self {
        let (limit, offset) = select.window();
        let pending = (size == 0).then(|| OrmError::usage("invalid batch size: 0"));
        Self {
            select,
            size,
            next: offset.unwrap_or(0),
            remaining: limit,
            pending,
            done: false,
        }
    }

    /// Rows to ask for in the next batch, `None` once paging is over.
    fn take(&self) -> Option<u64> {
        if self.done {
            return None;
        }
        match self.remaining {
            Some(0) => None,
            Some(left) => Some(left.min(self.size)),
            None => Some(self.size),
        }
    }

    fn advance(&mut self, got: u64, asked: u64) {
        self.next = self.next.saturating_add(got);
        self.remaining = self.remaining.map(|left| left.saturating_sub(got));
        self.done = got < asked;
    }
}

impl Select {
    /// Page through the matching rows `size` at a time, one `LIMIT`/`OFFSET`
    /// round trip per batch.
    ///
    /// A LIMIT or OFFSET already set on the select bounds the whole stream.
    /// The stream ends after the first short batch or the first error. Each
    /// batch is its own statement; run it inside a transaction to read a
    /// stable snapshot.
    ///
    /// ```ignore
    /// let mut batches = users.select().order_by(["id"]).batches(500, &session);
    /// while let Some(rows) = batches.try_next().await? {
    ///     index(rows).await?;
    /// }
    /// ```
    pub fn batches<'a, E: Executor>(
        self,
        size: u64,
        ex: &'a E,
    ) -> impl Stream<Item = OrmResult<Vec<Row>>> + Send + 'a {
        stream::unfold(Paging::new(self, size), move |mut paging| async move {
            if let Some(error) = paging.pending.take() {
                paging.done = true;
                return Some((Err(error), paging));
            }
            let asked = paging.take()?;
            let page = paging.select.clone().limit(asked).offset(paging.next);
            match page.fetch_rows(ex, usize::try_from(asked).ok()).await {
                Ok(rows) if rows.is_empty() => None,
                Ok(rows) => {
                    paging.advance(rows.len() as u64, asked);
                    Some((Ok(rows), paging))
                }
                Err(error) => {
                    paging.done = true;
                    Some((Err(error), paging))
                }
            }
        })
    }

    /// Every matching row, fetched [`STREAM_BATCH`] rows at a time.
    pub fn stream<'a, E: Executor>(
        self,
        ex: &'a E,
    ) -> impl Stream<Item = OrmResult<Row>> + Send + 'a {
        self.batches(STREAM_BATCH, ex)
            .map_ok(|rows| stream::iter(rows.into_iter().map(Ok::<Row, OrmError>)))
            .try_flatten()
    }

    /// [`Select::stream`] mapped through [`FromRow`].
    pub fn stream_as<'a, T, E>(self, ex: &'a E) -> impl Stream<Item = OrmResult<T>> + Send + 'a
    where
        T: FromRow + Send + 'a,
        E: Executor,
    {
        self.stream(ex).map(|row| row.and_then(|row| T::from_row(&row)))
    }
}
