//! Table-level helpers keyed by primary key.
//!
//! Each helper builds one statement, normalizes written values against the
//! table description first, and runs on any [`Executor`].

use crate::builder::Statement;
use crate::error::{OrmError, OrmResult};
use crate::executor::Executor;
use crate::expr::IntoExpr;
use crate::row::Row;
use crate::schema::Table;
use crate::sql::Dialect;
use crate::value::{FromValue, Value};

impl Table {
    /// The row whose primary key equals `id`.
    pub async fn get(&self, id: impl Into<Value>, ex: &impl Executor) -> OrmResult<Option<Row>> {
        let pk = self.require_primary_key()?;
        self.select()
            .filter(self.col(&pk.name).eq(id.into()))
            .get(ex)
            .await
    }

    /// Rows whose primary key is one of `ids`, in server order.
    pub async fn get_many<I, V>(&self, ids: I, ex: &impl Executor) -> OrmResult<Vec<Row>>
    where
        I: IntoIterator<Item = V>,
        V: IntoExpr,
    {
        let pk = self.require_primary_key()?;
        self.select()
            .filter(self.col(&pk.name).in_(ids))
            .all(ex)
            .await
    }

    /// Insert one row and return the generated id, when there is one.
    ///
    /// Postgres reads the id back through `RETURNING`.
    pub async fn add(&self, row: Row, ex: &impl Executor) -> OrmResult<Option<i64>> {
        let row = self.normalize_insert(row, false)?;
        let insert = self.insert().values(row);

        match (ex.dialect(), self.primary_key()) {
            (Dialect::Postgres, Some(pk)) => {
                let rows = insert.returning(pk.name.clone()).query(ex).await?;
                match rows.first().and_then(|r| r.value(&pk.name)) {
                    Some(Value::Null) | None => Ok(None),
                    Some(id) => i64::from_value(&pk.name, id).map(Some),
                }
            }
            _ => Ok(insert.execute(ex).await?.last_insert_id),
        }
    }

    /// Insert a batch of rows in one statement; returns the affected count.
    pub async fn add_many(
        &self,
        rows: impl IntoIterator<Item = Row>,
        ex: &impl Executor,
    ) -> OrmResult<u64> {
        let rows = rows
            .into_iter()
            .map(|row| self.normalize_insert(row, false))
            .collect::<OrmResult<Vec<_>>>()?;
        if rows.is_empty() {
            return Ok(0);
        }
        let result = self.insert().values_many(rows).execute(ex).await?;
        Ok(result.affected_rows)
    }

    /// Update the row whose primary key equals `id`; returns the affected count.
    pub async fn set(
        &self,
        id: impl Into<Value>,
        values: Row,
        ex: &impl Executor,
    ) -> OrmResult<u64> {
        let pk = self.require_primary_key()?;
        let values = self.normalize_update(values)?;
        if values.contains(&pk.name) {
            return Err(OrmError::usage(format!(
                "primary key {} cannot be updated",
                pk.name
            )));
        }
        let result = self
            .update()
            .set_row(values)
            .filter(self.col(&pk.name).eq(id.into()))
            .execute(ex)
            .await?;
        Ok(result.affected_rows)
    }

    /// Delete the row whose primary key equals `id`; returns the affected count.
    pub async fn remove(&self, id: impl Into<Value>, ex: &impl Executor) -> OrmResult<u64> {
        let pk = self.require_primary_key()?;
        let result = self
            .delete()
            .filter(self.col(&pk.name).eq(id.into()))
            .execute(ex)
            .await?;
        Ok(result.affected_rows)
    }

    /// Insert or overwrite one row by primary key; returns the affected count.
    pub async fn save(&self, row: Row, ex: &impl Executor) -> OrmResult<u64> {
        let row = self.normalize_insert(row, true)?;
        let result = self.replace().values(row).execute(ex).await?;
        Ok(result.affected_rows)
    }

    /// `CREATE TABLE IF NOT EXISTS`, followed by any separate index statements.
    pub async fn create_table(&self, ex: &impl Executor) -> OrmResult<()> {
        let create = self.create();
        create.execute(ex).await?;
        for query in create.index_queries(ex.dialect())? {
            ex.execute(&query).await?;
        }
        Ok(())
    }

    /// `DROP TABLE`.
    pub async fn drop_table(&self, ex: &impl Executor) -> OrmResult<()> {
        self.drop().execute(ex).await?;
        Ok(())
    }
}
