//! Result rows and row mapping traits.

use crate::error::{OrmError, OrmResult};
use crate::sql::AliasMap;
use crate::value::{FromValue, Value};

/// An ordered mapping of column name to value.
///
/// Used both for rows read from the backend and for column/value payloads
/// handed to the insert and update helpers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`Row::insert`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Set a column, replacing an existing value in place.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.columns.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.columns.push((name, value)),
        }
    }

    /// Remove a column and return its value.
    pub fn take(&mut self, name: &str) -> Option<Value> {
        let idx = self.columns.iter().position(|(n, _)| n == name)?;
        Some(self.columns.remove(idx).1)
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Typed value of a column. A missing column is a decode error.
    pub fn get<T: FromValue>(&self, name: &str) -> OrmResult<T> {
        let value = self
            .value(name)
            .ok_or_else(|| OrmError::decode(name, "no such column in row"))?;
        T::from_value(name, value)
    }

    /// Typed value of a column by position.
    pub fn get_idx<T: FromValue>(&self, idx: usize) -> OrmResult<T> {
        let (name, value) = self
            .columns
            .get(idx)
            .ok_or_else(|| OrmError::decode(format!("#{idx}"), "column index out of range"))?;
        T::from_value(name, value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.value(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Rename aliased columns back to the names they were selected from.
    ///
    /// Columns that are not aliases are left alone.
    pub fn remap_aliases(&mut self, aliases: &AliasMap) {
        if aliases.is_empty() {
            return;
        }
        for (name, _) in &mut self.columns {
            if let Some(source) = aliases.get(name) {
                *name = source.to_string();
            }
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (k, v) in iter {
            row.insert(k, v);
        }
        row
    }
}

impl IntoIterator for Row {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter()
    }
}

/// Trait for types that can be built from a result [`Row`].
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> OrmResult<Self>;
}

impl FromRow for Row {
    fn from_row(row: &Row) -> OrmResult<Self> {
        Ok(row.clone())
    }
}

/// Extension trait for mapping a row set.
pub trait RowsExt {
    fn map_rows<T: FromRow>(&self) -> OrmResult<Vec<T>>;
}

impl RowsExt for [Row] {
    fn map_rows<T: FromRow>(&self) -> OrmResult<Vec<T>> {
        self.iter().map(T::from_row).collect()
    }
}
