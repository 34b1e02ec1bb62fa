//! In-flight records: values plus their qualified column names.

use std::sync::Arc;

/// An immutable record flowing through the pipeline.
///
/// Values and column names are index-aligned; columns are qualified
/// (`Movies.title`) and shared between tuples from the same producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuple {
    columns: Arc<[String]>,
    values: Vec<String>,
}

impl Tuple {
    pub fn new(columns: Arc<[String]>, values: Vec<String>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Value of the named column, if present.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| self.values[idx].as_str())
    }

    /// Join composition: `self`'s attributes followed by `other`'s.
    pub fn concat(&self, other: &Tuple, columns: Arc<[String]>) -> Tuple {
        debug_assert_eq!(columns.len(), self.values.len() + other.values.len());
        let mut values = Vec::with_capacity(self.values.len() + other.values.len());
        values.extend_from_slice(&self.values);
        values.extend_from_slice(&other.values);
        Tuple { columns, values }
    }

    pub fn into_values(self) -> Vec<String> {
        self.values
    }
}

/// Build a shared column list from anything string-like.
pub(crate) fn schema_of<I, S>(names: I) -> Arc<[String]>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    names.into_iter().map(Into::into).collect::<Vec<_>>().into()
}
