//! Row and join predicates.

use crate::Tuple;

/// A unary predicate over one tuple.
#[derive(Debug, Clone)]
pub enum Predicate {
    /// Inclusive string range with [`common::range_contains`] semantics: a
    /// lexical lower bound and a prefix-admitting upper bound, matching what
    /// the index range search does.
    Range {
        column: String,
        lo: String,
        hi: String,
    },
    /// Case-insensitive, whitespace-trimmed equality.
    ///
    /// For a category column matched against "director" this degrades to a
    /// substring match on "direct": IMDB category strings read variously
    /// "director", "directors", "Directors".
    Equals { column: String, target: String },
}

impl Predicate {
    pub fn range(
        column: impl Into<String>,
        lo: impl Into<String>,
        hi: impl Into<String>,
    ) -> Self {
        Self::Range {
            column: column.into(),
            lo: lo.into(),
            hi: hi.into(),
        }
    }

    pub fn equals(column: impl Into<String>, target: impl Into<String>) -> Self {
        Self::Equals {
            column: column.into(),
            target: target.into(),
        }
    }

    /// Whether `tuple` satisfies this predicate. A missing column never
    /// matches.
    pub fn matches(&self, tuple: &Tuple) -> bool {
        match self {
            Self::Range { column, lo, hi } => tuple
                .get(column)
                .map_or(false, |v| common::range_contains(lo, hi, v)),
            Self::Equals { column, target } => {
                let Some(value) = tuple.get(column) else {
                    return false;
                };
                let value = value.trim().to_lowercase();
                let target_norm = target.trim().to_lowercase();
                if column.contains("category") && target_norm == "director" {
                    value.contains("direct")
                } else {
                    value == target_norm
                }
            }
        }
    }
}

/// Equi-join predicate binding one column from each side. Comparison is
/// exact, unlike [`Predicate::Equals`].
#[derive(Debug, Clone)]
pub struct JoinPredicate {
    pub left: String,
    pub right: String,
}

impl JoinPredicate {
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
        }
    }

    pub fn matches(&self, left: &Tuple, right: &Tuple) -> bool {
        match (left.get(&self.left), right.get(&self.right)) {
            (Some(l), Some(r)) => l == r,
            _ => false,
        }
    }
}
