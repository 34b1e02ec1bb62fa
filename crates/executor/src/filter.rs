//! Selection: filters a child stream by a predicate.

use crate::{ExecContext, Operator, Predicate, Tuple};
use common::DbResult;

/// Selection operator: passes through tuples satisfying the predicate.
pub struct Selection {
    input: Box<dyn Operator>,
    predicate: Predicate,
}

impl Selection {
    pub fn new(input: Box<dyn Operator>, predicate: Predicate) -> Self {
        Self { input, predicate }
    }
}

impl Operator for Selection {
    fn open(&mut self, ctx: &mut ExecContext<'_>) -> DbResult<()> {
        self.input.open(ctx)
    }

    fn next(&mut self, ctx: &mut ExecContext<'_>) -> DbResult<Option<Tuple>> {
        while let Some(tuple) = self.input.next(ctx)? {
            if self.predicate.matches(&tuple) {
                return Ok(Some(tuple));
            }
        }
        Ok(None)
    }

    fn close(&mut self, ctx: &mut ExecContext<'_>) -> DbResult<()> {
        self.input.close(ctx)
    }

    fn schema(&self) -> &[String] {
        self.input.schema()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{exhaust, fixture_pool, MockOperator};
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn selection_passes_matching_tuples_only() {
        let input = MockOperator::new(
            &["WorkedOn.movieId", "WorkedOn.category"],
            &[
                &["tt1", "director"],
                &["tt1", "actor"],
                &["tt2", "Directors"],
            ],
        );
        let mut selection = Selection::new(
            Box::new(input),
            Predicate::equals("WorkedOn.category", "director"),
        );

        let dir = tempdir().unwrap();
        let mut pool = fixture_pool(dir.path(), 2);
        let mut ctx = ExecContext::new(&mut pool);

        let ids: Vec<String> = exhaust(&mut selection, &mut ctx)
            .into_iter()
            .map(|t| t.get("WorkedOn.movieId").unwrap().to_string())
            .collect();
        assert_eq!(ids, ["tt1", "tt2"]);
    }

    #[test]
    fn selection_over_empty_input_is_empty() {
        let input = MockOperator::new(&["a"], &[]);
        let mut selection = Selection::new(Box::new(input), Predicate::range("a", "0", "9"));

        let dir = tempdir().unwrap();
        let mut pool = fixture_pool(dir.path(), 2);
        let mut ctx = ExecContext::new(&mut pool);
        assert!(exhaust(&mut selection, &mut ctx).is_empty());
    }

    #[test]
    fn selection_opens_and_closes_its_child_once() {
        let input = MockOperator::new(&["a"], &[&["1"]]);
        let (opens, closes) = input.counters();
        let mut selection = Selection::new(Box::new(input), Predicate::range("a", "0", "9"));

        let dir = tempdir().unwrap();
        let mut pool = fixture_pool(dir.path(), 2);
        let mut ctx = ExecContext::new(&mut pool);
        exhaust(&mut selection, &mut ctx);

        assert_eq!(opens.get(), 1);
        assert_eq!(closes.get(), 1);
    }
}
