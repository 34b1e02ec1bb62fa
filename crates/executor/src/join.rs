//! Block nested loop join.

use crate::{ExecContext, JoinPredicate, Operator, Tuple};
use common::DbResult;
use std::sync::Arc;

/// Outer tuples admitted per block, per page of budget.
///
/// The block budget is `⌊(B − 2) / 2⌋` pages (two frames stay reserved for
/// an inner page and an output page), floored at one page, times this
/// per-page multiplier.
pub const ROWS_PER_PAGE_BUDGET: usize = 100;

/// Block nested loop equi-join.
///
/// Loads outer tuples a block at a time; for each outer tuple the inner is
/// rewound (close + open) and drained, emitting the concatenation of the two
/// tuples on every predicate hit. Inner operators must therefore tolerate
/// repeated open/close cycles; a materializing projection qualifies, a
/// pipelined one does not.
///
/// Output order is outer-major, inner-minor within each block, mirroring the
/// loop nesting.
pub struct BlockNestedLoopJoin {
    outer: Box<dyn Operator>,
    inner: Box<dyn Operator>,
    predicate: JoinPredicate,
    columns: Arc<[String]>,
    block_capacity: usize,
    block: Vec<Tuple>,
    block_idx: usize,
    outer_done: bool,
    inner_open: bool,
    needs_rewind: bool,
}

impl BlockNestedLoopJoin {
    /// `buffer_size` is the pool's total frame count B; the block tuple
    /// budget is derived from it.
    pub fn new(
        outer: Box<dyn Operator>,
        inner: Box<dyn Operator>,
        predicate: JoinPredicate,
        buffer_size: usize,
    ) -> Self {
        let block_pages = (buffer_size.saturating_sub(2) / 2).max(1);
        let block_capacity = block_pages * ROWS_PER_PAGE_BUDGET;
        let columns: Arc<[String]> = outer
            .schema()
            .iter()
            .chain(inner.schema())
            .cloned()
            .collect::<Vec<_>>()
            .into();
        Self {
            outer,
            inner,
            predicate,
            columns,
            block_capacity,
            block: Vec::new(),
            block_idx: 0,
            outer_done: false,
            inner_open: false,
            needs_rewind: true,
        }
    }

    /// Pull the next block of outer tuples. Leaves the block empty once the
    /// outer is exhausted.
    fn load_block(&mut self, ctx: &mut ExecContext<'_>) -> DbResult<()> {
        self.block.clear();
        self.block_idx = 0;
        self.needs_rewind = true;
        if self.outer_done {
            return Ok(());
        }
        while self.block.len() < self.block_capacity {
            match self.outer.next(ctx)? {
                Some(tuple) => self.block.push(tuple),
                None => {
                    self.outer_done = true;
                    break;
                }
            }
        }
        Ok(())
    }

    fn rewind_inner(&mut self, ctx: &mut ExecContext<'_>) -> DbResult<()> {
        if self.inner_open {
            self.inner.close(ctx)?;
        }
        self.inner.open(ctx)?;
        self.inner_open = true;
        Ok(())
    }
}

impl Operator for BlockNestedLoopJoin {
    fn open(&mut self, ctx: &mut ExecContext<'_>) -> DbResult<()> {
        self.outer.open(ctx)?;
        self.outer_done = false;
        self.needs_rewind = true;
        self.load_block(ctx)
    }

    fn next(&mut self, ctx: &mut ExecContext<'_>) -> DbResult<Option<Tuple>> {
        loop {
            if self.block_idx >= self.block.len() {
                self.load_block(ctx)?;
                if self.block.is_empty() {
                    // Outer exhausted with no tuples left to pair.
                    return Ok(None);
                }
            }
            if self.needs_rewind {
                self.rewind_inner(ctx)?;
                self.needs_rewind = false;
            }

            let outer = self.block[self.block_idx].clone();
            while let Some(inner_tuple) = self.inner.next(ctx)? {
                if self.predicate.matches(&outer, &inner_tuple) {
                    return Ok(Some(outer.concat(&inner_tuple, self.columns.clone())));
                }
            }

            // Inner drained for this outer tuple; move along the block.
            self.block_idx += 1;
            self.needs_rewind = true;
        }
    }

    fn close(&mut self, ctx: &mut ExecContext<'_>) -> DbResult<()> {
        self.block.clear();
        self.block_idx = 0;
        self.outer.close(ctx)?;
        if self.inner_open {
            self.inner.close(ctx)?;
            self.inner_open = false;
        }
        Ok(())
    }

    fn schema(&self) -> &[String] {
        &self.columns
    }
}
