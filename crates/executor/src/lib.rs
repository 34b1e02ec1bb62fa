//! Physical operators: a pull-based open/next/close pipeline.
//!
//! Every operator implements [`Operator`]; parents drive children by calling
//! `next()`, which returns `Ok(Some(tuple))` until the producer is exhausted
//! and `Ok(None)` after. The whole pipeline is single-threaded and
//! cooperative; closing the top operator cascades down and is the only
//! cancellation mechanism.
//!
//! Operators never own the buffer pool. They borrow it per call through
//! [`ExecContext`], and every page they pin is unpinned on all exit paths.
//!
//! # Example
//!
//! ```no_run
//! use buffer::BufferPool;
//! use executor::{ExecContext, Operator, SeqScan};
//! use storage::TableLayout;
//!
//! let mut pool = BufferPool::new("/tmp/db", 8).unwrap();
//! let movies = pool.open_file("imdb_movies.bin").unwrap();
//! let mut scan = SeqScan::new(movies, TableLayout::movies());
//!
//! let mut ctx = ExecContext::new(&mut pool);
//! scan.open(&mut ctx).unwrap();
//! while let Some(tuple) = scan.next(&mut ctx).unwrap() {
//!     println!("{:?}", tuple.values());
//! }
//! scan.close(&mut ctx).unwrap();
//! ```

mod filter;
mod join;
mod predicate;
mod project;
mod scan;
mod tuple;

#[cfg(test)]
pub(crate) mod testing;

pub use filter::Selection;
pub use join::{BlockNestedLoopJoin, ROWS_PER_PAGE_BUDGET};
pub use predicate::{JoinPredicate, Predicate};
pub use project::Projection;
pub use scan::{IndexScan, SeqScan};
pub use tuple::Tuple;

use buffer::BufferPool;
use common::DbResult;

/// Shared execution state handed to every operator call.
pub struct ExecContext<'a> {
    pub pool: &'a mut BufferPool,
}

impl<'a> ExecContext<'a> {
    pub fn new(pool: &'a mut BufferPool) -> Self {
        Self { pool }
    }
}

/// The uniform three-method contract all physical operators implement.
pub trait Operator {
    /// Initialize internal state. Idempotent on repeated calls before close.
    fn open(&mut self, ctx: &mut ExecContext<'_>) -> DbResult<()>;

    /// Produce the next tuple, or `None` once exhausted.
    fn next(&mut self, ctx: &mut ExecContext<'_>) -> DbResult<Option<Tuple>>;

    /// Release pinned pages and any temporary state.
    fn close(&mut self, ctx: &mut ExecContext<'_>) -> DbResult<()>;

    /// Qualified column names of the tuples this operator produces.
    fn schema(&self) -> &[String];
}

/// Drive an operator tree to completion and collect every tuple.
pub fn run_to_vec(op: &mut dyn Operator, ctx: &mut ExecContext<'_>) -> DbResult<Vec<Tuple>> {
    op.open(ctx)?;
    let mut out = Vec::new();
    loop {
        match op.next(ctx) {
            Ok(Some(tuple)) => out.push(tuple),
            Ok(None) => break,
            Err(e) => {
                // Tear the pipeline down before surfacing the failure.
                let _ = op.close(ctx);
                return Err(e);
            }
        }
    }
    op.close(ctx)?;
    Ok(out)
}
