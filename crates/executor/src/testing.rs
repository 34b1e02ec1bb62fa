//! Shared fixtures for operator tests.

use crate::tuple::schema_of;
use crate::{ExecContext, Operator, Tuple};
use buffer::BufferPool;
use common::{DbError, DbResult, FileId, PageId, RecordId};
use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;
use storage::TableLayout;

pub(crate) fn fixture_pool(dir: &std::path::Path, frames: usize) -> BufferPool {
    BufferPool::new(dir, frames).unwrap()
}

/// Append rows through the pool, allocating pages as they fill.
pub(crate) fn insert_rows(
    pool: &mut BufferPool,
    file: FileId,
    layout: &TableLayout,
    rows: &[Vec<String>],
) -> Vec<RecordId> {
    let rids = rows
        .iter()
        .map(|row| append_row(pool, file, layout, row).unwrap())
        .collect();
    pool.force(file).unwrap();
    rids
}

fn append_row(
    pool: &mut BufferPool,
    file: FileId,
    layout: &TableLayout,
    row: &[String],
) -> DbResult<RecordId> {
    let count = pool.page_count(file);
    if count > 0 {
        let pid = PageId(count - 1);
        if let Some(page) = pool.fetch_page(file, pid)? {
            let slot = layout.insert_row(page, row)?;
            pool.mark_dirty(file, pid);
            pool.unpin(file, pid);
            if let Some(slot) = slot {
                return Ok(RecordId::new(pid, slot));
            }
        }
    }
    let page = pool
        .create_page(file)?
        .ok_or_else(|| DbError::Buffer("no free frame".into()))?;
    let pid = page.id();
    let slot = layout
        .insert_row(page, row)?
        .expect("fresh page always has room");
    pool.mark_dirty(file, pid);
    pool.unpin(file, pid);
    Ok(RecordId::new(pid, slot))
}

/// Open, drain, and close an operator, returning everything it produced.
pub(crate) fn exhaust(op: &mut dyn Operator, ctx: &mut ExecContext<'_>) -> Vec<Tuple> {
    crate::run_to_vec(op, ctx).unwrap()
}

/// A canned operator that replays fixed rows, rewinding on every open.
pub(crate) struct MockOperator {
    columns: Arc<[String]>,
    rows: Vec<Vec<String>>,
    cursor: usize,
    pub opens: Rc<Cell<usize>>,
    pub closes: Rc<Cell<usize>>,
}

impl MockOperator {
    pub fn new(columns: &[&str], rows: &[&[&str]]) -> Self {
        Self {
            columns: schema_of(columns.iter().copied()),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|v| v.to_string()).collect())
                .collect(),
            cursor: 0,
            opens: Rc::new(Cell::new(0)),
            closes: Rc::new(Cell::new(0)),
        }
    }

    /// Handles to the open/close counters, for lifecycle assertions after
    /// the operator has been boxed away.
    pub fn counters(&self) -> (Rc<Cell<usize>>, Rc<Cell<usize>>) {
        (self.opens.clone(), self.closes.clone())
    }
}

impl Operator for MockOperator {
    fn open(&mut self, _ctx: &mut ExecContext<'_>) -> DbResult<()> {
        self.cursor = 0;
        self.opens.set(self.opens.get() + 1);
        Ok(())
    }

    fn next(&mut self, _ctx: &mut ExecContext<'_>) -> DbResult<Option<Tuple>> {
        if self.cursor >= self.rows.len() {
            return Ok(None);
        }
        let values = self.rows[self.cursor].clone();
        self.cursor += 1;
        Ok(Some(Tuple::new(self.columns.clone(), values)))
    }

    fn close(&mut self, _ctx: &mut ExecContext<'_>) -> DbResult<()> {
        self.closes.set(self.closes.get() + 1);
        Ok(())
    }

    fn schema(&self) -> &[String] {
        &self.columns
    }
}
