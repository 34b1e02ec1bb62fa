//! Scan operators: sequential scan and index scan.

use crate::tuple::schema_of;
use crate::{ExecContext, Operator, Tuple};
use btree::BTreeIndex;
use common::{DbResult, FileId, PageId, RecordId};
use std::sync::Arc;
use storage::{Page, TableLayout};

/// Sequential scan: every row of a file in (page, slot) order.
///
/// Keeps at most one page pinned at a time; crossing a page boundary unpins
/// the current page before fetching the next. End-of-file is a page fetch
/// returning nothing.
pub struct SeqScan {
    file: FileId,
    layout: TableLayout,
    columns: Arc<[String]>,
    next_page: u32,
    slot: u16,
    /// The pinned page's id and a decoded copy of its image for row reads.
    current: Option<(PageId, Page)>,
}

impl SeqScan {
    pub fn new(file: FileId, layout: TableLayout) -> Self {
        let columns = schema_of(layout.qualified_columns());
        Self {
            file,
            layout,
            columns,
            next_page: 0,
            slot: 0,
            current: None,
        }
    }

    fn release_current(&mut self, ctx: &mut ExecContext<'_>) {
        if let Some((pid, _)) = self.current.take() {
            ctx.pool.unpin(self.file, pid);
        }
    }
}

impl Operator for SeqScan {
    fn open(&mut self, ctx: &mut ExecContext<'_>) -> DbResult<()> {
        self.release_current(ctx);
        self.next_page = 0;
        self.slot = 0;
        Ok(())
    }

    fn next(&mut self, ctx: &mut ExecContext<'_>) -> DbResult<Option<Tuple>> {
        loop {
            if let Some((_, page)) = &self.current {
                if let Some(values) = self.layout.read_row(page, self.slot) {
                    self.slot += 1;
                    return Ok(Some(Tuple::new(self.columns.clone(), values)));
                }
                // Page exhausted: drop the pin before moving on.
                self.release_current(ctx);
            }

            let pid = PageId(self.next_page);
            match ctx.pool.fetch_page(self.file, pid)? {
                Some(page) => {
                    let copy = page.clone();
                    self.current = Some((pid, copy));
                    self.next_page += 1;
                    self.slot = 0;
                }
                None => return Ok(None),
            }
        }
    }

    fn close(&mut self, ctx: &mut ExecContext<'_>) -> DbResult<()> {
        self.release_current(ctx);
        Ok(())
    }

    fn schema(&self) -> &[String] {
        &self.columns
    }
}

/// Index scan: every row whose key falls in `[lo, hi]`, ascending by key.
///
/// The matching RIDs are collected from the tree on open; each `next()`
/// fetches the row's page, reads it, and unpins before emitting. A RID whose
/// page cannot be fetched is skipped rather than failing the scan.
pub struct IndexScan {
    index: BTreeIndex,
    file: FileId,
    layout: TableLayout,
    columns: Arc<[String]>,
    lo: String,
    hi: String,
    rids: Vec<RecordId>,
    cursor: usize,
}

impl IndexScan {
    pub fn new(
        index: BTreeIndex,
        file: FileId,
        layout: TableLayout,
        lo: impl Into<String>,
        hi: impl Into<String>,
    ) -> Self {
        let columns = schema_of(layout.qualified_columns());
        Self {
            index,
            file,
            layout,
            columns,
            lo: lo.into(),
            hi: hi.into(),
            rids: Vec::new(),
            cursor: 0,
        }
    }
}

impl Operator for IndexScan {
    fn open(&mut self, ctx: &mut ExecContext<'_>) -> DbResult<()> {
        self.rids = self.index.range_search(ctx.pool, &self.lo, &self.hi)?;
        self.cursor = 0;
        Ok(())
    }

    fn next(&mut self, ctx: &mut ExecContext<'_>) -> DbResult<Option<Tuple>> {
        while self.cursor < self.rids.len() {
            let rid = self.rids[self.cursor];
            self.cursor += 1;

            let Some(page) = ctx.pool.fetch_page(self.file, rid.page)? else {
                log::warn!(
                    "index points at unreadable page {}, skipping its rid",
                    rid.page.0
                );
                continue;
            };
            let values = self.layout.read_row(page, rid.slot);
            ctx.pool.unpin(self.file, rid.page);

            match values {
                Some(values) => return Ok(Some(Tuple::new(self.columns.clone(), values))),
                None => {
                    log::warn!(
                        "index points at empty slot {} of page {}, skipping",
                        rid.slot,
                        rid.page.0
                    );
                }
            }
        }
        Ok(None)
    }

    fn close(&mut self, _ctx: &mut ExecContext<'_>) -> DbResult<()> {
        self.rids.clear();
        self.cursor = 0;
        Ok(())
    }

    fn schema(&self) -> &[String] {
        &self.columns
    }
}
