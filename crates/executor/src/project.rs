//! Projection: renames and reorders columns, optionally materializing the
//! projected stream into a temporary file.

use crate::tuple::schema_of;
use crate::{ExecContext, Operator, Tuple};
use common::{DbError, DbResult, FileId, PageId};
use std::sync::Arc;
use storage::{ColumnDef, Page, TableLayout, DEFAULT_COLUMN_WIDTH};

/// Projection operator.
///
/// In pipelining mode each `next()` rearranges one child tuple. In
/// materializing mode the first `next()` drains the child into a temporary
/// file through the buffer pool, then reads that file back; because the file
/// persists across close/open cycles, the operator can be rewound cheaply,
/// which is what the inner side of a block nested loop join needs.
pub struct Projection {
    input: Box<dyn Operator>,
    /// (input column, output column) pairs, in output order.
    mapping: Vec<(String, String)>,
    columns: Arc<[String]>,
    mode: Mode,
}

enum Mode {
    Pipeline,
    Materialize(Materializer),
}

impl Projection {
    /// Pipelining projection.
    pub fn new(input: Box<dyn Operator>, mapping: Vec<(String, String)>) -> Self {
        let columns = schema_of(mapping.iter().map(|(_, out)| out.clone()));
        Self {
            input,
            mapping,
            columns,
            mode: Mode::Pipeline,
        }
    }

    /// Materializing projection writing to `file_name` under the pool's
    /// directory. Any pre-existing file of that name is discarded on ingest
    /// so re-execution is idempotent.
    pub fn materializing(
        input: Box<dyn Operator>,
        mapping: Vec<(String, String)>,
        file_name: impl Into<String>,
    ) -> Self {
        let columns = schema_of(mapping.iter().map(|(_, out)| out.clone()));
        let materializer = Materializer::new(file_name.into(), &columns);
        Self {
            input,
            mapping,
            columns,
            mode: Mode::Materialize(materializer),
        }
    }

    fn project(&self, tuple: &Tuple) -> DbResult<Vec<String>> {
        self.mapping
            .iter()
            .map(|(input, _)| {
                tuple
                    .get(input)
                    .map(str::to_string)
                    .ok_or_else(|| DbError::Executor(format!("no column {input:?} in input")))
            })
            .collect()
    }
}

impl Operator for Projection {
    fn open(&mut self, ctx: &mut ExecContext<'_>) -> DbResult<()> {
        match &mut self.mode {
            Mode::Pipeline => self.input.open(ctx),
            Mode::Materialize(m) => {
                m.rewind();
                if !m.ingested {
                    self.input.open(ctx)?;
                }
                Ok(())
            }
        }
    }

    fn next(&mut self, ctx: &mut ExecContext<'_>) -> DbResult<Option<Tuple>> {
        if matches!(self.mode, Mode::Pipeline) {
            return match self.input.next(ctx)? {
                Some(tuple) => {
                    let values = self.project(&tuple)?;
                    Ok(Some(Tuple::new(self.columns.clone(), values)))
                }
                None => Ok(None),
            };
        }

        if matches!(&self.mode, Mode::Materialize(m) if !m.ingested) {
            self.ingest(ctx)?;
        }
        let Mode::Materialize(m) = &mut self.mode else {
            unreachable!("checked above")
        };
        m.read_next(ctx, &self.columns)
    }

    fn close(&mut self, ctx: &mut ExecContext<'_>) -> DbResult<()> {
        match &mut self.mode {
            Mode::Pipeline => self.input.close(ctx),
            Mode::Materialize(m) => {
                let child_still_open = !m.ingested;
                m.rewind();
                if child_still_open {
                    self.input.close(ctx)?;
                }
                Ok(())
            }
        }
    }

    fn schema(&self) -> &[String] {
        &self.columns
    }
}

impl Projection {
    /// Consume the child to completion, writing every projected tuple to the
    /// temporary file, then force it. The child is closed afterwards; replays
    /// come from the file.
    fn ingest(&mut self, ctx: &mut ExecContext<'_>) -> DbResult<()> {
        let Mode::Materialize(m) = &mut self.mode else {
            return Ok(());
        };
        let file = ctx.pool.open_file(&m.file_name)?;
        ctx.pool.truncate_file(file)?;
        m.file = Some(file);

        let mut current: Option<PageId> = None;
        let mut rows = 0u64;
        while let Some(tuple) = self.input.next(ctx)? {
            let out_values = self
                .mapping
                .iter()
                .map(|(input, _)| {
                    tuple
                        .get(input)
                        .map(str::to_string)
                        .ok_or_else(|| DbError::Executor(format!("no column {input:?} in input")))
                })
                .collect::<DbResult<Vec<String>>>()?;
            let file_values: Vec<String> = m
                .file_order
                .iter()
                .map(|&i| out_values[i].clone())
                .collect();
            current = Some(append_row(ctx, file, &m.layout, &file_values, current)?);
            rows += 1;
        }
        ctx.pool.force(file)?;
        log::debug!("materialized {rows} row(s) into {}", m.file_name);

        self.input.close(ctx)?;
        let Mode::Materialize(m) = &mut self.mode else {
            unreachable!()
        };
        m.ingested = true;
        Ok(())
    }
}

/// Append one row, continuing on `current` if it has room, else on a fresh
/// page. Pages are unpinned before returning; full pages stay dirty until
/// the final force.
fn append_row(
    ctx: &mut ExecContext<'_>,
    file: FileId,
    layout: &TableLayout,
    values: &[String],
    current: Option<PageId>,
) -> DbResult<PageId> {
    if let Some(pid) = current {
        if let Some(page) = ctx.pool.fetch_page(file, pid)? {
            let slot = layout.insert_row(page, values)?;
            ctx.pool.mark_dirty(file, pid);
            ctx.pool.unpin(file, pid);
            if slot.is_some() {
                return Ok(pid);
            }
        }
    }
    let page = ctx
        .pool
        .create_page(file)?
        .ok_or_else(|| DbError::Buffer("no free frame while materializing".into()))?;
    let pid = page.id();
    layout
        .insert_row(page, values)?
        .expect("fresh page always has room for one row");
    ctx.pool.mark_dirty(file, pid);
    ctx.pool.unpin(file, pid);
    Ok(pid)
}

/// Backing-file state for a materializing projection.
struct Materializer {
    file_name: String,
    file: Option<FileId>,
    /// On-disk layout: the 9-byte identifier column first (when the output
    /// schema has one), remaining columns at their fixed widths.
    layout: TableLayout,
    /// `file_order[i]` is the output-schema position of file column `i`.
    file_order: Vec<usize>,
    ingested: bool,
    read_page: u32,
    read_slot: u16,
    page: Option<Page>,
}

impl Materializer {
    fn new(file_name: String, out_columns: &Arc<[String]>) -> Self {
        let mut order: Vec<usize> = (0..out_columns.len()).collect();
        if let Some(pos) = out_columns.iter().position(|c| base_name(c) == "movieId") {
            order.remove(pos);
            order.insert(0, pos);
        }
        let columns = order
            .iter()
            .map(|&i| {
                let base = base_name(&out_columns[i]);
                ColumnDef::new(base, known_width(base))
            })
            .collect();
        Self {
            file_name,
            file: None,
            layout: TableLayout::new("Filtered", columns),
            file_order: order,
            ingested: false,
            read_page: 0,
            read_slot: 0,
            page: None,
        }
    }

    fn rewind(&mut self) {
        self.read_page = 0;
        self.read_slot = 0;
        self.page = None;
    }

    /// Sequential read over the backing file, emitting tuples in the output
    /// schema's column order.
    fn read_next(
        &mut self,
        ctx: &mut ExecContext<'_>,
        columns: &Arc<[String]>,
    ) -> DbResult<Option<Tuple>> {
        let file = self
            .file
            .ok_or_else(|| DbError::Executor("materialized file never created".into()))?;
        loop {
            if let Some(page) = &self.page {
                if let Some(row) = self.layout.read_row(page, self.read_slot) {
                    self.read_slot += 1;
                    let mut values = vec![String::new(); row.len()];
                    for (file_idx, &out_idx) in self.file_order.iter().enumerate() {
                        values[out_idx] = row[file_idx].clone();
                    }
                    return Ok(Some(Tuple::new(columns.clone(), values)));
                }
                self.page = None;
            }
            let pid = PageId(self.read_page);
            match ctx.pool.fetch_page(file, pid)? {
                Some(page) => {
                    let copy = page.clone();
                    ctx.pool.unpin(file, pid);
                    self.page = Some(copy);
                    self.read_page += 1;
                    self.read_slot = 0;
                }
                None => return Ok(None),
            }
        }
    }
}

fn base_name(column: &str) -> &str {
    column.rsplit('.').next().unwrap_or(column)
}

/// Width of a column in the materialized file: the table schemas' width when
/// the base name is known, 30 otherwise.
fn known_width(base: &str) -> usize {
    for layout in [
        TableLayout::movies(),
        TableLayout::worked_on(),
        TableLayout::people(),
    ] {
        if let Some(width) = layout.column_width(base) {
            return width;
        }
    }
    DEFAULT_COLUMN_WIDTH
}
