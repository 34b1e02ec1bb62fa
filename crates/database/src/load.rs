//! TSV ingestion: the `pre-process` step.
//!
//! Movies are sorted by title before insertion so the table is clustered on
//! title and the index can be built in bulk-load mode from the same pass.
//! WorkedOn and People load in input order. Malformed lines are logged and
//! skipped; over-wide fields are clamped to their column width.

use crate::{MOVIES_FILE, PEOPLE_FILE, TITLE_INDEX_FILE, WORKED_ON_FILE};
use btree::BTreeIndex;
use buffer::BufferPool;
use common::{DbError, DbResult, FileId, PageId, RecordId};
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};
use storage::TableLayout;

/// Row counts loaded per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub movies: u64,
    pub worked_on: u64,
    pub people: u64,
}

pub(crate) fn preprocess(
    pool: &mut BufferPool,
    movies_tsv: &Path,
    worked_on_tsv: &Path,
    people_tsv: &Path,
) -> DbResult<IngestStats> {
    let mut stats = IngestStats::default();
    stats.movies = load_movies(pool, movies_tsv)?;
    stats.worked_on = load_table(pool, worked_on_tsv, WORKED_ON_FILE, TableLayout::worked_on())?;
    stats.people = load_table(pool, people_tsv, PEOPLE_FILE, TableLayout::people())?;
    log::info!(
        "pre-process complete: {} movies, {} worked-on, {} people",
        stats.movies,
        stats.worked_on,
        stats.people
    );
    Ok(stats)
}

/// Movies load: sort by title, insert clustered, bulk-load the title index
/// in the same order, force both files at the end of the batch.
fn load_movies(pool: &mut BufferPool, tsv: &Path) -> DbResult<u64> {
    let layout = TableLayout::movies();
    let mut rows = read_tsv(tsv, &layout)?;
    rows.sort_by(|a, b| a[1].cmp(&b[1]));

    let file = pool.open_file(MOVIES_FILE)?;
    pool.truncate_file(file)?;
    let mut index: BTreeIndex = BTreeIndex::create(pool, TITLE_INDEX_FILE)?;

    let mut last_page = None;
    for row in &rows {
        let rid = append_row(pool, file, &layout, row, &mut last_page)?;
        index.bulk_insert(pool, &row[1], rid)?;
    }

    pool.force(file)?;
    index.flush(pool)?;
    Ok(rows.len() as u64)
}

fn load_table(
    pool: &mut BufferPool,
    tsv: &Path,
    file_name: &str,
    layout: TableLayout,
) -> DbResult<u64> {
    let rows = read_tsv(tsv, &layout)?;
    let file = pool.open_file(file_name)?;
    pool.truncate_file(file)?;

    let mut last_page = None;
    for row in &rows {
        append_row(pool, file, &layout, row, &mut last_page)?;
    }
    pool.force(file)?;
    Ok(rows.len() as u64)
}

/// Append one row through the pool, continuing on the last page touched.
fn append_row(
    pool: &mut BufferPool,
    file: FileId,
    layout: &TableLayout,
    row: &[String],
    last_page: &mut Option<PageId>,
) -> DbResult<RecordId> {
    if let Some(pid) = *last_page {
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
        .ok_or_else(|| DbError::Buffer("no free frame while loading".into()))?;
    let pid = page.id();
    let slot = layout
        .insert_row(page, row)?
        .expect("fresh page always has room for one row");
    pool.mark_dirty(file, pid);
    pool.unpin(file, pid);
    *last_page = Some(pid);
    Ok(RecordId::new(pid, slot))
}

/// Parse a TSV file into rows matching `layout`, clamping each field to its
/// column width. Lines with the wrong column count are logged and skipped.
fn read_tsv(path: &Path, layout: &TableLayout) -> DbResult<Vec<Vec<String>>> {
    let file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            DbError::FileMissing(path.to_path_buf())
        } else {
            DbError::Io(e)
        }
    })?;
    let expected = layout.columns().len();
    let mut rows = Vec::new();
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != expected {
            log::warn!(
                "{}:{}: {} field(s), expected {}; skipping",
                path.display(),
                lineno + 1,
                fields.len(),
                expected
            );
            continue;
        }
        let row = fields
            .iter()
            .zip(layout.columns())
            .map(|(field, col)| clamp(field, col.width))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

/// Truncate to at most `width` bytes without splitting a character.
fn clamp(value: &str, width: usize) -> String {
    if value.len() <= width {
        return value.to_string();
    }
    let mut end = width;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].to_string()
}
