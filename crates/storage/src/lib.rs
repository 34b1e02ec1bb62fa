//! Paged record store: fixed-size pages holding fixed-width rows.
//!
//! Every table file is a flat sequence of [`PAGE_SIZE`] pages. A page starts
//! with an 8-byte header (big-endian page id, big-endian row count) followed
//! by rows appended in insertion order. Rows are fixed-width per table, each
//! column space-padded on the right, so slot access is a constant-offset read.
//! Pages never shrink and rows are never deleted.


pub use common::{PAGE_HEADER_SIZE, PAGE_SIZE};

use common::{DbError, DbResult, PageId};

/// One in-memory page image.
///
/// The id embedded in the header must equal the id under which the page is
/// indexed on disk; the buffer layer checks that on load.
#[derive(Debug, Clone)]
pub struct Page {
    id: PageId,
    data: Vec<u8>,
}

impl Page {
    /// A fresh, empty page with its header initialized.
    pub fn new(id: PageId) -> Self {
        let mut page = Self {
            id,
            data: vec![0u8; PAGE_SIZE],
        };
        page.data[0..4].copy_from_slice(&id.0.to_be_bytes());
        page
    }

    /// Rebuild a page from raw disk bytes.
    ///
    /// A header id that disagrees with `expected` is a corruption fault; per
    /// the degradation policy it is logged and patched to the derived id so
    /// the engine stays traversable.
    pub fn from_disk(expected: PageId, data: Vec<u8>) -> DbResult<Self> {
        if data.len() != PAGE_SIZE {
            return Err(DbError::Corrupt(format!(
                "page {} has {} bytes, expected {}",
                expected.0,
                data.len(),
                PAGE_SIZE
            )));
        }
        let mut page = Self { id: expected, data };
        let embedded = page.embedded_id();
        if embedded != expected {
            log::warn!(
                "page header id {} disagrees with file offset id {}, trusting the offset",
                embedded.0,
                expected.0
            );
            page.data[0..4].copy_from_slice(&expected.0.to_be_bytes());
        }
        Ok(page)
    }

    /// The id this page is indexed under.
    pub fn id(&self) -> PageId {
        self.id
    }

    /// The id stored in the page header bytes.
    pub fn embedded_id(&self) -> PageId {
        PageId(u32::from_be_bytes(self.data[0..4].try_into().unwrap()))
    }

    /// Number of rows (or, for index nodes, keys) recorded in the header.
    pub fn row_count(&self) -> u32 {
        u32::from_be_bytes(self.data[4..8].try_into().unwrap())
    }

    pub fn set_row_count(&mut self, count: u32) {
        self.data[4..8].copy_from_slice(&count.to_be_bytes());
    }

    /// Raw page bytes, header included.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// One fixed-width column of a table layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub width: usize,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, width: usize) -> Self {
        Self {
            name: name.into(),
            width,
        }
    }
}

/// Column width used when a materialized layout has no better information.
pub const DEFAULT_COLUMN_WIDTH: usize = 30;

/// A table's row layout: ordered fixed-width columns.
///
/// The three IMDB tables are provided as constructors; ad-hoc layouts (for
/// materialized intermediates) are built with [`TableLayout::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    name: String,
    columns: Vec<ColumnDef>,
    row_size: usize,
}

impl TableLayout {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        let row_size = columns.iter().map(|c| c.width).sum();
        Self {
            name: name.into(),
            columns,
            row_size,
        }
    }

    /// Movies(movieId 9, title 30), row size 39.
    pub fn movies() -> Self {
        Self::new(
            "Movies",
            vec![ColumnDef::new("movieId", 9), ColumnDef::new("title", 30)],
        )
    }

    /// WorkedOn(movieId 9, personId 10, category 20), row size 39.
    pub fn worked_on() -> Self {
        Self::new(
            "WorkedOn",
            vec![
                ColumnDef::new("movieId", 9),
                ColumnDef::new("personId", 10),
                ColumnDef::new("category", 20),
            ],
        )
    }

    /// People(personId 10, name 105), row size 115.
    pub fn people() -> Self {
        Self::new(
            "People",
            vec![ColumnDef::new("personId", 10), ColumnDef::new("name", 105)],
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn row_size(&self) -> usize {
        self.row_size
    }

    /// Rows that fit one page: ⌊(PAGE_SIZE − header) / rowSize⌋.
    pub fn max_rows(&self) -> u16 {
        ((PAGE_SIZE - PAGE_HEADER_SIZE) / self.row_size) as u16
    }

    /// Column names qualified by table name, e.g. `Movies.title`.
    pub fn qualified_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|c| format!("{}.{}", self.name, c.name))
            .collect()
    }

    /// Width of the named column, if present.
    pub fn column_width(&self, column: &str) -> Option<usize> {
        self.columns.iter().find(|c| c.name == column).map(|c| c.width)
    }

    fn slot_offset(&self, slot: u16) -> usize {
        PAGE_HEADER_SIZE + slot as usize * self.row_size
    }

    /// Read the row at `slot`, or `None` past the last occupied slot.
    ///
    /// Values come back with their right-padding trimmed.
    pub fn read_row(&self, page: &Page, slot: u16) -> Option<Vec<String>> {
        if u32::from(slot) >= page.row_count() {
            return None;
        }
        let mut offset = self.slot_offset(slot);
        let bytes = page.bytes();
        let mut values = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            let field = &bytes[offset..offset + column.width];
            values.push(decode_field(field));
            offset += column.width;
        }
        Some(values)
    }

    /// Append a row at the next slot and return it, or `None` when the page
    /// is full. A full page is not an error; the caller allocates a new one.
    pub fn insert_row(&self, page: &mut Page, values: &[String]) -> DbResult<Option<u16>> {
        if values.len() != self.columns.len() {
            return Err(DbError::Storage(format!(
                "{} row has {} values, layout has {} columns",
                self.name,
                values.len(),
                self.columns.len()
            )));
        }
        if self.is_full(page) {
            return Ok(None);
        }
        let slot = page.row_count() as u16;
        let mut offset = self.slot_offset(slot);
        let bytes = page.bytes_mut();
        for (column, value) in self.columns.iter().zip(values) {
            encode_field(&mut bytes[offset..offset + column.width], value);
            offset += column.width;
        }
        page.set_row_count(u32::from(slot) + 1);
        Ok(Some(slot))
    }

    pub fn is_full(&self, page: &Page) -> bool {
        page.row_count() >= u32::from(self.max_rows())
    }
}

/// Space-pad `value` on the right into `field`, truncating if over-long.
fn encode_field(field: &mut [u8], value: &str) {
    let bytes = value.as_bytes();
    let n = bytes.len().min(field.len());
    field[..n].copy_from_slice(&bytes[..n]);
    for b in field[n..].iter_mut() {
        *b = b' ';
    }
}

/// Inverse of [`encode_field`]: lossy-decode and trim the right padding.
fn decode_field(field: &[u8]) -> String {
    let text = String::from_utf8_lossy(field);
    text.trim_end_matches([' ', '\0']).to_string()
}
