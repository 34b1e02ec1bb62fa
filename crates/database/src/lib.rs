//! Engine facade: owns the buffer pool, wires the canonical query plan, and
//! drives ingestion.
//!
//! The one query this engine answers: every (title, director name) pair for
//! movies whose title falls in a given range.
//!
//! ```text
//! Proj[title, name](
//!   BNL[WorkedOn.personId = People.personId](
//!     BNL[Movies.movieId = WorkedOn.movieId](
//!       Proj[movieId, title](IndexScan(Movies.title) | σ[title range](Scan(Movies))),
//!       Materialize(Proj[movieId, personId](σ[category ≈ director](Scan(WorkedOn))))
//!     ),
//!     Scan(People)
//!   )
//! )
//! ```
//!
//! The movie side uses the title index when its file exists, a filtered
//! sequential scan otherwise. The director stream is materialized because the
//! inner side of a block nested loop join is rewound repeatedly, and a
//! selection over a consumed scan is not re-runnable.

mod load;

pub use load::IngestStats;

use btree::BTreeIndex;
use buffer::BufferPool;
use common::{Config, DbError, DbResult};
use executor::{
    BlockNestedLoopJoin, ExecContext, IndexScan, JoinPredicate, Operator, Predicate, Projection,
    Selection, SeqScan,
};
use std::path::Path;
use storage::TableLayout;

/// File names bound by convention.
pub const MOVIES_FILE: &str = "imdb_movies.bin";
pub const WORKED_ON_FILE: &str = "imdb_workedon.bin";
pub const PEOPLE_FILE: &str = "imdb_people.bin";
pub const TITLE_INDEX_FILE: &str = "imdb_title_index.bin";
pub const TEMP_FILTERED_FILE: &str = "imdb_temp_filtered_workedon.bin";

/// The engine: a buffer pool over the data directory plus the fixed plan.
pub struct Database {
    pool: BufferPool,
}

impl Database {
    pub fn open(config: &Config) -> DbResult<Self> {
        let pool = BufferPool::new(&config.data_dir, config.buffer_pool_frames)?;
        Ok(Self { pool })
    }

    /// Populate the three table files from tab-separated input and build the
    /// clustered title index.
    pub fn preprocess(
        &mut self,
        movies_tsv: &Path,
        worked_on_tsv: &Path,
        people_tsv: &Path,
    ) -> DbResult<IngestStats> {
        load::preprocess(&mut self.pool, movies_tsv, worked_on_tsv, people_tsv)
    }

    /// Execute the canonical plan over `[title_lo, title_hi]`, handing every
    /// (title, name) result row to `on_row`. Returns the row count.
    pub fn run_query<F>(&mut self, title_lo: &str, title_hi: &str, mut on_row: F) -> DbResult<u64>
    where
        F: FnMut(&str, &str),
    {
        for name in [MOVIES_FILE, WORKED_ON_FILE, PEOPLE_FILE] {
            let path = self.pool.path_of(name);
            if !path.exists() {
                return Err(DbError::FileMissing(path));
            }
        }

        let buffer_size = self.pool.capacity();
        let mut plan = build_query_plan(&mut self.pool, title_lo, title_hi, buffer_size)?;

        let mut ctx = ExecContext::new(&mut self.pool);
        plan.open(&mut ctx)?;
        let mut rows = 0u64;
        loop {
            match plan.next(&mut ctx) {
                Ok(Some(tuple)) => {
                    on_row(
                        tuple.get("title").unwrap_or_default(),
                        tuple.get("name").unwrap_or_default(),
                    );
                    rows += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    let _ = plan.close(&mut ctx);
                    return Err(e);
                }
            }
        }
        plan.close(&mut ctx)?;
        log::debug!("query [{title_lo}, {title_hi}] produced {rows} row(s)");
        Ok(rows)
    }

    /// Convenience wrapper collecting the result rows.
    pub fn run_query_collect(
        &mut self,
        title_lo: &str,
        title_hi: &str,
    ) -> DbResult<Vec<(String, String)>> {
        let mut out = Vec::new();
        self.run_query(title_lo, title_hi, |title, name| {
            out.push((title.to_string(), name.to_string()));
        })?;
        Ok(out)
    }

    /// The underlying pool, for tools that need page-level access.
    pub fn pool_mut(&mut self) -> &mut BufferPool {
        &mut self.pool
    }
}

/// Assemble the canonical plan. `buffer_size` feeds the joins' block budget.
pub fn build_query_plan(
    pool: &mut BufferPool,
    title_lo: &str,
    title_hi: &str,
    buffer_size: usize,
) -> DbResult<Box<dyn Operator>> {
    let movies = movie_stream(pool, title_lo, title_hi)?;

    let worked_on_file = pool.open_file(WORKED_ON_FILE)?;
    let directors = Projection::materializing(
        Box::new(Selection::new(
            Box::new(SeqScan::new(worked_on_file, TableLayout::worked_on())),
            Predicate::equals("WorkedOn.category", "director"),
        )),
        vec![
            ("WorkedOn.movieId".into(), "WorkedOn.movieId".into()),
            ("WorkedOn.personId".into(), "WorkedOn.personId".into()),
        ],
        TEMP_FILTERED_FILE,
    );

    let movie_directors = BlockNestedLoopJoin::new(
        movies,
        Box::new(directors),
        JoinPredicate::new("Movies.movieId", "WorkedOn.movieId"),
        buffer_size,
    );

    let people_file = pool.open_file(PEOPLE_FILE)?;
    let with_names = BlockNestedLoopJoin::new(
        Box::new(movie_directors),
        Box::new(SeqScan::new(people_file, TableLayout::people())),
        JoinPredicate::new("WorkedOn.personId", "People.personId"),
        buffer_size,
    );

    Ok(Box::new(Projection::new(
        Box::new(with_names),
        vec![
            ("Movies.title".into(), "title".into()),
            ("People.name".into(), "name".into()),
        ],
    )))
}

/// The movie side: an index scan over the title B+Tree when the index file
/// exists, otherwise a range selection over a sequential scan.
fn movie_stream(
    pool: &mut BufferPool,
    title_lo: &str,
    title_hi: &str,
) -> DbResult<Box<dyn Operator>> {
    let movies_file = pool.open_file(MOVIES_FILE)?;
    let layout = TableLayout::movies();

    let stream: Box<dyn Operator> = if pool.file_has_pages(TITLE_INDEX_FILE) {
        let index = BTreeIndex::open(pool, TITLE_INDEX_FILE)?;
        Box::new(IndexScan::new(
            index, movies_file, layout, title_lo, title_hi,
        ))
    } else {
        log::debug!("no title index on disk, using a filtered scan");
        Box::new(Selection::new(
            Box::new(SeqScan::new(movies_file, layout)),
            Predicate::range("Movies.title", title_lo, title_hi),
        ))
    };

    Ok(Box::new(Projection::new(
        stream,
        vec![
            ("Movies.movieId".into(), "Movies.movieId".into()),
            ("Movies.title".into(), "Movies.title".into()),
        ],
    )))
}
