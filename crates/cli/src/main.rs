//! Command-line entry point for the IMDB query engine.
//!
//! Two commands: `pre-process` loads the TSV inputs into the paged table
//! files and builds the title index; `run-query` executes the canonical
//! title/director query and writes CSV to stdout.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use common::Config;
use database::Database;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "imdbq", about = "Educational relational engine over IMDB-style data")]
struct Args {
    /// Directory holding the table and index files
    #[arg(long, default_value = ".")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Populate the table files from TSV input and build the title index
    PreProcess {
        /// Buffer pool size, in frames
        buffer_size: usize,

        /// Movies input: movieId \t title
        #[arg(long, default_value = "movies.tsv")]
        movies: PathBuf,

        /// WorkedOn input: movieId \t personId \t category
        #[arg(long, default_value = "workedon.tsv")]
        worked_on: PathBuf,

        /// People input: personId \t name
        #[arg(long, default_value = "people.tsv")]
        people: PathBuf,
    },
    /// Run the canonical query and print CSV rows to stdout
    RunQuery {
        /// Lower bound of the title range (inclusive)
        title_lo: String,

        /// Upper bound of the title range (inclusive)
        title_hi: String,

        /// Buffer pool size, in frames
        buffer_size: usize,
    },
}

fn main() -> ExitCode {
    env_logger::init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // clap renders help/version through the error path too; those
            // exit cleanly.
            if e.use_stderr() {
                eprintln!("{e}");
                return ExitCode::from(1);
            }
            print!("{e}");
            return ExitCode::SUCCESS;
        }
    };

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}

fn run(args: Args) -> Result<()> {
    let buffer_size = match &args.command {
        Command::PreProcess { buffer_size, .. } | Command::RunQuery { buffer_size, .. } => {
            *buffer_size
        }
    };
    anyhow::ensure!(buffer_size > 0, "buffer size must be at least 1");
    let config = Config::builder()
        .data_dir(args.data_dir)
        .buffer_pool_frames(buffer_size)
        .build();
    let mut db = Database::open(&config).context("opening database")?;

    match args.command {
        Command::PreProcess {
            movies,
            worked_on,
            people,
            ..
        } => {
            let stats = db
                .preprocess(&movies, &worked_on, &people)
                .context("pre-process failed")?;
            log::info!(
                "loaded {} movies, {} worked-on rows, {} people",
                stats.movies,
                stats.worked_on,
                stats.people
            );
        }
        Command::RunQuery {
            title_lo, title_hi, ..
        } => {
            println!("title,name");
            db.run_query(&title_lo, &title_hi, |title, name| {
                println!("{title},{name}");
            })
            .context("query failed")?;
        }
    }
    Ok(())
}
