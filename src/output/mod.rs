//! Output module for exported records
//!
//! This module handles:
//! - The `Sink` capability the harvester writes validated records to
//! - JSON file and SQLite implementations of it
//! - The flattened CSV projection of the parent stream

mod tabular;
mod json_output;
mod schema;
mod sqlite_output;
mod traits;

pub use tabular::{render_parent_csv, write_parent_csv};
pub use json_output::JsonFileSink;
pub use sqlite_output::SqliteSink;
pub use traits::{OutputError, OutputResult, RunRecord, RunStatus, Sink};

use crate::config::{OutputConfig, OutputFormat};

/// Opens the sink selected by the output configuration
///
/// Existing exports in the output directory are loaded so a resumed harvest
/// extends them.
pub fn open_sink(config: &OutputConfig) -> OutputResult<Box<dyn Sink>> {
    std::fs::create_dir_all(&config.directory)?;
    Ok(match config.format {
        OutputFormat::Json => Box::new(JsonFileSink::open(&config.directory)?),
        OutputFormat::Sqlite => Box::new(SqliteSink::open(&config.directory.join("harvest.db"))?),
    })
}
