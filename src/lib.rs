//! Load nested CMS Part D reference-data archives into DuckDB.
//!
//! The top-level archive holds one `YYYY-MM/` folder per reporting month, each
//! with a nested archive of multi-part table archives, each of which carries
//! pipe-delimited text files. [`walk::walk`] turns that tree into a lazy
//! sequence of consolidated Arrow frames and [`duck::TableStore`] persists them.

pub mod config;
pub mod duck;
pub mod error;
pub mod logging;
pub mod names;
pub mod pipeline;
pub mod process;
pub mod report;
pub mod walk;

pub use config::{IngestConfig, InferencePolicy, TypeWidening, WriteMode};
pub use error::{IngestError, Result};
pub use pipeline::run;
pub use report::IngestReport;

/// In-memory relational frame: named, typed columns with a shared row count.
pub type Frame = arrow::record_batch::RecordBatch;
