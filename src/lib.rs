/// Command-line arguments
pub mod args;
/// Jobs selected for a report
pub mod collection;
/// Decoding of job statistics stored in the AdminComment
pub mod comment;
pub mod error;
/// Accounting records folded into per-job statistics
pub mod job;
/// Parsing of sacct values
pub mod parse;
pub mod render;
/// Report pipeline
pub mod report;
/// Querying of Slurm accounting and configuration
pub mod slurm;
/// Slurm job states
pub mod state;
pub mod utilities;

pub use error::{Error, Result};
