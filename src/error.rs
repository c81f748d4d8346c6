use std::path::PathBuf;

/// Failures raised while interpreting accounting records or building a report
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to parse time {0:?}")]
    Duration(String),
    #[error("Failed to parse memory {0:?}")]
    Memory(String),
    #[error("Failed to parse {key} {value:?}")]
    Number { key: String, value: String },
    #[error("Unknown comment type {0:?}")]
    CommentType(String),
    #[error("Cannot decode comment {comment:?}: {reason}")]
    Comment { comment: String, reason: String },
    #[error("Unable to parse format token {token:?}{hint}")]
    FormatToken { token: String, hint: &'static str },
    #[error("{0:?} is not a valid title. Run sacct --helpformat for a list of allowed values.")]
    Title(String),
    #[error(
        "Unable to determine jobid from {0}. Pattern should include one of ('%j', '%A', '%A_%a')"
    )]
    FilenamePattern(String),
    #[error("invalid filename pattern {pattern:?}: {source}")]
    Regex {
        pattern: String,
        source: regex::Error,
    },
    #[error("{0} does not exist!")]
    MissingDirectory(PathBuf),
    #[error("{0} contains no files!")]
    EmptyDirectory(PathBuf),
    #[error(
        "{0} contains no valid output files!\nDo you need to set a custom format with `--slurm-format`?"
    )]
    NoOutputFiles(PathBuf),
    #[error("No valid jobs provided!")]
    NoValidJobs,
    #[error("error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
