mod config;
mod jobs;
mod misc;

pub use config::SlurmConfig;
pub use jobs::Sacct;
