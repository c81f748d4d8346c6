use color_eyre::eyre::{bail, Context};
use color_eyre::Result;
use std::collections::HashMap;
use std::process::Command;

use crate::utilities::split_first;

/// Cluster configuration relevant to job efficiency
#[derive(Default, Debug)]
pub struct SlurmConfig {
    /// Maximum time limit of each partition, e.g. `7-00:00:00`, used for jobs
    /// submitted without an explicit time limit
    pub timelimits: HashMap<String, String>,
}

impl SlurmConfig {
    /// Calls `scontrol show partition` and collects relevant per-partition configuration
    pub fn collect(exe: &str, cluster: Option<&str>) -> Result<SlurmConfig> {
        let mut args = Vec::new();
        if let Some(cluster) = cluster {
            args.extend(["--cluster", cluster]);
        }
        args.extend(["show", "partition", "--oneline"]);

        log::debug!("running {} {}", exe, args.join(" "));
        let output = Command::new(exe)
            .args(&args)
            .output()
            .wrap_err_with(|| format!("failed to execute `{} show partition`", exe))?;

        if !output.status.success() {
            bail!(
                "Error retrieving information from scontrol: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Self::parse(&output.stdout)
    }

    fn parse(output: &[u8]) -> Result<SlurmConfig> {
        let mut config = SlurmConfig::default();

        for line in output.split(|&c| c == b'\n') {
            let mut values = HashMap::<&[u8], &[u8]>::new();

            for value in line.split(|&c| c.is_ascii_whitespace()) {
                if let Some((key, value)) = split_first(value, b'=') {
                    values.insert(key.trim_ascii(), value);
                }
            }

            if let (Some(partition), Some(limit)) = (
                values.get(b"PartitionName".as_slice()),
                values.get(b"MaxTime".as_slice()),
            ) {
                config.timelimits.insert(
                    String::from_utf8(partition.to_vec())?,
                    String::from_utf8(limit.to_vec())?,
                );
            } else if !line.trim_ascii().is_empty() {
                log::warn!(
                    "no partition time limit in {:?}",
                    String::from_utf8_lossy(line)
                );
            }
        }

        Ok(config)
    }
}
