//! Decoding of the job statistics stored in the Slurm AdminComment field.
//!
//! The collector writes `JS1:<base64 of gzipped JSON>`; any comment that does
//! not start with `JS` was written by someone else and is ignored.
use std::io::Read;

use base64ct::{Base64, Encoding as _};
use flate2::read::GzDecoder;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};

use crate::error::{Error, Result};
use crate::parse::round1;

/// Comments shorter than this carry a bare tag (e.g. `JS1:Short`) and no statistics
pub const MIN_LENGTH: usize = 10;

const SUPPORTED_VERSIONS: [&str; 1] = ["JS1"];

/// Statistics for a whole job, as recorded by the collector
#[derive(Clone, Debug, Deserialize)]
pub struct JobStats {
    /// Set if the job had GPUs allocated; older collectors write the GPU count
    #[serde(deserialize_with = "truthy")]
    pub gpus: bool,
    /// Wall time of the job in seconds
    pub total_time: f64,
    pub nodes: IndexMap<String, NodeStats>,
}

/// Statistics for one node of a job
#[derive(Clone, Debug, Deserialize)]
pub struct NodeStats {
    pub cpus: u64,
    /// Allocated memory in bytes
    pub total_memory: f64,
    /// CPU time summed over all cores, in seconds
    pub total_time: f64,
    /// Peak memory in bytes
    pub used_memory: f64,
    pub gpu_total_memory: Option<IndexMap<String, f64>>,
    pub gpu_used_memory: Option<IndexMap<String, f64>>,
    pub gpu_utilization: Option<IndexMap<String, f64>>,
}

/// Efficiency of a single GPU, in percent
#[derive(Clone, Debug, PartialEq)]
pub struct GpuEfficiency {
    pub utilization: f64,
    pub memory: f64,
}

/// Efficiencies of a single node, in percent
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeEfficiency {
    pub cpu: f64,
    pub memory: f64,
    /// Mean utilization of the GPUs on this node
    pub gpu: Option<f64>,
    /// Mean memory efficiency of the GPUs on this node
    pub gpu_memory: Option<f64>,
    pub gpus: IndexMap<String, GpuEfficiency>,
}

fn truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Number(f64),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(value) => value,
        Flag::Number(value) => value != 0.0,
    })
}

/// Decodes an AdminComment.
///
/// Returns `Ok(None)` for comments written by other tools, and an error for
/// collector comments with an unknown version or a corrupt payload.
pub fn decode(comment: &str) -> Result<Option<JobStats>> {
    if !comment.starts_with("JS") {
        return Ok(None);
    }

    let version = comment.get(..3).unwrap_or(comment);
    if !SUPPORTED_VERSIONS.contains(&version) {
        return Err(Error::CommentType(version.to_string()));
    }

    let failed = |reason: String| Error::Comment {
        comment: comment.to_string(),
        reason,
    };

    let payload = comment.get(4..).unwrap_or_default();
    let compressed = Base64::decode_vec(payload).map_err(|err| failed(err.to_string()))?;

    let mut json = Vec::new();
    GzDecoder::new(compressed.as_slice())
        .read_to_end(&mut json)
        .map_err(|err| failed(err.to_string()))?;

    serde_json::from_slice(&json)
        .map(Some)
        .map_err(|err| failed(err.to_string()))
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator * 100.0
    }
}

impl NodeStats {
    /// Derives the efficiencies of this node; `job_time` is the wall time of the job
    pub fn efficiency(&self, job_time: f64, gpus: bool) -> NodeEfficiency {
        let cpu = if self.cpus == 0 || job_time == 0.0 {
            0.0
        } else {
            ratio(self.total_time / self.cpus as f64, job_time)
        };

        let mut result = NodeEfficiency {
            cpu,
            memory: ratio(self.used_memory, self.total_memory),
            ..Default::default()
        };

        if let (true, Some(total_memory)) = (gpus, &self.gpu_total_memory) {
            let value = |values: &Option<IndexMap<String, f64>>, gpu: &str| {
                values
                    .as_ref()
                    .and_then(|v| v.get(gpu))
                    .copied()
                    .unwrap_or_default()
            };

            for (gpu, total) in total_memory {
                result.gpus.insert(
                    gpu.clone(),
                    GpuEfficiency {
                        utilization: value(&self.gpu_utilization, gpu),
                        memory: round1(ratio(value(&self.gpu_used_memory, gpu), *total)),
                    },
                );
            }

            result.gpu = Some(mean(result.gpus.values(), |g| Some(g.utilization)));
            result.gpu_memory = Some(mean(result.gpus.values(), |g| Some(g.memory)));
        }

        result
    }
}

impl JobStats {
    /// Per-node efficiencies, keyed by node name in the order the collector wrote them
    pub fn node_efficiencies(&self) -> IndexMap<String, NodeEfficiency> {
        self.nodes
            .iter()
            .map(|(name, node)| (name.clone(), node.efficiency(self.total_time, self.gpus)))
            .collect()
    }
}

/// Unweighted mean over all items, rounded to one decimal. Items without a
/// value still count towards the number of items.
pub fn mean<'a, T, I, F>(items: I, value: F) -> f64
where
    T: 'a,
    I: IntoIterator<Item = &'a T>,
    F: Fn(&T) -> Option<f64>,
{
    let mut sum = 0.0;
    let mut count = 0usize;
    for item in items {
        sum += value(item).unwrap_or_default();
        count += 1;
    }

    if count == 0 {
        0.0
    } else {
        round1(sum / count as f64)
    }
}
