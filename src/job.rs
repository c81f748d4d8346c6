use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;

use crate::comment::{self, GpuEfficiency, NodeEfficiency};
use crate::error::Result;
use crate::parse::{self, round1};

/// One accounting record ("step") as returned by sacct, keyed by column name
pub type Record = HashMap<String, String>;

/// A derived percentage that may not have been computed yet
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Efficiency {
    /// Not computed (yet)
    #[default]
    Unset,
    /// Computed, but undefined; e.g. CPU efficiency of a job that ran for 0 seconds
    Invalid,
    Value(f64),
}

impl Efficiency {
    pub fn is_set(self) -> bool {
        matches!(self, Efficiency::Value(_))
    }

    fn entry(self) -> Entry {
        match self {
            Efficiency::Value(value) => Entry::Percent(value),
            Efficiency::Unset | Efficiency::Invalid => Entry::Missing,
        }
    }
}

/// A single value of the report, before coloring and alignment
#[derive(Clone, Debug, PartialEq)]
pub enum Entry {
    /// Not available for this job; rendered as `---`
    Missing,
    Text(String),
    /// Efficiency in percent
    Percent(f64),
}

impl Entry {
    fn empty() -> Entry {
        Entry::Text(String::new())
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entry::Missing => f.write_str("---"),
            Entry::Text(value) => f.write_str(value),
            Entry::Percent(value) => write!(f, "{:.1}", value),
        }
    }
}

impl From<&str> for Entry {
    fn from(value: &str) -> Self {
        Entry::Text(value.to_string())
    }
}

/// Case-insensitive prefix test for ASCII column names
fn has_prefix(key: &str, prefix: &str) -> bool {
    key.len() >= prefix.len()
        && key.is_char_boundary(prefix.len())
        && key[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// Returns the value of a column, treating empty values as missing
fn value<'a>(entry: &'a Record, key: &str) -> Option<&'a str> {
    entry
        .get(key)
        .map(|v| v.as_str())
        .filter(|v| !v.is_empty())
}

fn number(entry: &Record, key: &str) -> Result<Option<u64>> {
    value(entry, key).map(|v| parse::count(key, v)).transpose()
}

/// All accounting records of a single job (or array task), combined
#[derive(Clone, Debug, PartialEq)]
pub struct Job {
    /// The base job number; shared by all tasks of an array job
    pub job: String,
    /// The job number including the array task, if any
    pub jobid: String,
    /// Output file this job was discovered from
    pub filename: Option<String>,
    /// State of the main record, without annotations such as `by <uid>`
    pub state: Option<String>,
    /// Raw `Elapsed` value of the main record
    pub time: Option<String>,
    pub time_eff: Efficiency,
    pub cpu: Efficiency,
    /// Memory efficiency from the AdminComment
    pub mem_eff: Efficiency,
    pub gpu: Efficiency,
    pub gpu_mem: Efficiency,
    /// Largest energy reported by any step
    pub energy: u64,
    /// Requested memory in bytes
    pub totalmem: Option<f64>,
    /// Largest peak memory (in bytes) of any step, multiplied by its number of tasks
    pub stepmem: f64,
    /// First non-empty value seen per column
    other_entries: HashMap<String, String>,
    /// Sums of numeric columns over all steps
    totals: HashMap<String, f64>,
    /// Per-node efficiencies from the AdminComment
    comment_data: IndexMap<String, NodeEfficiency>,
}

impl Job {
    pub fn new(job: &str, jobid: &str, filename: Option<&str>) -> Self {
        Self {
            job: job.to_string(),
            jobid: jobid.to_string(),
            filename: filename.map(|v| v.to_string()),
            state: None,
            time: None,
            time_eff: Efficiency::Unset,
            cpu: Efficiency::Unset,
            mem_eff: Efficiency::Unset,
            gpu: Efficiency::Unset,
            gpu_mem: Efficiency::Unset,
            energy: 0,
            totalmem: None,
            stepmem: 0.0,
            other_entries: HashMap::new(),
            totals: HashMap::new(),
            comment_data: IndexMap::new(),
        }
    }

    /// The filename (if set) or the job ID
    pub fn name(&self) -> &str {
        self.filename.as_deref().unwrap_or(&self.jobid)
    }

    fn is_state(&self, state: &str) -> bool {
        self.state.as_deref() == Some(state)
    }

    /// Folds an accounting record belonging to this job into its statistics
    pub fn update(&mut self, entry: &Record) -> Result<()> {
        let id = entry.get("JobID").map(|v| v.as_str()).unwrap_or_default();
        if !id.contains('.') {
            self.state = entry
                .get("State")
                .and_then(|v| v.split_whitespace().next())
                .map(|v| v.to_string());
        }

        if self.is_state("PENDING") {
            return Ok(());
        }

        if id == self.jobid {
            self.update_main_job(entry)
        } else if !self.is_state("RUNNING") {
            self.update_step(entry)
        } else {
            Ok(())
        }
    }

    fn merge_entries(&mut self, entry: &Record) {
        for (key, value) in entry {
            match self.other_entries.get_mut(key) {
                Some(current) if current.is_empty() => value.clone_into(current),
                Some(_) => {}
                None => {
                    self.other_entries.insert(key.clone(), value.clone());
                }
            }
        }
    }

    /// Updates properties from the record whose ID matches this job exactly
    fn update_main_job(&mut self, entry: &Record) -> Result<()> {
        self.merge_entries(entry);
        self.time = entry.get("Elapsed").cloned();

        let requested = match value(entry, "Timelimit") {
            Some("UNLIMITED" | "Partition_Limit") | None => 0,
            Some(limit) => parse::duration(limit)?,
        };
        let wall = match entry.get("Elapsed") {
            Some(elapsed) => parse::duration(elapsed)?,
            None => 0,
        };

        if requested != 0 {
            self.time_eff = Efficiency::Value(round1(wall as f64 / requested as f64 * 100.0));
        }

        if self.is_state("RUNNING") {
            return Ok(());
        }

        let total_cpu = parse::duration(value(entry, "TotalCPU").unwrap_or("00:00.000"))?;
        let alloc_cpus = number(entry, "AllocCPUS")?.unwrap_or(0);
        let cpu_time = if alloc_cpus != 0 {
            total_cpu as f64 / alloc_cpus as f64
        } else {
            0.0
        };

        self.cpu = if wall == 0 {
            Efficiency::Invalid
        } else {
            Efficiency::Value(round1(cpu_time / wall as f64 * 100.0))
        };

        let requested_mem = entry.get("ReqMem").or_else(|| entry.get("REQMEM"));
        if let (Some(mem), Some(nodes), Some(cpus)) = (
            requested_mem,
            number(entry, "NNodes")?,
            number(entry, "AllocCPUS")?,
        ) {
            self.totalmem = Some(parse::memory(mem, nodes, cpus)?);
        }

        if let Some(comment) = entry.get("AdminComment") {
            if comment.len() > comment::MIN_LENGTH {
                self.parse_admin_comment(comment)?;
            }
        }

        Ok(())
    }

    /// Replaces sacct efficiencies with those recorded by the stats collector
    fn parse_admin_comment(&mut self, comment: &str) -> Result<()> {
        let Some(stats) = comment::decode(comment)? else {
            return Ok(());
        };

        self.comment_data = stats.node_efficiencies();
        let nodes = self.comment_data.values();

        self.cpu = Efficiency::Value(comment::mean(nodes.clone(), |n| Some(n.cpu)));
        self.mem_eff = Efficiency::Value(comment::mean(nodes.clone(), |n| Some(n.memory)));
        if stats.gpus {
            self.gpu = Efficiency::Value(comment::mean(nodes.clone(), |n| n.gpu));
            self.gpu_mem = Efficiency::Value(comment::mean(nodes, |n| n.gpu_memory));
        }

        Ok(())
    }

    /// Updates properties from a job step, e.g. `.batch`, `.extern` or `.0`
    fn update_step(&mut self, entry: &Record) -> Result<()> {
        self.merge_entries(entry);

        for (key, value) in entry {
            if value.is_empty() {
                continue;
            }

            // Non-numeric values are not part of maxima or totals
            let Ok(amount) = parse::step_memory(value) else {
                continue;
            };

            if has_prefix(key, "max") {
                let current = self
                    .other_entries
                    .get(key)
                    .and_then(|v| parse::step_memory(v).ok());

                if current.map_or(true, |current| amount > current) {
                    self.other_entries.insert(key.clone(), value.clone());
                }
            } else if amount != 0.0 {
                *self.totals.entry(key.clone()).or_default() += amount;
            }
        }

        let mem = match entry.get("MaxRSS") {
            Some(rss) => parse::step_memory(rss)?,
            None => 0.0,
        };
        let tasks = number(entry, "NTasks")?.unwrap_or(1);
        self.stepmem = self.stepmem.max(mem * tasks as f64);

        if let Some(tres) = entry.get("TRESUsageOutAve") {
            self.energy = self.energy.max(parse::energy(tres)?);
        }

        Ok(())
    }

    /// Memory efficiency, preferring the value recorded in the AdminComment
    pub fn memory_efficiency(&self) -> Efficiency {
        match (self.mem_eff, self.totalmem) {
            (Efficiency::Value(value), _) => Efficiency::Value(value),
            (_, Some(total)) if total != 0.0 => {
                Efficiency::Value(round1(self.stepmem / total * 100.0))
            }
            _ => Efficiency::Unset,
        }
    }

    /// Returns the value of a column for this job
    pub fn get_entry(&self, key: &str) -> Entry {
        match key {
            "JobID" => return Entry::from(self.name()),
            "State" => {
                return self
                    .state
                    .as_deref()
                    .map(Entry::from)
                    .unwrap_or(Entry::Missing)
            }
            "TimeEff" => return self.time_eff.entry(),
            "CPUEff" => return self.cpu.entry(),
            "MemEff" => return self.memory_efficiency().entry(),
            "GPU" | "GPUEff" => return self.gpu.entry(),
            "GPUMem" => return self.gpu_mem.entry(),
            "Energy" => return Entry::Text(self.energy.to_string()),
            _ => {}
        }

        if let Some(value) = self.other_entries.get(key) {
            if has_prefix(key, "max") && !value.is_empty() {
                if let Ok(amount) = parse::step_memory(value) {
                    return Entry::Text(parse::bytes_to_string(amount));
                }
            }

            return Entry::from(value.as_str());
        }

        if has_prefix(key, "total") {
            if let Some(total) = self.totals.get(&key[5..]) {
                return Entry::Text(parse::bytes_to_string(*total));
            }
        }

        Entry::Missing
    }

    /// Returns the value for the job, followed by one value per node (if the job
    /// ran on more than one node) and, if `gpu` is set, one value per GPU.
    pub fn get_node_entries(&self, key: &str, gpu: bool) -> Vec<Entry> {
        let mut entries = vec![self.get_entry(key)];
        let gpu = gpu && self.gpu.is_set();

        if self.comment_data.len() > 1 || gpu {
            for (node, data) in &self.comment_data {
                entries.push(if key == "JobID" {
                    Entry::Text(format!("  {node}"))
                } else {
                    node_entry(data, key)
                });

                if gpu {
                    for (name, data) in &data.gpus {
                        entries.push(if key == "JobID" {
                            Entry::Text(format!("    {name}"))
                        } else {
                            gpu_entry(data, key)
                        });
                    }
                }
            }
        }

        entries
    }
}

fn node_entry(node: &NodeEfficiency, key: &str) -> Entry {
    let value = match key {
        "CPUEff" => Some(node.cpu),
        "MemEff" => Some(node.memory),
        "GPU" | "GPUEff" => node.gpu,
        "GPUMem" => node.gpu_memory,
        _ => None,
    };

    value
        .map(|v| Entry::Percent(round1(v)))
        .unwrap_or_else(Entry::empty)
}

fn gpu_entry(gpu: &GpuEfficiency, key: &str) -> Entry {
    match key {
        "GPU" | "GPUEff" => Entry::Percent(round1(gpu.utilization)),
        "GPUMem" => Entry::Percent(round1(gpu.memory)),
        _ => Entry::empty(),
    }
}
