//! Rendering of jobs as a table, as bare values or as delimited text
mod column;

use std::collections::BTreeSet;

pub use column::{Alignment, ColorScheme, ColumnFormatter, DERIVED};

use crate::error::Result;
use crate::job::Job;

/// Columns needed to match records to jobs, regardless of output
const REQUIRED: [&str; 4] = ["JobID", "JobIDRaw", "State", "AdminComment"];

/// Columns that derived values are computed from
fn derived_columns(title: &str) -> Option<&'static [&'static str]> {
    match title {
        "CPUEff" => Some(&["TotalCPU", "AllocCPUS", "Elapsed"]),
        "MemEff" => Some(&["ReqMem", "NNodes", "AllocCPUS", "MaxRSS", "NTasks"]),
        "TimeEff" => Some(&["Elapsed", "Timelimit"]),
        "Energy" => Some(&["TRESUsageOutAve"]),
        // Taken from the AdminComment
        "GPU" | "GPUEff" | "GPUMem" => Some(&[]),
        _ => None,
    }
}

#[derive(Clone, Debug)]
pub struct RenderOptions {
    /// Add one row per node for jobs with statistics for more than one node
    pub node: bool,
    /// Add one row per GPU; implies `node`
    pub gpu: bool,
    /// No alignment, no title formatting, and columns separated by `delimiter`
    pub parsable: bool,
    pub delimiter: String,
    /// Emit ANSI colors and bold titles
    pub color: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            node: false,
            gpu: false,
            parsable: false,
            delimiter: "|".to_string(),
            color: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct OutputRenderer {
    formatters: Vec<ColumnFormatter>,
    query_columns: Vec<String>,
    options: RenderOptions,
}

impl OutputRenderer {
    /// Parses and validates a comma separated list of format tokens
    pub fn new(valid_titles: &[String], format: &str, mut options: RenderOptions) -> Result<Self> {
        options.node |= options.gpu;

        let mut formatters = format
            .split(',')
            .filter(|token| !token.is_empty())
            .map(ColumnFormatter::parse)
            .collect::<Result<Vec<_>>>()?;

        let columns = formatters
            .iter_mut()
            .map(|fmt| fmt.validate_title(valid_titles))
            .collect::<Result<Vec<_>>>()?;

        expand_formatters(&mut formatters, &options);

        let mut query = BTreeSet::new();
        for column in &columns {
            match derived_columns(column) {
                Some(derived) => query.extend(derived.iter().map(|v| v.to_string())),
                None => {
                    query.insert(column.clone());
                }
            }
        }
        query.extend(REQUIRED.iter().map(|v| v.to_string()));

        Ok(Self {
            formatters,
            query_columns: query.into_iter().collect(),
            options,
        })
    }

    pub fn formatters(&self) -> &[ColumnFormatter] {
        &self.formatters
    }

    /// Sorted, unique columns to request from sacct
    pub fn query_columns(&self) -> &[String] {
        &self.query_columns
    }

    /// Renders the jobs in the given order
    pub fn format_jobs(&self, jobs: &[&Job]) -> String {
        let RenderOptions {
            node,
            gpu,
            parsable,
            color,
            ..
        } = self.options;

        let mut formatters = self.formatters.clone();
        let delimiter = if parsable {
            self.options.delimiter.as_str()
        } else {
            " "
        };

        let mut lines = Vec::new();
        match formatters.as_mut_slice() {
            [] => return String::new(),
            // A single column is printed bare, e.g. for use in scripts
            [single] => single.no_formatting(),
            formatters => {
                for fmt in formatters.iter_mut() {
                    if parsable {
                        fmt.no_formatting();
                    } else {
                        fmt.compute_width(jobs, node, gpu);
                    }
                }

                let bold = color && !parsable;
                lines.push(join(formatters.iter().map(|fmt| fmt.format_title(bold)), delimiter));
            }
        }

        for job in jobs {
            if node {
                let columns: Vec<Vec<String>> = formatters
                    .iter()
                    .map(|fmt| fmt.format_node_job(job, gpu, color))
                    .collect();
                let rows = columns.iter().map(|c| c.len()).min().unwrap_or_default();

                for row in 0..rows {
                    let line = join(columns.iter().map(|c| c[row].clone()), delimiter);
                    lines.push(line.trim_end().to_string());
                }
            } else {
                let line = join(formatters.iter().map(|fmt| fmt.format_job(job, color)), delimiter);
                lines.push(line.trim_end().to_string());
            }
        }

        lines.join("\n")
    }
}

fn join<I: Iterator<Item = String>>(values: I, delimiter: &str) -> String {
    values.collect::<Vec<_>>().join(delimiter)
}

/// Adds the job ID for node reports and splits `GPU` into its two parts
fn expand_formatters(formatters: &mut Vec<ColumnFormatter>, options: &RenderOptions) {
    fn has(formatters: &[ColumnFormatter], title: &str) -> bool {
        formatters.iter().any(|fmt| fmt.title == title)
    }

    if options.node {
        if !has(formatters, "JobID") {
            formatters.insert(0, ColumnFormatter::new("JobID"));
        }

        if let Some(jobid) = formatters.iter_mut().find(|fmt| fmt.title == "JobID") {
            jobid.alignment = Alignment::Left;
        }
    }

    if let Some(idx) = formatters.iter().position(|fmt| fmt.title == "GPU") {
        formatters[idx].title = "GPUEff".to_string();

        let mut memory = formatters[idx].clone();
        memory.title = "GPUMem".to_string();
        memory.scheme = ColorScheme::Mid;
        formatters.insert(idx + 1, memory);
    }

    if options.gpu && !has(formatters, "GPUEff") && !has(formatters, "GPUMem") {
        formatters.push(ColumnFormatter::new("GPUEff"));
        formatters.push(ColumnFormatter::new("GPUMem"));
    }
}
