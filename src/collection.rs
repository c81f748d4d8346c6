use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};
use crate::job::{Job, Record};

/// Job IDs given on the command line, e.g. `1234`, `1234_5` or `1234_[1-10]`
static JOB_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<jobid>(?P<job>[0-9]+)(_[\[\]\-0-9]+)?)$").expect("valid regex")
});
/// Default Slurm output file names, e.g. `slurm-1234.out` or `name_1234_5`
static FILE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^.*?[_-](?P<jobid>(?P<job>[0-9]+)(_[0-9]+)?)(\.out)?$").expect("valid regex")
});
/// Replacement symbols of sbatch filename patterns, e.g. `%x`
static SYMBOL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"%[^%]").expect("valid regex"));

/// All jobs that are part of a report, keyed by job ID
#[derive(Debug)]
pub struct JobCollection {
    jobs: HashMap<String, Job>,
    file_regex: Regex,
    /// Directory that output files were discovered in
    dir_name: Option<PathBuf>,
    /// Partition name to `Timelimit` value
    partition_timelimits: HashMap<String, String>,
}

impl Default for JobCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl JobCollection {
    pub fn new() -> Self {
        Self {
            jobs: HashMap::new(),
            file_regex: FILE_RE.clone(),
            dir_name: None,
            partition_timelimits: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn get(&self, jobid: &str) -> Option<&Job> {
        self.jobs.get(jobid)
    }

    /// Sorted, unique base job numbers to query
    pub fn job_ids(&self) -> Vec<String> {
        self.jobs
            .values()
            .map(|job| job.job.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn add_job(&mut self, job: &str, jobid: &str, filename: Option<&str>) {
        self.jobs
            .insert(jobid.to_string(), Job::new(job, jobid, filename));
    }

    pub fn set_partition_limits(&mut self, limits: HashMap<String, String>) {
        self.partition_timelimits = limits;
    }

    /// Adds every job whose output file is found in `directory`; an empty
    /// string refers to the current directory.
    pub fn set_out_dir(&mut self, directory: &str) -> Result<()> {
        let directory = if directory.is_empty() {
            std::env::current_dir().map_err(|source| Error::Io {
                path: PathBuf::from("."),
                source,
            })?
        } else {
            PathBuf::from(directory)
        };

        if !directory.exists() {
            return Err(Error::MissingDirectory(directory));
        }

        let io_error = |source| Error::Io {
            path: directory.clone(),
            source,
        };
        let directory = directory.canonicalize().map_err(io_error)?;

        let mut files = Vec::new();
        for entry in fs::read_dir(&directory).map_err(io_error)? {
            let entry = entry.map_err(io_error)?;
            if entry.path().is_file() {
                files.push(entry.file_name().to_string_lossy().into_owned());
            }
        }

        if files.is_empty() {
            return Err(Error::EmptyDirectory(directory));
        }

        for file in &files {
            self.process_seff_file(file);
        }

        if self.jobs.is_empty() {
            return Err(Error::NoOutputFiles(directory));
        }

        self.dir_name = Some(directory);
        Ok(())
    }

    /// Adds jobs from a list of job IDs and/or output files. An empty list
    /// searches the current directory, a single directory searches that one.
    pub fn set_jobs<S: AsRef<str>>(&mut self, jobs: &[S]) -> Result<()> {
        match jobs {
            [] => return self.set_out_dir(""),
            [single] if Path::new(single.as_ref()).is_dir() => {
                return self.set_out_dir(single.as_ref())
            }
            _ => {}
        }

        for jobid in jobs {
            let jobid = jobid.as_ref();
            if let Some(caps) = JOB_RE.captures(jobid) {
                self.add_job(&caps["job"], &caps["jobid"], None);
            } else {
                self.process_seff_file(jobid);
            }
        }

        if self.jobs.is_empty() {
            return Err(Error::NoValidJobs);
        }

        Ok(())
    }

    fn process_seff_file(&mut self, filename: &str) {
        if let Some(caps) = self.file_regex.captures(filename) {
            let (job, jobid) = (caps["job"].to_string(), caps["jobid"].to_string());
            self.add_job(&job, &jobid, Some(filename));
        }
    }

    /// Recognizes output files named by an sbatch `--output` pattern such as
    /// `%x.%A_%a.log`. The pattern must contain `%j`, `%A_%a` or `%A`.
    pub fn set_custom_seff_format(&mut self, filename_pattern: &str) -> Result<()> {
        let mut pattern = regex::escape(filename_pattern);

        if pattern.contains("%j") {
            pattern = pattern.replace("%j", "(?P<jobid>(?P<job>[0-9]+))");
        } else if pattern.contains("%A_%a") {
            pattern = pattern.replace("%A_%a", "(?P<jobid>(?P<job>[0-9]+)_[0-9]+)");
        } else if pattern.contains("%A") {
            pattern = pattern.replace("%A", "(?P<jobid>(?P<job>[0-9]+))");
        } else {
            return Err(Error::FilenamePattern(filename_pattern.to_string()));
        }

        // Any other symbols match anything; runs of symbols collapse into one wildcard
        let mut regex = String::from("^");
        let mut wildcard = false;
        let mut last = 0;
        for symbol in SYMBOL_RE.find_iter(&pattern) {
            let literal = &pattern[last..symbol.start()];
            if !literal.is_empty() {
                regex.push_str(literal);
                wildcard = false;
            }
            if !wildcard {
                regex.push_str(".*");
                wildcard = true;
            }
            last = symbol.end();
        }
        regex.push_str(&pattern[last..]);
        regex.push('$');

        self.file_regex = Regex::new(&regex).map_err(|source| Error::Regex {
            pattern: filename_pattern.to_string(),
            source,
        })?;

        Ok(())
    }

    /// Replaces the job stored under `old` with a fresh job stored under `new`,
    /// keeping its base job number and filename.
    fn rekey(&mut self, old: &str, new: &str) -> bool {
        match self.jobs.remove(old) {
            Some(job) => {
                self.add_job(&job.job, new, job.filename.as_deref());
                true
            }
            None => false,
        }
    }

    /// Forwards an accounting record to the job it belongs to. Records of
    /// unknown jobs are ignored unless `add_job` is set.
    pub fn process_entry(&mut self, entry: &Record, add_job: bool) -> Result<()> {
        let base_id = |key: &str| {
            entry
                .get(key)
                .and_then(|v| v.split('.').next())
                .unwrap_or_default()
                .to_string()
        };
        let job_id = base_id("JobID");
        let job_id_raw = base_id("JobIDRaw");

        if !self.jobs.contains_key(&job_id) {
            let job = JOB_RE
                .captures(&job_id)
                .map(|caps| caps["job"].to_string())
                .filter(|job| add_job || self.jobs.contains_key(job));

            if let Some(job) = job {
                self.add_job(&job, &job_id, None);
            } else if !self.rekey(&job_id_raw, &job_id) {
                return Ok(());
            }
        }

        let mut entry = Cow::Borrowed(entry);
        if entry.get("Timelimit").map(|v| v.as_str()) == Some("Partition_Limit") {
            let limit = entry
                .get("Partition")
                .and_then(|partition| self.partition_timelimits.get(partition))
                .cloned();
            if let Some(limit) = limit {
                entry.to_mut().insert("Timelimit".to_string(), limit);
            }
        }

        match self.jobs.get_mut(&job_id) {
            Some(job) => job.update(&entry),
            None => Ok(()),
        }
    }

    /// Drops array jobs with fewer than `min_size` tasks. Jobs that are not
    /// part of an array are always kept.
    pub fn filter_by_array_size(&mut self, min_size: usize) {
        if min_size == 0 {
            return;
        }

        let mut sizes: HashMap<String, usize> = HashMap::new();
        for job in self.jobs.values() {
            *sizes.entry(job.job.clone()).or_default() += 1;
        }

        self.jobs.retain(|jobid, job| {
            let size = sizes.get(&job.job).copied().unwrap_or_default();
            (size == 1 && !jobid.contains('_')) || size >= min_size
        });
    }

    fn path_of(&self, file: &str) -> PathBuf {
        match &self.dir_name {
            Some(dir) => dir.join(file),
            None => PathBuf::from(file),
        }
    }

    /// Jobs in display order.
    ///
    /// By default existing output files come first, then shorter names, then
    /// names in lexical order. With `change_sort`, existing output files come
    /// first with the most recently modified first, followed by the remaining
    /// jobs in numeric job ID order.
    pub fn get_sorted_jobs(&self, change_sort: bool) -> Vec<&Job> {
        let mut jobs: Vec<&Job> = self.jobs.values().collect();

        if change_sort {
            let modified = |job: &Job| -> Option<SystemTime> {
                let file = job.filename.as_deref()?;
                fs::metadata(self.path_of(file)).ok()?.modified().ok()
            };

            let mut keyed: Vec<_> = jobs
                .into_iter()
                .map(|job| (modified(job), numeric_id(&job.jobid), job))
                .collect();
            keyed.sort_by(|(a_time, a_id, a), (b_time, b_id, b)| {
                match (a_time, b_time) {
                    (Some(a_time), Some(b_time)) => b_time.cmp(a_time),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => a_id.cmp(b_id),
                }
                .then_with(|| a.jobid.cmp(&b.jobid))
            });

            return keyed.into_iter().map(|(_, _, job)| job).collect();
        }

        jobs.sort_by_cached_key(|job| {
            let path = self.path_of(job.name());
            let name = path.display().to_string();
            (!path.exists(), name.chars().count(), name, job.jobid.clone())
        });
        jobs
    }
}

/// Splits `1234_5` into `(1234, Some(5))`, ignoring any non-digits
fn numeric_id(jobid: &str) -> (u64, Option<u64>) {
    let digits = |value: &str| -> Option<u64> {
        let value: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
        value.parse().ok()
    };

    match jobid.split_once('_') {
        Some((base, task)) => (digits(base).unwrap_or_default(), digits(task)),
        None => (digits(jobid).unwrap_or_default(), None),
    }
}
