use std::collections::HashSet;
use std::process::Command;

use chrono::{Local, NaiveDate, TimeDelta};
use color_eyre::{
    eyre::{bail, Context},
    Result,
};

use super::misc::{format_string, parse_date};
use crate::job::Record;
use crate::state::JobState;

/// Separates fields in `sacct` output; unlikely to occur in job names or comments
const DELIMITER: u8 = 0x1F;

/// Builds and runs `sacct` queries for job accounting records
#[derive(Debug)]
pub struct Sacct {
    exe: String,
    user: Option<String>,
    since: Option<String>,
    until: Option<String>,
    partition: Option<String>,
    cluster: Option<String>,
    extra_args: Option<String>,
    all_users: bool,
    /// Only report jobs in these states; an empty set reports nothing
    state: Option<HashSet<JobState>>,
    /// Never report jobs in these states
    not_state: Option<HashSet<JobState>>,
}

impl Sacct {
    pub fn new(exe: &str) -> Self {
        Self {
            exe: exe.to_string(),
            user: None,
            since: None,
            until: None,
            partition: None,
            cluster: None,
            extra_args: None,
            all_users: false,
            state: None,
            not_state: None,
        }
    }

    pub fn set_user(&mut self, user: &str) {
        self.user = non_empty(user);
    }

    pub fn set_partition(&mut self, partition: &str) {
        self.partition = non_empty(partition);
    }

    pub fn set_cluster(&mut self, cluster: &str) {
        self.cluster = non_empty(cluster);
    }

    pub fn cluster(&self) -> Option<&str> {
        self.cluster.as_deref()
    }

    /// Arguments passed verbatim to `sacct`, separated by whitespace
    pub fn set_extra_args(&mut self, extra_args: &str) {
        self.extra_args = non_empty(extra_args);
    }

    /// Start of the query window; `unit=amount` pairs are relative to now
    pub fn set_since(&mut self, since: &str) {
        self.since = relative_date(since);
    }

    /// End of the query window; `unit=amount` pairs are relative to now
    pub fn set_until(&mut self, until: &str) {
        self.until = relative_date(until);
    }

    pub fn has_since(&self) -> bool {
        self.since.is_some()
    }

    /// Query jobs of every user instead of specific job IDs
    pub fn all_users(&mut self) {
        self.all_users = true;
    }

    /// Comma separated state names or codes to include
    pub fn set_state(&mut self, states: &str) {
        if states.is_empty() {
            return;
        }

        let states = parse_states(states);
        if states.is_empty() {
            log::warn!("No valid states provided to include");
        }

        self.state = Some(states);
    }

    /// Comma separated state names or codes to exclude
    pub fn set_not_state(&mut self, states: &str) {
        if states.is_empty() {
            return;
        }

        let states = parse_states(states);
        if states.is_empty() {
            log::warn!("No valid states provided to exclude");
            self.not_state = None;
        } else {
            self.not_state = Some(states);
        }
    }

    /// Column names accepted by `sacct --format`
    pub fn valid_formats(&self) -> Result<Vec<String>> {
        let output = Command::new(&self.exe)
            .arg("--helpformat")
            .output()
            .wrap_err_with(|| format!("failed to execute {:?}", self.exe))?;

        if !output.status.success() {
            bail!(
                "Error retrieving sacct options with --helpformat: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .split_whitespace()
            .map(|v| v.to_string())
            .collect())
    }

    /// Arguments selecting the jobs to query
    fn args(&self, jobs: &[String], today: NaiveDate) -> Vec<String> {
        let mut args = Vec::new();
        let mut since = self.since.clone();

        if let Some(user) = &self.user {
            if since.is_none() {
                let start = today - TimeDelta::days(7);
                since = Some(start.format("%m%d%y").to_string());
            }
            args.push(format!("--user={}", user));
        } else if self.all_users {
            args.push("--allusers".to_string());
        } else {
            args.push(format!("--jobs={}", jobs.join(",")));
        }

        if let Some(since) = since {
            args.push(format!("--starttime={}", since));
        }
        if let Some(partition) = &self.partition {
            args.push(format!("--partition={}", partition));
        }
        if let Some(cluster) = &self.cluster {
            args.push(format!("--cluster={}", cluster));
        }
        if let Some(until) = &self.until {
            args.push(format!("--endtime={}", until));
        }
        if let Some(extra_args) = &self.extra_args {
            args.extend(extra_args.split_whitespace().map(|v| v.to_string()));
        }

        args
    }

    /// Queries `sacct` for the given columns, returning one record per job or
    /// job step that passes the state filters
    pub fn query(&self, columns: &[String], jobs: &[String]) -> Result<Vec<Record>> {
        let mut args = vec![
            "--parsable2".to_string(),
            "--noheader".to_string(),
            format!("--delimiter={}", DELIMITER as char),
            format_string(columns.iter()),
        ];
        args.extend(self.args(jobs, Local::now().date_naive()));

        log::debug!("running {} {}", self.exe, args.join(" "));
        let output = Command::new(&self.exe)
            .args(&args)
            .output()
            .wrap_err_with(|| format!("failed to execute {:?}", self.exe))?;

        if !output.status.success() {
            bail!(
                "Error running sacct!\n{}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        log::debug!("{}", String::from_utf8_lossy(&output.stdout));
        let records = parse(columns, output.stdout.as_slice())?;

        Ok(self.filter(records))
    }

    /// Selects main jobs by state, keeping the steps of every selected job.
    /// Steps are not filtered themselves since their state may differ, e.g.
    /// the batch step of a job that timed out is cancelled.
    fn filter(&self, records: Vec<Record>) -> Vec<Record> {
        if self.state.is_none() && self.not_state.is_none() {
            return records;
        }

        let selected: HashSet<String> = records
            .iter()
            .filter(|record| record.get("JobID").is_some_and(|id| !id.contains('.')))
            .filter(|record| {
                // Only the first word, e.g. `CANCELLED by 1234`
                let state = record
                    .get("State")
                    .and_then(|state| state.split_whitespace().next())
                    .and_then(JobState::from_name);

                let included = match (&self.state, state) {
                    (Some(states), Some(state)) => states.contains(&state),
                    (Some(_), None) => false,
                    (None, _) => true,
                };
                let excluded = match (&self.not_state, state) {
                    (Some(states), Some(state)) => states.contains(&state),
                    _ => false,
                };

                included && !excluded
            })
            .filter_map(|record| record.get("JobID").cloned())
            .collect();

        records
            .into_iter()
            .filter(|record| {
                record
                    .get("JobID")
                    .and_then(|id| id.split('.').next())
                    .is_some_and(|id| selected.contains(id))
            })
            .collect()
    }
}

fn parse<R>(columns: &[String], reader: R) -> Result<Vec<Record>>
where
    R: std::io::Read,
{
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(DELIMITER)
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(reader);

    let mut records = Vec::new();
    for result in reader.records() {
        let result = result.wrap_err("reading sacct output")?;

        records.push(
            columns
                .iter()
                .cloned()
                .zip(result.iter().map(|v| v.to_string()))
                .collect(),
        );
    }

    Ok(records)
}

fn parse_states(states: &str) -> HashSet<JobState> {
    let mut result = HashSet::new();
    for state in states.split(',') {
        match JobState::from_filter(state) {
            Some(state) => {
                result.insert(state);
            }
            None => log::warn!("Unknown state {}", state.trim().to_uppercase()),
        }
    }

    result
}

fn relative_date(value: &str) -> Option<String> {
    if value.contains('=') {
        Some(parse_date(value, Local::now().naive_local()))
    } else {
        non_empty(value)
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, 10).unwrap()
    }

    fn jobs() -> Vec<String> {
        vec!["101".to_string(), "102".to_string()]
    }

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|v| v.to_string()).collect()
    }

    fn records(rows: &[(&str, &str)]) -> Vec<Record> {
        rows.iter()
            .map(|(jobid, state)| {
                Record::from([
                    ("JobID".to_string(), jobid.to_string()),
                    ("State".to_string(), state.to_string()),
                ])
            })
            .collect()
    }

    fn job_ids(records: &[Record]) -> Vec<&str> {
        records.iter().map(|r| r["JobID"].as_str()).collect()
    }

    #[test]
    fn test_args_jobs() {
        let sacct = Sacct::new("sacct");
        assert_eq!(sacct.args(&jobs(), today()), vec!["--jobs=101,102"]);
    }

    #[test]
    fn test_args_user_defaults_to_last_week() {
        let mut sacct = Sacct::new("sacct");
        sacct.set_user("user1");
        assert_eq!(
            sacct.args(&jobs(), today()),
            vec!["--user=user1", "--starttime=010323"]
        );
        assert!(!sacct.has_since());
    }

    #[test]
    fn test_args_all() {
        let mut sacct = Sacct::new("sacct");
        sacct.set_since("2023-01-01");
        sacct.all_users();
        sacct.set_until("2023-01-05");
        sacct.set_partition("gpu");
        sacct.set_cluster("della");
        sacct.set_extra_args("--qos=long  --nnodes=2");

        assert!(sacct.has_since());
        assert_eq!(
            sacct.args(&jobs(), today()),
            vec![
                "--allusers",
                "--starttime=2023-01-01",
                "--partition=gpu",
                "--cluster=della",
                "--endtime=2023-01-05",
                "--qos=long",
                "--nnodes=2",
            ]
        );
    }

    #[test]
    fn test_args_user_takes_precedence() {
        let mut sacct = Sacct::new("sacct");
        sacct.all_users();
        sacct.set_user("user1");
        sacct.set_since("2023-01-01");
        assert_eq!(
            sacct.args(&jobs(), today()),
            vec!["--user=user1", "--starttime=2023-01-01"]
        );
    }

    #[test]
    fn test_empty_values_are_ignored() {
        let mut sacct = Sacct::new("sacct");
        sacct.set_user("");
        sacct.set_since("");
        sacct.set_partition("");
        sacct.set_extra_args("");
        assert_eq!(sacct.args(&jobs(), today()), vec!["--jobs=101,102"]);
    }

    #[test]
    fn test_relative_since() {
        let mut sacct = Sacct::new("sacct");
        sacct.set_since("d=1");
        let since = sacct.since.clone().unwrap();
        assert_eq!(since.len(), "2023-01-10T12:00".len());
        assert!(since.contains('T'));
    }

    #[test]
    fn test_parse() {
        let output = "16|COMPLETED|00:00:02\n16.batch|COMPLETED|\n17||\n".replace('|', "\x1f");
        let records = parse(
            &columns(&["JobID", "State", "Elapsed"]),
            output.as_bytes(),
        )
        .unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0]["JobID"], "16");
        assert_eq!(records[0]["State"], "COMPLETED");
        assert_eq!(records[0]["Elapsed"], "00:00:02");
        assert_eq!(records[1]["JobID"], "16.batch");
        assert_eq!(records[1]["Elapsed"], "");
        assert_eq!(records[2]["State"], "");
    }

    #[test]
    fn test_parse_keeps_quotes() {
        let output = "1\x1f\"name\"\n";
        let records = parse(&columns(&["JobID", "JobName"]), output.as_bytes()).unwrap();
        assert_eq!(records[0]["JobName"], "\"name\"");
    }

    #[test]
    fn test_parse_states() {
        let states = parse_states("cd,TO, failed,unknown");
        assert_eq!(
            states,
            HashSet::from([JobState::Completed, JobState::Timeout, JobState::Failed])
        );
        assert!(parse_states("nope").is_empty());
    }

    fn rows() -> Vec<Record> {
        records(&[
            ("1", "COMPLETED"),
            ("1.batch", "COMPLETED"),
            ("2", "TIMEOUT"),
            ("2.batch", "CANCELLED"),
            ("2.extern", "COMPLETED"),
            ("3", "CANCELLED by 1234"),
            ("3.batch", "CANCELLED"),
        ])
    }

    #[test]
    fn test_filter_none() {
        let sacct = Sacct::new("sacct");
        assert_eq!(sacct.filter(rows()).len(), 7);
    }

    #[test]
    fn test_filter_state() {
        let mut sacct = Sacct::new("sacct");
        sacct.set_state("TO");
        assert_eq!(
            job_ids(&sacct.filter(rows())),
            vec!["2", "2.batch", "2.extern"]
        );

        sacct.set_state("CA,CD");
        assert_eq!(
            job_ids(&sacct.filter(rows())),
            vec!["1", "1.batch", "3", "3.batch"]
        );
    }

    #[test]
    fn test_filter_not_state() {
        let mut sacct = Sacct::new("sacct");
        sacct.set_not_state("CA");
        assert_eq!(
            job_ids(&sacct.filter(rows())),
            vec!["1", "1.batch", "2", "2.batch", "2.extern"]
        );
    }

    #[test]
    fn test_filter_state_and_not_state() {
        let mut sacct = Sacct::new("sacct");
        sacct.set_state("CD,TO");
        sacct.set_not_state("TIMEOUT");
        assert_eq!(job_ids(&sacct.filter(rows())), vec!["1", "1.batch"]);
    }

    #[test]
    fn test_filter_invalid_states() {
        let mut sacct = Sacct::new("sacct");
        sacct.set_not_state("invalid");
        assert!(sacct.not_state.is_none());
        assert_eq!(sacct.filter(rows()).len(), 7);

        sacct.set_state("invalid");
        assert!(sacct.filter(rows()).is_empty());
    }
}
