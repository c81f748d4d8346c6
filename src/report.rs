use color_eyre::eyre::Context;
use color_eyre::Result;

use crate::args::Args;
use crate::collection::JobCollection;
use crate::error::Error;
use crate::job::Record;
use crate::render::{OutputRenderer, RenderOptions};
use crate::slurm::{Sacct, SlurmConfig};

/// Reports with more jobs than this are shown in a pager on terminals
pub const MAX_ENTRIES_TO_ECHO: usize = 20;

/// No jobs could be selected from the command-line arguments
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct SelectionError(#[from] pub Error);

/// Rendered report
#[derive(Debug)]
pub struct Report {
    pub output: String,
    /// Number of jobs in the report
    pub jobs: usize,
}

impl Report {
    /// Whether the report is too long to print directly to a terminal
    pub fn needs_pager(&self, terminal: bool) -> bool {
        terminal && self.jobs > MAX_ENTRIES_TO_ECHO
    }
}

/// Queries sacct for the jobs selected by `args` and renders the report
pub fn report(args: &Args, color: bool) -> Result<Report> {
    let mut collection = JobCollection::new();
    if let Some(pattern) = &args.slurm_format {
        collection.set_custom_seff_format(pattern)?;
    }

    let mut sacct = Sacct::new(&args.sacct);
    let renderer = OutputRenderer::new(
        &sacct.valid_formats()?,
        &args.format_string(),
        RenderOptions {
            node: args.node,
            gpu: args.node_and_gpu,
            parsable: args.parsable,
            delimiter: args.delimiter.clone(),
            color,
        },
    )?;

    let text = |value: &Option<String>| value.clone().unwrap_or_default();
    sacct.set_state(&text(&args.state));
    sacct.set_not_state(&text(&args.not_state));
    sacct.set_since(&text(&args.since));
    sacct.set_until(&text(&args.until));
    sacct.set_partition(&text(&args.partition));
    sacct.set_cluster(&text(&args.cluster));
    sacct.set_extra_args(&text(&args.extra_args));

    let add_job = select_jobs(args, &mut collection, &mut sacct).map_err(SelectionError)?;

    match SlurmConfig::collect(&args.scontrol, sacct.cluster()) {
        Ok(config) => collection.set_partition_limits(config.timelimits),
        Err(error) => log::warn!("partition time limits unavailable: {:#}", error),
    }

    let records = sacct.query(renderer.query_columns(), &collection.job_ids())?;
    process_records(&mut collection, &records, add_job)?;
    collection.filter_by_array_size(args.array_min_size);

    let jobs: Vec<_> = collection
        .get_sorted_jobs(args.modified_sort)
        .into_iter()
        .filter(|job| job.state.is_some())
        .collect();

    Ok(Report {
        output: renderer.format_jobs(&jobs),
        jobs: jobs.len(),
    })
}

/// Selects jobs by user, by time window or from the positional arguments.
/// Returns true if jobs found by sacct should be added to the collection.
fn select_jobs(
    args: &Args,
    collection: &mut JobCollection,
    sacct: &mut Sacct,
) -> Result<bool, Error> {
    if let Some(user) = args.user.as_deref().filter(|user| !user.is_empty()) {
        sacct.set_user(user);
        Ok(true)
    } else if sacct.has_since() && args.jobs.is_empty() {
        sacct.all_users();
        Ok(true)
    } else {
        collection.set_jobs(&args.jobs)?;
        Ok(false)
    }
}

/// Folds accounting records into the collection, stopping at the first
/// record that cannot be interpreted
pub fn process_records(
    collection: &mut JobCollection,
    records: &[Record],
    add_job: bool,
) -> Result<()> {
    for record in records {
        collection
            .process_entry(record, add_job)
            .wrap_err_with(|| format!("Error processing entry: {:?}", record))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(values: &[(&str, &str)]) -> Record {
        values
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_process_records() {
        let mut collection = JobCollection::new();
        collection.set_jobs(&["24418435"]).unwrap();

        let records = [
            record(&[("JobID", "24418435"), ("State", "COMPLETED"), ("Elapsed", "00:01:00")]),
            record(&[("JobID", "24418435.batch"), ("State", "COMPLETED")]),
            record(&[("JobID", "99"), ("State", "RUNNING")]),
        ];
        process_records(&mut collection, &records, false).unwrap();

        assert_eq!(collection.len(), 1);
        let job = collection.get("24418435").unwrap();
        assert_eq!(job.state.as_deref(), Some("COMPLETED"));
    }

    #[test]
    fn test_process_records_add_job() {
        let mut collection = JobCollection::new();
        let records = [record(&[("JobID", "99"), ("State", "RUNNING")])];
        process_records(&mut collection, &records, true).unwrap();

        assert_eq!(collection.job_ids(), vec!["99"]);
    }

    #[test]
    fn test_process_records_error() {
        let mut collection = JobCollection::new();
        collection.set_jobs(&["7"]).unwrap();

        let records = [record(&[("JobID", "7"), ("State", "COMPLETED"), ("Elapsed", "soon")])];
        let error = process_records(&mut collection, &records, false).unwrap_err();

        assert!(error.to_string().starts_with("Error processing entry: "));
        assert!(matches!(
            error.downcast_ref::<Error>(),
            Some(Error::Duration(value)) if value == "soon"
        ));
    }

    #[test]
    fn test_needs_pager() {
        let report = |jobs| Report {
            output: String::new(),
            jobs,
        };

        assert!(!report(MAX_ENTRIES_TO_ECHO).needs_pager(true));
        assert!(report(MAX_ENTRIES_TO_ECHO + 1).needs_pager(true));
        assert!(!report(MAX_ENTRIES_TO_ECHO + 1).needs_pager(false));
    }

    #[test]
    fn test_select_jobs_error() {
        let args: Args = argh::FromArgs::from_args(&["seffreport"], &["not-a-job"]).unwrap();
        let mut collection = JobCollection::new();
        let mut sacct = Sacct::new("sacct");

        let error = select_jobs(&args, &mut collection, &mut sacct).unwrap_err();
        assert!(matches!(error, Error::NoValidJobs));
    }

    #[test]
    fn test_select_jobs_user() {
        let args: Args = argh::FromArgs::from_args(&["seffreport"], &["-u", "user1"]).unwrap();
        let mut collection = JobCollection::new();
        let mut sacct = Sacct::new("sacct");

        assert!(select_jobs(&args, &mut collection, &mut sacct).unwrap());
        assert!(collection.is_empty());
    }
}
