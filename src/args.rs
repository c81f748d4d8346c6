use argh::FromArgs;

/// Columns reported when no `--format` is given
pub const DEFAULT_FORMAT: &str = "JobID%>,State,Elapsed%>,TimeEff,CPUEff,MemEff";

/// Efficiency report for Slurm jobs
#[derive(FromArgs, Debug)]
pub struct Args {
    /// comma-separated columns, e.g. `JobID%>15`; any sacct field plus CPUEff,
    /// MemEff, TimeEff, GPU, GPUEff, GPUMem and Energy; a leading `+` adds to
    /// the default columns
    #[argh(option, default = "DEFAULT_FORMAT.to_string()")]
    pub format: String,

    /// filename pattern passed to sbatch, e.g. `%x.%A_%a.log`
    #[argh(option)]
    pub slurm_format: Option<String>,

    /// sort by modification time of output files
    #[argh(switch)]
    pub modified_sort: bool,

    /// force colored output
    #[argh(switch)]
    pub color: bool,

    /// disable colored output
    #[argh(switch)]
    pub no_color: bool,

    /// log sacct commands and raw output to stderr
    #[argh(switch)]
    pub debug: bool,

    /// report every job of this user from the last week, ignoring job IDs
    #[argh(option, short = 'u')]
    pub user: Option<String>,

    /// only include jobs in this partition
    #[argh(option)]
    pub partition: Option<String>,

    /// query this cluster in multi-cluster environments
    #[argh(option)]
    pub cluster: Option<String>,

    /// extra arguments passed to sacct
    #[argh(option)]
    pub extra_args: Option<String>,

    /// only include jobs in these comma-separated states or state codes
    #[argh(option, short = 's')]
    pub state: Option<String>,

    /// exclude jobs in these comma-separated states or state codes
    #[argh(option, short = 'S')]
    pub not_state: Option<String>,

    /// only include jobs after this time; either a sacct time or relative
    /// units, e.g. `d=2,h=1` for two days and one hour ago
    #[argh(option)]
    pub since: Option<String>,

    /// only include jobs before this time; either a sacct time or relative
    /// units, e.g. `w=1` for one week ago
    #[argh(option)]
    pub until: Option<String>,

    /// report statistics for each node
    #[argh(switch, short = 'n')]
    pub node: bool,

    /// report statistics for each node and GPU; implies `--node`
    #[argh(switch, short = 'g')]
    pub node_and_gpu: bool,

    /// delimited output without padding
    #[argh(switch, short = 'p')]
    pub parsable: bool,

    /// column delimiter used by `--parsable`
    #[argh(option, default = "\"|\".to_string()")]
    pub delimiter: String,

    /// drop array jobs with fewer tasks than this
    #[argh(option, default = "0")]
    pub array_min_size: usize,

    /// location of `sacct` executable
    #[argh(option, default = "\"sacct\".to_string()")]
    pub sacct: String,

    /// location of `scontrol` executable
    #[argh(option, default = "\"scontrol\".to_string()")]
    pub scontrol: String,

    /// print version information
    #[argh(switch, short = 'v')]
    pub version: bool,

    /// job IDs, output files or a directory of output files
    #[argh(positional)]
    pub jobs: Vec<String>,
}

impl Args {
    /// Format string with `+` prefixes expanded
    pub fn format_string(&self) -> String {
        match self.format.strip_prefix('+') {
            Some(extra) => format!("{},{}", DEFAULT_FORMAT, extra),
            None => self.format.clone(),
        }
    }

    /// Whether color was forced on or off; `None` if not specified
    pub fn color_choice(&self) -> Option<bool> {
        match (self.color, self.no_color) {
            (true, false) => Some(true),
            (_, true) => Some(false),
            (false, false) => None,
        }
    }
}
