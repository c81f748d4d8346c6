use crossterm::style::Color;
use serde::de::IntoDeserializer;
use serde::Deserialize;

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Terminated due to launch failure
    BootFail,
    /// Cancelled by user/admin
    Cancelled,
    /// Completed successfully
    Completed,
    /// Completing; processes may still be running
    Completing,
    /// Waiting for resources to being running
    Configuring,
    /// Terminated due to deadline
    Deadline,
    /// Terminated with non-zero exit code or similar
    Failed,
    /// Terminated due to node failure
    NodeFail,
    OutOfMemory,
    Pending,
    Preempted,
    Requeued,
    RequeueFed,
    RequeueHold,
    Resizing,
    ResvDelHold,
    Revoked,
    Running,
    Signaling,
    SpecialExit,
    StageOut,
    Stopped,
    Suspended,
    Timeout,
}

impl JobState {
    /// Parses a state name as reported by sacct, e.g. `OUT_OF_MEMORY`.
    /// Trailing annotations such as `by 1234` must be stripped first.
    pub fn from_name(value: &str) -> Option<JobState> {
        let result: Result<JobState, serde::de::value::Error> =
            JobState::deserialize(value.into_deserializer());
        result.ok()
    }

    /// Parses the compact state codes accepted by `sacct --state`
    pub fn from_code(code: &str) -> Option<JobState> {
        Some(match code {
            "BF" => JobState::BootFail,
            "CA" => JobState::Cancelled,
            "CD" => JobState::Completed,
            "DL" => JobState::Deadline,
            "F" => JobState::Failed,
            "NF" => JobState::NodeFail,
            "OOM" => JobState::OutOfMemory,
            "PD" => JobState::Pending,
            "PR" => JobState::Preempted,
            "R" => JobState::Running,
            "RQ" => JobState::Requeued,
            "RS" => JobState::Resizing,
            "RV" => JobState::Revoked,
            "S" => JobState::Suspended,
            "TO" => JobState::Timeout,
            _ => return None,
        })
    }

    /// Parses a user supplied state filter entry, either a code or a name
    pub fn from_filter(value: &str) -> Option<JobState> {
        let value = value.trim().to_uppercase();
        JobState::from_code(&value).or_else(|| JobState::from_name(&value))
    }

    /// Foreground color used when rendering this state
    pub fn color(&self) -> Option<Color> {
        match self {
            JobState::Failed | JobState::Timeout | JobState::OutOfMemory => Some(Color::Red),
            JobState::Running => Some(Color::Cyan),
            JobState::Cancelled => Some(Color::Yellow),
            JobState::Completed => Some(Color::Green),
            JobState::Pending => Some(Color::Blue),
            _ => None,
        }
    }
}
