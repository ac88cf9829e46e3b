//! Job and run status model
//! The wire carries status as a free string; everything past the API boundary
//! works with the closed `JobStatus` set and fails closed on anything else.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    Submitted,
    Cloning,
    Scheduled,
    Archiving,
    Running,
    RunningSynthesis,
    RunningFloorplan,
    RunningPlacement,
    RunningCts,
    RunningRouting,
    RunningLvs,
    RunningMagic,
    Completed,
    Stopped,
    Stopping,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 16] = [
        JobStatus::Submitted,
        JobStatus::Cloning,
        JobStatus::Scheduled,
        JobStatus::Archiving,
        JobStatus::Running,
        JobStatus::RunningSynthesis,
        JobStatus::RunningFloorplan,
        JobStatus::RunningPlacement,
        JobStatus::RunningCts,
        JobStatus::RunningRouting,
        JobStatus::RunningLvs,
        JobStatus::RunningMagic,
        JobStatus::Completed,
        JobStatus::Stopped,
        JobStatus::Stopping,
        JobStatus::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Submitted => "submitted",
            JobStatus::Cloning => "cloning",
            JobStatus::Scheduled => "scheduled",
            JobStatus::Archiving => "archiving",
            JobStatus::Running => "running",
            JobStatus::RunningSynthesis => "running-synthesis",
            JobStatus::RunningFloorplan => "running-floorplan",
            JobStatus::RunningPlacement => "running-placement",
            JobStatus::RunningCts => "running-cts",
            JobStatus::RunningRouting => "running-routing",
            JobStatus::RunningLvs => "running-lvs",
            JobStatus::RunningMagic => "running-magic",
            JobStatus::Completed => "completed",
            JobStatus::Stopped => "stopped",
            JobStatus::Stopping => "stopping",
            JobStatus::Failed => "failed",
        }
    }

    /// Terminal statuses are the only ones that carry a completion timestamp
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Stopped | JobStatus::Failed)
    }

    /// Still doing work on the backend (excludes `stopping`)
    pub fn is_active(self) -> bool {
        !self.is_terminal() && self != JobStatus::Stopping
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized status code: {0:?}")]
pub struct UnknownStatus(pub String);

impl FromStr for JobStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// Status exactly as the backend reported it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(String);

impl StatusCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn parse(&self) -> Result<JobStatus, UnknownStatus> {
        self.0.parse()
    }

    pub fn is(&self, status: JobStatus) -> bool {
        self.0 == status.as_str()
    }
}

impl From<JobStatus> for StatusCode {
    fn from(status: JobStatus) -> Self {
        Self(status.as_str().to_string())
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Display text plus the color category the front-end maps to a badge style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusLabel {
    pub text: &'static str,
    pub color: &'static str,
}

const UNKNOWN_LABEL: StatusLabel = StatusLabel {
    text: "Unknown",
    color: "default",
};

pub fn label(status: JobStatus) -> StatusLabel {
    let (text, color) = match status {
        JobStatus::Submitted => ("Submitted", "primary"),
        JobStatus::Cloning => ("Cloning", "primary"),
        JobStatus::Scheduled => ("Scheduled", "secondary"),
        JobStatus::Archiving => ("Archiving", "archiving"),
        JobStatus::Running => ("Running", "running"),
        JobStatus::RunningSynthesis => ("Synthesis", "synthesis"),
        JobStatus::RunningFloorplan => ("Floorplan", "floorplan"),
        JobStatus::RunningPlacement => ("Placement", "placement"),
        JobStatus::RunningCts => ("CTS", "cts"),
        JobStatus::RunningRouting => ("Routing", "routing"),
        JobStatus::RunningLvs => ("LVS", "lvs"),
        JobStatus::RunningMagic => ("Magic", "magic"),
        JobStatus::Completed => ("Completed", "success"),
        JobStatus::Stopped => ("Stopped", "warning"),
        JobStatus::Stopping => ("Stopping", "warning"),
        JobStatus::Failed => ("Failed", "error"),
    };
    StatusLabel { text, color }
}

pub fn classify(code: &StatusCode) -> Result<StatusLabel, UnknownStatus> {
    code.parse().map(label)
}

/// Rendering fallback for codes outside the known set
pub fn label_or_unknown(code: &StatusCode) -> StatusLabel {
    classify(code).unwrap_or(UNKNOWN_LABEL)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobAction {
    Stop,
    Delete,
    Download,
}

impl fmt::Display for JobAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobAction::Stop => "stop",
            JobAction::Delete => "delete",
            JobAction::Download => "download",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActionSet {
    pub stop: bool,
    pub delete: bool,
    pub download: bool,
}

impl ActionSet {
    pub const NONE: ActionSet = ActionSet {
        stop: false,
        delete: false,
        download: false,
    };

    pub fn contains(&self, action: JobAction) -> bool {
        match action {
            JobAction::Stop => self.stop,
            JobAction::Delete => self.delete,
            JobAction::Download => self.download,
        }
    }
}

/// Job-level actions
pub fn allowed_actions(status: JobStatus) -> ActionSet {
    ActionSet {
        stop: !matches!(
            status,
            JobStatus::Completed | JobStatus::Stopped | JobStatus::Stopping | JobStatus::Failed
        ),
        delete: status.is_terminal(),
        download: false,
    }
}

/// Run-level actions; results can only be fetched from a completed run
pub fn run_allowed_actions(status: JobStatus) -> ActionSet {
    ActionSet {
        download: status == JobStatus::Completed,
        ..ActionSet::NONE
    }
}

pub fn allowed_actions_for_code(code: &StatusCode) -> ActionSet {
    code.parse().map(allowed_actions).unwrap_or(ActionSet::NONE)
}

pub fn run_allowed_actions_for_code(code: &StatusCode) -> ActionSet {
    code.parse().map(run_allowed_actions).unwrap_or(ActionSet::NONE)
}
