use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Observed lifecycle status of a database instance.
///
/// Instances are not persisted; the status is derived from the compute unit
/// the orchestration platform reports for the instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "PascalCase")]
pub enum InstanceStatus {
    /// Scheduled but not yet serving connections.
    Pending,
    /// Engine is up and the compute unit reports ready.
    Running,
    /// Compute unit terminated with an error.
    Failed,
    /// Teardown has been requested and is in progress.
    Deleting,
}

impl InstanceStatus {
    pub const ALL: &'static [InstanceStatus] =
        &[Self::Pending, Self::Running, Self::Failed, Self::Deleting];

    /// Derive a status from a platform phase string and readiness flag.
    ///
    /// A unit being deleted is always `Deleting`, regardless of phase.
    pub fn from_phase(phase: Option<&str>, ready: bool, deleting: bool) -> Self {
        if deleting {
            return Self::Deleting;
        }
        match phase {
            Some("Running") if ready => Self::Running,
            Some("Failed") | Some("Unknown") => Self::Failed,
            Some("Succeeded") => Self::Failed,
            _ => Self::Pending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Failed => "Failed",
            Self::Deleting => "Deleting",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for InstanceStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl FromStr for InstanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Running" => Ok(Self::Running),
            "Failed" => Ok(Self::Failed),
            "Deleting" => Ok(Self::Deleting),
            _ => Err(format!("Unknown instance status: {s}")),
        }
    }
}
