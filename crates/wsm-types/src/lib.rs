use std::{fmt, path::PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Logical status of a managed service, derived from the OS registrar on
/// every query. `Error` covers unrecognized registrar states and failed
/// queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Running,
    Stopped,
    Starting,
    Stopping,
    Error,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceStatus::Running => "running",
            ServiceStatus::Stopped => "stopped",
            ServiceStatus::Starting => "starting",
            ServiceStatus::Stopping => "stopping",
            ServiceStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Authoritative record of a managed service, owned by the manager. Field
/// names serialize in camelCase to keep the snapshot file readable and
/// stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: String,
    pub name: String,
    pub exe_path: PathBuf,
    pub args: String,
    pub working_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
    pub status: ServiceStatus,
    pub pid: u32,
    pub auto_start: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Launch parameters for a new service. `working_dir` defaults to the
/// executable's directory, `args` to no arguments, `log_path` to discarding
/// the child's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateServiceRequest {
    pub name: String,
    pub exe_path: PathBuf,
    #[serde(default)]
    pub args: String,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub log_path: Option<PathBuf>,
}

/// Per-service launch parameters as persisted in the config store. This is
/// the only channel through which the host process learns what to run:
/// written once at creation time, read once at host start-up.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistedConfig {
    pub exe_path: PathBuf,
    pub args: String,
    pub working_dir: Option<PathBuf>,
    pub display_name: String,
    pub log_path: Option<PathBuf>,
}

/// Push notifications emitted by the manager after state transitions.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ManagerEvent {
    #[serde(rename_all = "camelCase")]
    StatusChanged {
        service_id: String,
        status: ServiceStatus,
        pid: u32,
    },
    ListUpdated { services: Vec<Service> },
}
