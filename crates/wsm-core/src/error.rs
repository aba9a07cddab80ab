use std::path::PathBuf;

use wsm_types::ServiceStatus;

pub type Result<R, E = Error> = std::result::Result<R, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("executable does not exist: {0}")]
    ExecutableNotFound(PathBuf),

    #[error("service already exists: {0}")]
    DuplicateService(String),

    #[error("service does not exist: {0}")]
    UnknownService(String),

    #[error("service is already running: {0}")]
    AlreadyRunning(String),

    /// The registrar reported `stopped` while waiting for `running`.
    #[error("service {0} failed to start")]
    StartFailed(String),

    #[error("timeout waiting for service {id} to reach {target} state")]
    Timeout { id: String, target: ServiceStatus },

    /// An OS registrar call failed, wrapped with operation context.
    #[error("failed to {op}: {message}")]
    Registrar { op: &'static str, message: String },

    /// Registry or service-control access was denied. Surfaced verbatim;
    /// the caller decides whether to restart with elevated rights.
    #[error("access denied while trying to {op}: {message}")]
    AccessDenied { op: &'static str, message: String },

    #[error("config store error for service {id}: {message}")]
    Store { id: String, message: String },

    #[error("{0}")]
    Unsupported(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn registrar(op: &'static str, message: impl ToString) -> Self {
        Error::Registrar {
            op,
            message: message.to_string(),
        }
    }

    pub fn store(id: impl Into<String>, message: impl ToString) -> Self {
        Error::Store {
            id: id.into(),
            message: message.to_string(),
        }
    }
}
