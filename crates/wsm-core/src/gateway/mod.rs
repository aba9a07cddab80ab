mod mock;
#[cfg(windows)]
mod scm;

pub use mock::{MockGateway, MockOp, StartOutcome, StopOutcome};
#[cfg(windows)]
pub use scm::ScmGateway;

use std::path::PathBuf;

use wsm_types::ServiceStatus;

use crate::error::Result;

/// Result of a single registrar status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusProbe {
    pub status: ServiceStatus,
    pub pid: u32,
}

/// Control signals the manager may send through the registrar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlSignal {
    Stop,
}

/// Parameters for registering a new service with the OS registrar. The
/// initial binary path is rewritten to the wrapper invocation before the
/// manager's create operation completes.
#[derive(Debug, Clone)]
pub struct CreateSpec {
    pub id: String,
    pub display_name: String,
    pub description: String,
    pub executable_path: PathBuf,
    pub launch_arguments: Vec<String>,
    /// Whether the OS should launch the service at boot.
    pub auto_start: bool,
}

/// Stateless adapter over the OS service registrar. Owns no state; each
/// manager operation connects, performs its calls through the session, and
/// releases the session by drop on every exit path.
#[async_trait::async_trait]
pub trait ServiceGateway: Send + Sync {
    type Session: GatewaySession;

    /// Open a fresh registrar session for one logical operation.
    async fn connect(&self) -> Result<Self::Session>;
}

/// A connected registrar session. Service handles are opened and released
/// inside each call.
#[async_trait::async_trait]
pub trait GatewaySession: Send {
    /// Register a new service.
    async fn create(&mut self, spec: &CreateSpec) -> Result<()>;
    /// Unregister a service.
    async fn delete(&mut self, id: &str) -> Result<()>;
    /// Query current state and process id.
    async fn query(&mut self, id: &str) -> Result<StatusProbe>;
    /// Issue a start request.
    async fn start(&mut self, id: &str) -> Result<()>;
    /// Send a control signal.
    async fn control(&mut self, id: &str, signal: ControlSignal) -> Result<()>;
    /// Rewrite the registered binary path of an existing service.
    async fn update_binary_path(&mut self, id: &str, binary_path: &str) -> Result<()>;
    /// Switch the start type between automatic and manual.
    async fn set_start_type(&mut self, id: &str, automatic: bool) -> Result<()>;
}
