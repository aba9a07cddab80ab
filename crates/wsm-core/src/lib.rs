mod cache;
mod error;
mod gateway;
pub mod host;
mod manager;
pub mod privileges;
mod store;

pub use cache::StatusCache;
pub use error::{Error, Result};
pub use gateway::{
    ControlSignal, CreateSpec, GatewaySession, MockGateway, MockOp, ServiceGateway, StartOutcome,
    StatusProbe, StopOutcome,
};
pub use manager::{ManagerOptions, ServiceManager};
pub use store::{ConfigStore, MemoryConfigStore};

#[cfg(windows)]
pub use gateway::ScmGateway;
#[cfg(windows)]
pub use store::RegistryConfigStore;
