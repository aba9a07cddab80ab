use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use wsm_types::ServiceStatus;

use crate::{
    error::{Error, Result},
    gateway::{ControlSignal, CreateSpec, GatewaySession, ServiceGateway, StatusProbe},
};

/// Gateway operations that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    Connect,
    Create,
    Delete,
    Query,
    Start,
    Control,
    UpdateBinaryPath,
    SetStartType,
}

/// What a mock service does when asked to start.
#[derive(Debug, Clone, Copy)]
pub enum StartOutcome {
    /// Transition to running with the given pid.
    Run { pid: u32 },
    /// Stay in start-pending forever, forcing the caller's timeout.
    Hang,
    /// Transition straight to stopped, as a crashing child would.
    ExitImmediately,
}

/// What a mock service does when sent a stop signal.
#[derive(Debug, Clone, Copy)]
pub enum StopOutcome {
    Stop,
    /// Ignore the signal, forcing the caller's timeout.
    Ignore,
}

#[derive(Debug)]
struct MockService {
    binary_path: String,
    display_name: String,
    automatic: bool,
    status: ServiceStatus,
    pid: u32,
    start_outcome: StartOutcome,
    stop_outcome: StopOutcome,
}

#[derive(Debug, Default)]
struct MockState {
    services: HashMap<String, MockService>,
    fail: HashSet<MockOp>,
    control_log: Vec<(String, ControlSignal)>,
}

/// In-memory registrar implementing the full gateway capability set. Clones
/// share state, so a manager under test and its assertions see the same
/// registrar, as do two manager instances in restart scenarios.
#[derive(Debug, Default, Clone)]
pub struct MockGateway {
    state: Arc<Mutex<MockState>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, op: MockOp) {
        self.lock().fail.insert(op);
    }

    pub fn clear_failure(&self, op: MockOp) {
        self.lock().fail.remove(&op);
    }

    pub fn has_service(&self, id: &str) -> bool {
        self.lock().services.contains_key(id)
    }

    pub fn service_ids(&self) -> Vec<String> {
        self.lock().services.keys().cloned().collect()
    }

    pub fn service_status(&self, id: &str) -> Option<ServiceStatus> {
        self.lock().services.get(id).map(|s| s.status)
    }

    pub fn binary_path(&self, id: &str) -> Option<String> {
        self.lock().services.get(id).map(|s| s.binary_path.clone())
    }

    pub fn display_name(&self, id: &str) -> Option<String> {
        self.lock().services.get(id).map(|s| s.display_name.clone())
    }

    pub fn is_automatic(&self, id: &str) -> Option<bool> {
        self.lock().services.get(id).map(|s| s.automatic)
    }

    /// Number of control signals sent to the given service.
    pub fn control_signals(&self, id: &str) -> usize {
        self.lock()
            .control_log
            .iter()
            .filter(|(target, _)| target == id)
            .count()
    }

    pub fn set_status(&self, id: &str, status: ServiceStatus, pid: u32) {
        if let Some(service) = self.lock().services.get_mut(id) {
            service.status = status;
            service.pid = pid;
        }
    }

    pub fn set_start_outcome(&self, id: &str, outcome: StartOutcome) {
        if let Some(service) = self.lock().services.get_mut(id) {
            service.start_outcome = outcome;
        }
    }

    pub fn set_stop_outcome(&self, id: &str, outcome: StopOutcome) {
        if let Some(service) = self.lock().services.get_mut(id) {
            service.stop_outcome = outcome;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait::async_trait]
impl ServiceGateway for MockGateway {
    type Session = MockSession;

    async fn connect(&self) -> Result<Self::Session> {
        if self.lock().fail.contains(&MockOp::Connect) {
            return Err(Error::registrar(
                "connect to service control manager",
                "mock connect failure",
            ));
        }
        Ok(MockSession {
            gateway: self.clone(),
        })
    }
}

#[derive(Debug)]
pub struct MockSession {
    gateway: MockGateway,
}

impl MockSession {
    fn check(&self, op: MockOp, context: &'static str) -> Result<()> {
        if self.gateway.lock().fail.contains(&op) {
            return Err(Error::registrar(context, "mock failure"));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl GatewaySession for MockSession {
    async fn create(&mut self, spec: &CreateSpec) -> Result<()> {
        self.check(MockOp::Create, "create service")?;
        let mut state = self.gateway.lock();
        if state.services.contains_key(&spec.id) {
            return Err(Error::registrar("create service", "service already exists"));
        }
        let binary_path = if spec.launch_arguments.is_empty() {
            format!("\"{}\"", spec.executable_path.display())
        } else {
            format!(
                "\"{}\" {}",
                spec.executable_path.display(),
                spec.launch_arguments.join(" ")
            )
        };
        state.services.insert(
            spec.id.clone(),
            MockService {
                binary_path,
                display_name: spec.display_name.clone(),
                automatic: spec.auto_start,
                status: ServiceStatus::Stopped,
                pid: 0,
                start_outcome: StartOutcome::Run { pid: 4242 },
                stop_outcome: StopOutcome::Stop,
            },
        );
        Ok(())
    }

    async fn delete(&mut self, id: &str) -> Result<()> {
        self.check(MockOp::Delete, "delete service")?;
        let mut state = self.gateway.lock();
        if state.services.remove(id).is_none() {
            return Err(Error::registrar("open service", "service does not exist"));
        }
        Ok(())
    }

    async fn query(&mut self, id: &str) -> Result<StatusProbe> {
        self.check(MockOp::Query, "query service status")?;
        let state = self.gateway.lock();
        let service = state
            .services
            .get(id)
            .ok_or_else(|| Error::registrar("open service", "service does not exist"))?;
        Ok(StatusProbe {
            status: service.status,
            pid: service.pid,
        })
    }

    async fn start(&mut self, id: &str) -> Result<()> {
        self.check(MockOp::Start, "start service")?;
        let mut state = self.gateway.lock();
        let service = state
            .services
            .get_mut(id)
            .ok_or_else(|| Error::registrar("open service", "service does not exist"))?;
        match service.start_outcome {
            StartOutcome::Run { pid } => {
                service.status = ServiceStatus::Running;
                service.pid = pid;
            }
            StartOutcome::Hang => {
                service.status = ServiceStatus::Starting;
                service.pid = 0;
            }
            StartOutcome::ExitImmediately => {
                service.status = ServiceStatus::Stopped;
                service.pid = 0;
            }
        }
        Ok(())
    }

    async fn control(&mut self, id: &str, signal: ControlSignal) -> Result<()> {
        self.check(MockOp::Control, "send control signal")?;
        let mut state = self.gateway.lock();
        state.control_log.push((id.to_owned(), signal));
        let service = state
            .services
            .get_mut(id)
            .ok_or_else(|| Error::registrar("open service", "service does not exist"))?;
        match (signal, service.stop_outcome) {
            (ControlSignal::Stop, StopOutcome::Stop) => {
                service.status = ServiceStatus::Stopped;
                service.pid = 0;
            }
            (ControlSignal::Stop, StopOutcome::Ignore) => {}
        }
        Ok(())
    }

    async fn update_binary_path(&mut self, id: &str, binary_path: &str) -> Result<()> {
        self.check(MockOp::UpdateBinaryPath, "update service binary path")?;
        let mut state = self.gateway.lock();
        let service = state
            .services
            .get_mut(id)
            .ok_or_else(|| Error::registrar("open service", "service does not exist"))?;
        service.binary_path = binary_path.to_owned();
        Ok(())
    }

    async fn set_start_type(&mut self, id: &str, automatic: bool) -> Result<()> {
        self.check(MockOp::SetStartType, "update service start type")?;
        let mut state = self.gateway.lock();
        let service = state
            .services
            .get_mut(id)
            .ok_or_else(|| Error::registrar("open service", "service does not exist"))?;
        service.automatic = automatic;
        Ok(())
    }
}
