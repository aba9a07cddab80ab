mod snapshot;

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Weak},
    time::Duration,
};

use chrono::Utc;
use tokio::sync::{mpsc, RwLock};
use wsm_types::{CreateServiceRequest, ManagerEvent, PersistedConfig, Service, ServiceStatus};

use crate::{
    cache::StatusCache,
    error::{Error, Result},
    gateway::{ControlSignal, CreateSpec, GatewaySession, ServiceGateway, StatusProbe},
    host,
    store::ConfigStore,
};

/// How long a start or stop waits for the registrar to observe the target
/// state before surfacing a timeout.
const STATE_CHANGE_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Delay before the fire-and-forget auto-start attempt after creation,
/// letting the registrar settle.
const AUTO_START_DELAY: Duration = Duration::from_secs(1);
const EVENT_BUFFER: usize = 100;

#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Snapshot file holding the full service map across restarts.
    pub data_file: PathBuf,
    /// Path of the managing program itself; registered as the service
    /// binary together with the wrapper flag.
    pub wrapper_exe: PathBuf,
}

/// The orchestrator. Owns the authoritative in-memory map of managed
/// services and serializes every lifecycle operation on one coarse lock,
/// including the blocking poll loops, so the map and the OS registrar never
/// diverge mid-operation. Listings take the shared form of the lock for
/// their query phase and may run concurrently with each other.
#[derive(Debug)]
pub struct ServiceManager<G: ServiceGateway, S: ConfigStore> {
    gateway: G,
    store: S,
    data_file: PathBuf,
    wrapper_exe: PathBuf,
    services: RwLock<HashMap<String, Service>>,
    cache: Arc<StatusCache>,
    events: mpsc::Sender<ManagerEvent>,
    weak: Weak<Self>,
}

impl<G, S> ServiceManager<G, S>
where
    G: ServiceGateway + 'static,
    S: ConfigStore + 'static,
{
    /// Builds the manager, repopulating the in-memory map from the snapshot
    /// file, and returns it together with the receiver for status-changed
    /// and list-updated notifications.
    pub fn new(
        gateway: G,
        store: S,
        options: ManagerOptions,
    ) -> (Arc<Self>, mpsc::Receiver<ManagerEvent>) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let cache = Arc::new(StatusCache::new());
        StatusCache::spawn_sweeper(&cache);

        let services = snapshot::load(&options.data_file);
        if !services.is_empty() {
            tracing::info!("loaded {} service(s) from snapshot", services.len());
        }

        let manager = Arc::new_cyclic(|weak| Self {
            gateway,
            store,
            data_file: options.data_file,
            wrapper_exe: options.wrapper_exe,
            services: RwLock::new(services),
            cache,
            events: events_tx,
            weak: weak.clone(),
        });

        (manager, events_rx)
    }

    /// Registers a new OS service wrapping the given executable and
    /// schedules its deferred first start.
    ///
    /// Atomic at the OS-visibility level: any failure after the service
    /// object was created rolls the object back, so either a fully
    /// configured service exists or none does.
    ///
    /// # Errors
    /// Fails when the executable is missing, the generated id collides, or
    /// a registrar call fails.
    pub async fn create_service(&self, request: CreateServiceRequest) -> Result<Service> {
        let mut services = self.services.write().await;

        if !request.exe_path.exists() {
            return Err(Error::ExecutableNotFound(request.exe_path));
        }

        let id = generate_service_id(&request.name);
        if services.contains_key(&id) {
            return Err(Error::DuplicateService(id));
        }

        let working_dir = match request.working_dir {
            Some(dir) => dir,
            None => request
                .exe_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        };

        let mut session = self.gateway.connect().await?;

        session
            .create(&CreateSpec {
                id: id.clone(),
                display_name: request.name.clone(),
                description: format!("Service created by wsm: {}", request.name),
                executable_path: request.exe_path.clone(),
                launch_arguments: request
                    .args
                    .split_whitespace()
                    .map(str::to_owned)
                    .collect(),
                auto_start: true,
            })
            .await?;

        // The host reads its launch parameters from the config store, so
        // they must be in place before the effective binary path points at
        // the wrapper.
        let config = PersistedConfig {
            exe_path: request.exe_path.clone(),
            args: request.args.clone(),
            working_dir: Some(working_dir.clone()),
            display_name: request.name.clone(),
            log_path: request.log_path.clone(),
        };
        if let Err(err) = self.store.write(&id, &config) {
            self.roll_back_create(&mut session, &id).await;
            return Err(err);
        }

        let wrapper = host::wrapper_command_line(&self.wrapper_exe, &id);
        if let Err(err) = session.update_binary_path(&id, &wrapper).await {
            self.roll_back_create(&mut session, &id).await;
            return Err(err);
        }

        let now = Utc::now();
        let service = Service {
            id: id.clone(),
            name: request.name,
            exe_path: request.exe_path,
            args: request.args,
            working_dir,
            log_path: request.log_path,
            status: ServiceStatus::Stopped,
            pid: 0,
            auto_start: true,
            created_at: now,
            updated_at: now,
        };

        services.insert(id.clone(), service.clone());
        self.save_snapshot(&services);
        self.emit(ManagerEvent::ListUpdated {
            services: sorted_list(&services),
        });

        self.schedule_auto_start(id);

        Ok(service)
    }

    /// Issues a start request and waits for the registrar to observe
    /// `running`, up to the state-change timeout.
    ///
    /// # Errors
    /// Fails when the id is unknown, the service is already running, a
    /// registrar call fails, the service stops during the wait, or the wait
    /// times out. Wait failures mark the record `error`.
    pub async fn start_service(&self, id: &str) -> Result<()> {
        let mut services = self.services.write().await;
        if !services.contains_key(id) {
            return Err(Error::UnknownService(id.to_owned()));
        }

        let mut session = self.gateway.connect().await?;

        let probe = session.query(id).await?;
        if probe.status == ServiceStatus::Running {
            return Err(Error::AlreadyRunning(id.to_owned()));
        }

        session.start(id).await?;

        match self
            .wait_for_status(&mut session, id, ServiceStatus::Running)
            .await
        {
            Ok(probe) => {
                if let Some(service) = services.get_mut(id) {
                    service.status = ServiceStatus::Running;
                    service.pid = probe.pid;
                    service.updated_at = Utc::now();
                }
                self.cache.set(id, ServiceStatus::Running, probe.pid);
                self.save_snapshot(&services);
                self.emit(ManagerEvent::StatusChanged {
                    service_id: id.to_owned(),
                    status: ServiceStatus::Running,
                    pid: probe.pid,
                });
                Ok(())
            }
            Err(err) => {
                self.mark_error(&mut services, id);
                Err(err)
            }
        }
    }

    /// Stops a service. Idempotent: an already-stopped service succeeds
    /// immediately without a control signal being issued.
    ///
    /// # Errors
    /// Fails when the id is unknown, a registrar call fails, or the stop
    /// wait times out. Wait failures mark the record `error`.
    pub async fn stop_service(&self, id: &str) -> Result<()> {
        let mut services = self.services.write().await;
        if !services.contains_key(id) {
            return Err(Error::UnknownService(id.to_owned()));
        }

        let mut session = self.gateway.connect().await?;

        let probe = session.query(id).await?;
        if probe.status == ServiceStatus::Stopped {
            if let Some(service) = services.get_mut(id) {
                service.status = ServiceStatus::Stopped;
                service.pid = 0;
                service.updated_at = Utc::now();
            }
            self.save_snapshot(&services);
            return Ok(());
        }

        session.control(id, ControlSignal::Stop).await?;

        match self
            .wait_for_status(&mut session, id, ServiceStatus::Stopped)
            .await
        {
            Ok(_) => {
                if let Some(service) = services.get_mut(id) {
                    service.status = ServiceStatus::Stopped;
                    service.pid = 0;
                    service.updated_at = Utc::now();
                }
                self.cache.set(id, ServiceStatus::Stopped, 0);
                self.save_snapshot(&services);
                self.emit(ManagerEvent::StatusChanged {
                    service_id: id.to_owned(),
                    status: ServiceStatus::Stopped,
                    pid: 0,
                });
                Ok(())
            }
            Err(err) => {
                self.mark_error(&mut services, id);
                Err(err)
            }
        }
    }

    /// Stops (best-effort) and unregisters a service. If the registrar
    /// refuses the deletion the record stays in the map so the caller can
    /// retry.
    ///
    /// # Errors
    /// Fails when the id is unknown or the registrar deletion fails.
    pub async fn delete_service(&self, id: &str) -> Result<()> {
        let mut services = self.services.write().await;
        if !services.contains_key(id) {
            return Err(Error::UnknownService(id.to_owned()));
        }

        let mut session = self.gateway.connect().await?;

        // Best-effort stop; deletion proceeds regardless of the outcome.
        if let Ok(probe) = session.query(id).await {
            if probe.status != ServiceStatus::Stopped
                && session.control(id, ControlSignal::Stop).await.is_ok()
            {
                let _ = self
                    .wait_for_status(&mut session, id, ServiceStatus::Stopped)
                    .await;
            }
        }

        session.delete(id).await?;

        if let Err(err) = self.store.remove(id) {
            tracing::warn!("failed to remove config for deleted service {id}: {err}");
        }
        services.remove(id);
        self.cache.remove(id);
        self.save_snapshot(&services);
        self.emit(ManagerEvent::ListUpdated {
            services: sorted_list(&services),
        });

        Ok(())
    }

    /// Returns all managed services with their statuses refreshed through
    /// the cache-then-registrar path. Persists asynchronously afterwards as
    /// a side effect.
    ///
    /// # Errors
    /// Fails when the registrar session cannot be established.
    pub async fn get_services(&self) -> Result<Vec<Service>> {
        let refreshed = {
            let services = self.services.read().await;
            let mut session = self.gateway.connect().await?;
            let mut refreshed = Vec::with_capacity(services.len());
            for id in services.keys() {
                let (status, pid) = self.resolve_status(&mut session, id).await;
                refreshed.push((id.clone(), status, pid));
            }
            refreshed
        };

        let listing = {
            let mut services = self.services.write().await;
            let now = Utc::now();
            for (id, status, pid) in refreshed {
                if let Some(service) = services.get_mut(&id) {
                    service.status = status;
                    service.pid = pid;
                    service.updated_at = now;
                }
            }
            sorted_list(&services)
        };

        self.persist_in_background();

        Ok(listing)
    }

    /// Reconfigures the OS start type (automatic vs. manual) and mirrors
    /// the flag into the record.
    ///
    /// # Errors
    /// Fails when the id is unknown or the registrar reconfiguration fails.
    pub async fn set_service_auto_start(&self, id: &str, enabled: bool) -> Result<()> {
        let mut services = self.services.write().await;
        if !services.contains_key(id) {
            return Err(Error::UnknownService(id.to_owned()));
        }

        let mut session = self.gateway.connect().await?;
        session.set_start_type(id, enabled).await?;

        if let Some(service) = services.get_mut(id) {
            service.auto_start = enabled;
            service.updated_at = Utc::now();
        }
        self.save_snapshot(&services);

        Ok(())
    }

    /// # Errors
    /// Fails when the id is unknown.
    pub async fn get_service_auto_start(&self, id: &str) -> Result<bool> {
        let services = self.services.read().await;
        services
            .get(id)
            .map(|service| service.auto_start)
            .ok_or_else(|| Error::UnknownService(id.to_owned()))
    }

    /// Path of the log file the host redirects the workload's output into,
    /// if one was configured at creation.
    ///
    /// # Errors
    /// Fails when the id is unknown.
    pub async fn service_log_path(&self, id: &str) -> Result<Option<PathBuf>> {
        let services = self.services.read().await;
        services
            .get(id)
            .map(|service| service.log_path.clone())
            .ok_or_else(|| Error::UnknownService(id.to_owned()))
    }

    async fn wait_for_status(
        &self,
        session: &mut G::Session,
        id: &str,
        target: ServiceStatus,
    ) -> Result<StatusProbe> {
        let deadline = tokio::time::Instant::now() + STATE_CHANGE_TIMEOUT;
        loop {
            let probe = session.query(id).await?;
            if probe.status == target {
                return Ok(probe);
            }
            if target == ServiceStatus::Running && probe.status == ServiceStatus::Stopped {
                return Err(Error::StartFailed(id.to_owned()));
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::Timeout {
                    id: id.to_owned(),
                    target,
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn resolve_status(&self, session: &mut G::Session, id: &str) -> (ServiceStatus, u32) {
        if let Some((status, pid)) = self.cache.get(id) {
            return (status, pid);
        }
        match session.query(id).await {
            Ok(probe) => {
                self.cache.set(id, probe.status, probe.pid);
                (probe.status, probe.pid)
            }
            Err(err) => {
                tracing::debug!("status query for {id} failed: {err}");
                self.cache.set(id, ServiceStatus::Error, 0);
                (ServiceStatus::Error, 0)
            }
        }
    }

    async fn roll_back_create(&self, session: &mut G::Session, id: &str) {
        if let Err(err) = session.delete(id).await {
            tracing::warn!("failed to roll back partially created service {id}: {err}");
        }
        if let Err(err) = self.store.remove(id) {
            tracing::warn!("failed to remove config for rolled-back service {id}: {err}");
        }
    }

    /// Fire-and-forget first start after creation. Failures are only
    /// reflected in later status queries, never surfaced to the creator.
    fn schedule_auto_start(&self, id: String) {
        let Some(manager) = self.weak.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            tokio::time::sleep(AUTO_START_DELAY).await;
            if let Err(err) = manager.start_service(&id).await {
                tracing::warn!("deferred auto-start of {id} failed: {err}");
            }
        });
    }

    fn persist_in_background(&self) {
        let Some(manager) = self.weak.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            let services = manager.services.read().await;
            manager.save_snapshot(&services);
        });
    }

    fn mark_error(&self, services: &mut HashMap<String, Service>, id: &str) {
        if let Some(service) = services.get_mut(id) {
            service.status = ServiceStatus::Error;
            service.updated_at = Utc::now();
        }
        self.save_snapshot(services);
    }

    fn save_snapshot(&self, services: &HashMap<String, Service>) {
        if let Err(err) = snapshot::save(&self.data_file, services) {
            tracing::warn!("failed to persist service snapshot: {err}");
        }
    }

    fn emit(&self, event: ManagerEvent) {
        if let Err(err) = self.events.try_send(event) {
            tracing::debug!("manager event dropped: {err}");
        }
    }
}

fn sorted_list(services: &HashMap<String, Service>) -> Vec<Service> {
    let mut list: Vec<Service> = services.values().cloned().collect();
    list.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    list
}

/// Sanitizes the display name to an identifier-safe alphabet and appends
/// the creation instant, so ids stay unique even across repeated names.
fn generate_service_id(name: &str) -> String {
    let clean: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("WSM_{clean}_{}", Utc::now().timestamp())
}
