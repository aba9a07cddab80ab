use std::{collections::HashMap, path::PathBuf, sync::Arc, time::Duration};

use tempfile::TempDir;
use tokio::sync::mpsc::Receiver;
use wsm_core::{
    ConfigStore, Error, ManagerOptions, MemoryConfigStore, MockGateway, MockOp, ServiceManager,
    StartOutcome, StopOutcome,
};
use wsm_types::{CreateServiceRequest, ManagerEvent, PersistedConfig, Service, ServiceStatus};

type TestManager = ServiceManager<MockGateway, MemoryConfigStore>;

fn fixture_exe(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("workload.exe");
    std::fs::write(&path, b"fixture").unwrap();
    path
}

fn request(name: &str, exe: &PathBuf) -> CreateServiceRequest {
    CreateServiceRequest {
        name: name.to_owned(),
        exe_path: exe.clone(),
        args: String::new(),
        working_dir: None,
        log_path: None,
    }
}

fn new_manager(
    dir: &TempDir,
    gateway: MockGateway,
    store: MemoryConfigStore,
) -> (Arc<TestManager>, Receiver<ManagerEvent>) {
    ServiceManager::new(
        gateway,
        store,
        ManagerOptions {
            data_file: dir.path().join("services.json"),
            wrapper_exe: PathBuf::from("/opt/wsm/wsm"),
        },
    )
}

fn snapshot_on_disk(dir: &TempDir) -> HashMap<String, Service> {
    let data = std::fs::read_to_string(dir.path().join("services.json")).unwrap();
    serde_json::from_str(&data).unwrap()
}

#[tokio::test(start_paused = true)]
async fn create_registers_wrapper_and_persists_config() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = MockGateway::new();
    let store = MemoryConfigStore::new();
    let (manager, mut events) = new_manager(&dir, gateway.clone(), store.clone());
    let exe = fixture_exe(&dir);

    let service = manager.create_service(request("My App", &exe)).await.unwrap();

    let suffix = service.id.strip_prefix("WSM_My_App_").unwrap();
    assert!(suffix.parse::<i64>().is_ok());
    assert_eq!(service.status, ServiceStatus::Stopped);
    assert_eq!(service.pid, 0);
    assert!(service.auto_start);
    assert_eq!(service.working_dir, dir.path());

    assert!(gateway.has_service(&service.id));
    assert_eq!(
        gateway.binary_path(&service.id).unwrap(),
        format!("\"/opt/wsm/wsm\" --service-wrapper {}", service.id)
    );
    assert_eq!(gateway.display_name(&service.id).unwrap(), "My App");
    assert_eq!(gateway.is_automatic(&service.id), Some(true));
    assert!(store.contains(&service.id));

    match events.try_recv().unwrap() {
        ManagerEvent::ListUpdated { services } => assert_eq!(services.len(), 1),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn create_with_same_name_never_overwrites_the_first() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = MockGateway::new();
    let (manager, _events) = new_manager(&dir, gateway, MemoryConfigStore::new());
    let exe = fixture_exe(&dir);

    let first = manager.create_service(request("My App", &exe)).await.unwrap();
    // Same name within the same clock second collides on the id and is
    // rejected; across a second boundary a distinct id is generated.
    match manager.create_service(request("My App", &exe)).await {
        Err(Error::DuplicateService(id)) => assert_eq!(id, first.id),
        Ok(second) => assert_ne!(second.id, first.id),
        Err(other) => panic!("unexpected error: {other}"),
    }

    let services = manager.get_services().await.unwrap();
    assert!(services
        .iter()
        .any(|s| s.id == first.id && s.exe_path == first.exe_path));
}

#[tokio::test(start_paused = true)]
async fn create_rejects_missing_executable_without_os_mutation() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = MockGateway::new();
    let store = MemoryConfigStore::new();
    let (manager, _events) = new_manager(&dir, gateway.clone(), store.clone());

    let missing = dir.path().join("missing.exe");
    let result = manager.create_service(request("ghost", &missing)).await;

    assert!(matches!(result, Err(Error::ExecutableNotFound(_))));
    assert!(gateway.service_ids().is_empty());
    assert!(store.is_empty());
}

#[tokio::test(start_paused = true)]
async fn create_rolls_back_when_wrapper_path_setup_fails() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = MockGateway::new();
    let store = MemoryConfigStore::new();
    let (manager, _events) = new_manager(&dir, gateway.clone(), store.clone());
    let exe = fixture_exe(&dir);

    gateway.fail_on(MockOp::UpdateBinaryPath);
    let result = manager.create_service(request("My App", &exe)).await;

    assert!(result.is_err());
    // Atomic at OS visibility: no half-configured service survives.
    assert!(gateway.service_ids().is_empty());
    assert!(store.is_empty());
    assert!(manager.get_services().await.unwrap().is_empty());
}

#[derive(Debug, Default, Clone)]
struct FailingStore;

impl ConfigStore for FailingStore {
    fn write(&self, service_id: &str, _config: &PersistedConfig) -> wsm_core::Result<()> {
        Err(Error::store(service_id, "store unavailable"))
    }

    fn read(&self, service_id: &str) -> wsm_core::Result<PersistedConfig> {
        Err(Error::store(service_id, "store unavailable"))
    }

    fn remove(&self, _service_id: &str) -> wsm_core::Result<()> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn create_rolls_back_when_config_persistence_fails() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = MockGateway::new();
    let (manager, _events) = ServiceManager::new(
        gateway.clone(),
        FailingStore,
        ManagerOptions {
            data_file: dir.path().join("services.json"),
            wrapper_exe: PathBuf::from("/opt/wsm/wsm"),
        },
    );
    let exe = fixture_exe(&dir);

    assert!(manager.create_service(request("My App", &exe)).await.is_err());
    assert!(gateway.service_ids().is_empty());
    assert!(manager.get_services().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn deferred_auto_start_fires_without_blocking_creation() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = MockGateway::new();
    let (manager, mut events) = new_manager(&dir, gateway.clone(), MemoryConfigStore::new());
    let exe = fixture_exe(&dir);

    let service = manager.create_service(request("My App", &exe)).await.unwrap();
    assert_eq!(service.status, ServiceStatus::Stopped);
    assert_eq!(gateway.service_status(&service.id), Some(ServiceStatus::Stopped));

    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(gateway.service_status(&service.id), Some(ServiceStatus::Running));
    let listed = manager.get_services().await.unwrap();
    assert_eq!(listed[0].status, ServiceStatus::Running);
    assert_eq!(listed[0].pid, 4242);

    // list-updated from the create, then the deferred start's notification
    assert!(matches!(
        events.try_recv().unwrap(),
        ManagerEvent::ListUpdated { .. }
    ));
    match events.try_recv().unwrap() {
        ManagerEvent::StatusChanged {
            service_id,
            status,
            pid,
        } => {
            assert_eq!(service_id, service.id);
            assert_eq!(status, ServiceStatus::Running);
            assert_eq!(pid, 4242);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn start_unknown_service_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, _events) = new_manager(&dir, MockGateway::new(), MemoryConfigStore::new());

    assert!(matches!(
        manager.start_service("WSM_nope_0").await,
        Err(Error::UnknownService(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn start_already_running_service_fails() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = MockGateway::new();
    let (manager, _events) = new_manager(&dir, gateway.clone(), MemoryConfigStore::new());
    let exe = fixture_exe(&dir);

    let service = manager.create_service(request("My App", &exe)).await.unwrap();
    gateway.set_status(&service.id, ServiceStatus::Running, 77);

    assert!(matches!(
        manager.start_service(&service.id).await,
        Err(Error::AlreadyRunning(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn start_updates_record_cache_and_notifies() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = MockGateway::new();
    let (manager, mut events) = new_manager(&dir, gateway.clone(), MemoryConfigStore::new());
    let exe = fixture_exe(&dir);

    let service = manager.create_service(request("My App", &exe)).await.unwrap();
    let _ = events.try_recv();

    manager.start_service(&service.id).await.unwrap();

    match events.try_recv().unwrap() {
        ManagerEvent::StatusChanged {
            service_id,
            status,
            pid,
        } => {
            assert_eq!(service_id, service.id);
            assert_eq!(status, ServiceStatus::Running);
            assert_eq!(pid, 4242);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // The fresh observation is cached: a query failure right after is
    // absorbed by the cache within its TTL.
    gateway.fail_on(MockOp::Query);
    let listed = manager.get_services().await.unwrap();
    assert_eq!(listed[0].status, ServiceStatus::Running);
    assert_eq!(listed[0].pid, 4242);
}

#[tokio::test(start_paused = true)]
async fn start_observing_stopped_is_a_start_failure_not_a_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = MockGateway::new();
    let (manager, _events) = new_manager(&dir, gateway.clone(), MemoryConfigStore::new());
    let exe = fixture_exe(&dir);

    let service = manager.create_service(request("My App", &exe)).await.unwrap();
    gateway.set_start_outcome(&service.id, StartOutcome::ExitImmediately);

    match manager.start_service(&service.id).await {
        Err(Error::StartFailed(id)) => assert_eq!(id, service.id),
        other => panic!("unexpected result: {other:?}"),
    }

    assert_eq!(
        snapshot_on_disk(&dir)[&service.id].status,
        ServiceStatus::Error
    );
}

#[tokio::test(start_paused = true)]
async fn start_times_out_after_thirty_seconds_and_marks_error() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = MockGateway::new();
    let (manager, _events) = new_manager(&dir, gateway.clone(), MemoryConfigStore::new());
    let exe = fixture_exe(&dir);

    let service = manager.create_service(request("My App", &exe)).await.unwrap();
    gateway.set_start_outcome(&service.id, StartOutcome::Hang);

    let started = tokio::time::Instant::now();
    match manager.start_service(&service.id).await {
        Err(Error::Timeout { id, target }) => {
            assert_eq!(id, service.id);
            assert_eq!(target, ServiceStatus::Running);
        }
        other => panic!("unexpected result: {other:?}"),
    }

    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(30));
    assert!(waited < Duration::from_secs(35));
    assert_eq!(
        snapshot_on_disk(&dir)[&service.id].status,
        ServiceStatus::Error
    );
}

#[tokio::test(start_paused = true)]
async fn stop_on_stopped_service_succeeds_without_control_signal() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = MockGateway::new();
    let (manager, mut events) = new_manager(&dir, gateway.clone(), MemoryConfigStore::new());
    let exe = fixture_exe(&dir);

    let service = manager.create_service(request("My App", &exe)).await.unwrap();
    let _ = events.try_recv();

    manager.stop_service(&service.id).await.unwrap();

    assert_eq!(gateway.control_signals(&service.id), 0);
    assert!(events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn stop_running_service_signals_and_notifies() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = MockGateway::new();
    let (manager, mut events) = new_manager(&dir, gateway.clone(), MemoryConfigStore::new());
    let exe = fixture_exe(&dir);

    let service = manager.create_service(request("My App", &exe)).await.unwrap();
    let _ = events.try_recv();
    gateway.set_status(&service.id, ServiceStatus::Running, 55);

    manager.stop_service(&service.id).await.unwrap();

    assert_eq!(gateway.control_signals(&service.id), 1);
    assert_eq!(gateway.service_status(&service.id), Some(ServiceStatus::Stopped));
    match events.try_recv().unwrap() {
        ManagerEvent::StatusChanged {
            service_id,
            status,
            pid,
        } => {
            assert_eq!(service_id, service.id);
            assert_eq!(status, ServiceStatus::Stopped);
            assert_eq!(pid, 0);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn stop_timeout_marks_record_error() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = MockGateway::new();
    let (manager, _events) = new_manager(&dir, gateway.clone(), MemoryConfigStore::new());
    let exe = fixture_exe(&dir);

    let service = manager.create_service(request("My App", &exe)).await.unwrap();
    gateway.set_status(&service.id, ServiceStatus::Running, 55);
    gateway.set_stop_outcome(&service.id, StopOutcome::Ignore);

    assert!(matches!(
        manager.stop_service(&service.id).await,
        Err(Error::Timeout { .. })
    ));
    assert_eq!(
        snapshot_on_disk(&dir)[&service.id].status,
        ServiceStatus::Error
    );
}

#[tokio::test(start_paused = true)]
async fn delete_failure_keeps_the_record_for_retry() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = MockGateway::new();
    let store = MemoryConfigStore::new();
    let (manager, _events) = new_manager(&dir, gateway.clone(), store.clone());
    let exe = fixture_exe(&dir);

    let service = manager.create_service(request("My App", &exe)).await.unwrap();
    gateway.fail_on(MockOp::Delete);

    assert!(manager.delete_service(&service.id).await.is_err());

    let listed = manager.get_services().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, service.id);
    assert_eq!(listed[0].status, ServiceStatus::Stopped);

    // Retry succeeds once the registrar cooperates again.
    gateway.clear_failure(MockOp::Delete);
    manager.delete_service(&service.id).await.unwrap();
    assert!(manager.get_services().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn delete_removes_record_config_and_notifies() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = MockGateway::new();
    let store = MemoryConfigStore::new();
    let (manager, mut events) = new_manager(&dir, gateway.clone(), store.clone());
    let exe = fixture_exe(&dir);

    let service = manager.create_service(request("My App", &exe)).await.unwrap();
    let _ = events.try_recv();

    manager.delete_service(&service.id).await.unwrap();

    assert!(!gateway.has_service(&service.id));
    assert!(!store.contains(&service.id));
    assert!(manager.get_services().await.unwrap().is_empty());
    match events.try_recv().unwrap() {
        ManagerEvent::ListUpdated { services } => assert!(services.is_empty()),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn listing_reports_error_status_when_queries_fail() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = MockGateway::new();
    let (manager, _events) = new_manager(&dir, gateway.clone(), MemoryConfigStore::new());
    let exe = fixture_exe(&dir);

    let service = manager.create_service(request("My App", &exe)).await.unwrap();
    gateway.fail_on(MockOp::Query);

    let listed = manager.get_services().await.unwrap();
    assert_eq!(listed[0].id, service.id);
    assert_eq!(listed[0].status, ServiceStatus::Error);
    assert_eq!(listed[0].pid, 0);
}

#[tokio::test(start_paused = true)]
async fn auto_start_flag_mirrors_the_registrar() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = MockGateway::new();
    let (manager, _events) = new_manager(&dir, gateway.clone(), MemoryConfigStore::new());
    let exe = fixture_exe(&dir);

    let service = manager.create_service(request("My App", &exe)).await.unwrap();
    assert_eq!(manager.get_service_auto_start(&service.id).await.unwrap(), true);

    manager
        .set_service_auto_start(&service.id, false)
        .await
        .unwrap();

    assert_eq!(gateway.is_automatic(&service.id), Some(false));
    assert_eq!(manager.get_service_auto_start(&service.id).await.unwrap(), false);
}

#[tokio::test(start_paused = true)]
async fn snapshot_survives_a_manager_restart() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = MockGateway::new();
    let store = MemoryConfigStore::new();
    let exe = fixture_exe(&dir);

    let created = {
        let (manager, _events) = new_manager(&dir, gateway.clone(), store.clone());
        manager
            .create_service(CreateServiceRequest {
                name: "My App".to_owned(),
                exe_path: exe.clone(),
                args: "--port 8080".to_owned(),
                working_dir: Some(dir.path().join("work")),
                log_path: Some(dir.path().join("logs").join("app.log")),
            })
            .await
            .unwrap()
    };

    let (restarted, _events) = new_manager(&dir, gateway, store);
    let listed = restarted.get_services().await.unwrap();

    assert_eq!(listed.len(), 1);
    let survivor = &listed[0];
    assert_eq!(survivor.id, created.id);
    assert_eq!(survivor.name, created.name);
    assert_eq!(survivor.exe_path, created.exe_path);
    assert_eq!(survivor.args, created.args);
    assert_eq!(survivor.working_dir, created.working_dir);
    assert_eq!(
        restarted.service_log_path(&survivor.id).await.unwrap(),
        created.log_path
    );
}
