use std::{
    ffi::OsString,
    sync::{
        mpsc::{self, RecvTimeoutError},
        OnceLock,
    },
    time::Duration,
};

use windows_service::{
    define_windows_service,
    service::{
        ServiceControl, ServiceControlAccept, ServiceExitCode, ServiceState, ServiceStatus,
        ServiceType,
    },
    service_control_handler::{self, ServiceControlHandlerResult, ServiceStatusHandle},
    service_dispatcher,
};

use crate::{
    error::{Error, Result},
    host::child::ChildSupervisor,
    store::{ConfigStore, RegistryConfigStore},
};

const CONTROL_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// The dispatcher invokes the generated service main on its own thread, so
/// the id from the command line crosses over through process-global state.
static SERVICE_ID: OnceLock<String> = OnceLock::new();

define_windows_service!(ffi_service_main, service_main);

pub fn run(service_id: &str) -> Result<()> {
    SERVICE_ID
        .set(service_id.to_owned())
        .map_err(|_| Error::Unsupported("host already started in this process"))?;
    service_dispatcher::start(service_id, ffi_service_main)
        .map_err(|err| Error::registrar("start service dispatcher", err))
}

fn service_main(_arguments: Vec<OsString>) {
    if let Err(err) = run_service() {
        tracing::error!("service host failed: {err}");
    }
}

fn run_service() -> Result<()> {
    let Some(id) = SERVICE_ID.get() else {
        return Err(Error::Unsupported("service id not set before dispatch"));
    };

    let (control_tx, control_rx) = mpsc::channel();
    let handler = move |control: ServiceControl| -> ServiceControlHandlerResult {
        match control {
            ServiceControl::Stop | ServiceControl::Shutdown => {
                let _ = control_tx.send(());
                ServiceControlHandlerResult::NoError
            }
            // NoError echoes the current status back unchanged.
            ServiceControl::Interrogate => ServiceControlHandlerResult::NoError,
            _ => ServiceControlHandlerResult::NotImplemented,
        }
    };
    let status = service_control_handler::register(id, handler)
        .map_err(|err| Error::registrar("register service control handler", err))?;

    report(&status, ServiceState::StartPending, ServiceControlAccept::empty(), 0)?;

    tracing::info!("host starting service {id}");
    let config = match RegistryConfigStore::new().read(id) {
        Ok(config) => config,
        Err(err) => {
            report(&status, ServiceState::Stopped, ServiceControlAccept::empty(), 1)?;
            return Err(err);
        }
    };

    let mut child = match ChildSupervisor::launch(&config) {
        Ok(child) => child,
        Err(err) => {
            report(&status, ServiceState::Stopped, ServiceControlAccept::empty(), 1)?;
            return Err(err);
        }
    };

    report(
        &status,
        ServiceState::Running,
        ServiceControlAccept::STOP | ServiceControlAccept::SHUTDOWN,
        0,
    )?;
    tracing::info!("service {id} running, child pid {}", child.pid());

    loop {
        match control_rx.recv_timeout(CONTROL_POLL_INTERVAL) {
            Ok(()) => {
                tracing::info!("service {id} received stop signal");
                report(&status, ServiceState::StopPending, ServiceControlAccept::empty(), 0)?;
                child.terminate();
                report(&status, ServiceState::Stopped, ServiceControlAccept::empty(), 0)?;
                return Ok(());
            }
            Err(RecvTimeoutError::Timeout) => {
                if !child.is_running() {
                    tracing::info!("child exited on its own, stopping service {id}");
                    report(&status, ServiceState::Stopped, ServiceControlAccept::empty(), 0)?;
                    return Ok(());
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                child.terminate();
                report(&status, ServiceState::Stopped, ServiceControlAccept::empty(), 1)?;
                return Err(Error::Unsupported("service control channel closed"));
            }
        }
    }
}

fn report(
    handle: &ServiceStatusHandle,
    state: ServiceState,
    controls_accepted: ServiceControlAccept,
    exit_code: u32,
) -> Result<()> {
    handle
        .set_service_status(ServiceStatus {
            service_type: ServiceType::OWN_PROCESS,
            current_state: state,
            controls_accepted,
            exit_code: ServiceExitCode::Win32(exit_code),
            checkpoint: 0,
            wait_hint: Duration::default(),
            process_id: None,
        })
        .map_err(|err| Error::registrar("report service status", err))
}
