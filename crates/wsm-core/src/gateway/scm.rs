use std::ffi::{OsStr, OsString};

use windows_service::{
    service::{
        Service, ServiceAccess, ServiceErrorControl, ServiceInfo, ServiceStartType, ServiceState,
        ServiceType,
    },
    service_manager::{ServiceManager as ScmHandle, ServiceManagerAccess},
};
use winreg::{enums::*, RegKey};
use wsm_types::ServiceStatus;

use crate::{
    error::{Error, Result},
    gateway::{ControlSignal, CreateSpec, GatewaySession, ServiceGateway, StatusProbe},
};

const SERVICES_KEY: &str = r"SYSTEM\CurrentControlSet\Services";
const ERROR_ACCESS_DENIED: i32 = 5;

// Registry Start values for the service start type.
const START_AUTOMATIC: u32 = 2;
const START_MANUAL: u32 = 3;

fn map_scm_err(op: &'static str, err: windows_service::Error) -> Error {
    if let windows_service::Error::Winapi(ref io_err) = err {
        if io_err.raw_os_error() == Some(ERROR_ACCESS_DENIED) {
            return Error::AccessDenied {
                op,
                message: err.to_string(),
            };
        }
    }
    Error::registrar(op, err)
}

fn map_io_err(op: &'static str, err: std::io::Error) -> Error {
    if err.raw_os_error() == Some(ERROR_ACCESS_DENIED) {
        return Error::AccessDenied {
            op,
            message: err.to_string(),
        };
    }
    Error::registrar(op, err)
}

fn map_state(state: ServiceState, pid: Option<u32>) -> StatusProbe {
    let (status, pid) = match state {
        ServiceState::Running => (ServiceStatus::Running, pid.unwrap_or(0)),
        ServiceState::Stopped => (ServiceStatus::Stopped, 0),
        ServiceState::StartPending => (ServiceStatus::Starting, 0),
        ServiceState::StopPending => (ServiceStatus::Stopping, pid.unwrap_or(0)),
        _ => (ServiceStatus::Error, 0),
    };
    StatusProbe { status, pid }
}

/// Gateway backed by the Windows Service Control Manager.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScmGateway;

impl ScmGateway {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl ServiceGateway for ScmGateway {
    type Session = ScmSession;

    async fn connect(&self) -> Result<Self::Session> {
        let handle = ScmHandle::local_computer(
            None::<&str>,
            ServiceManagerAccess::CONNECT | ServiceManagerAccess::CREATE_SERVICE,
        )
        .map_err(|err| map_scm_err("connect to service control manager", err))?;
        Ok(ScmSession { handle })
    }
}

/// One connected SCM session. The manager handle is released on drop;
/// per-service handles are opened and released inside each call.
pub struct ScmSession {
    handle: ScmHandle,
}

impl ScmSession {
    fn open(&self, id: &str, access: ServiceAccess) -> Result<Service> {
        self.handle
            .open_service(id, access)
            .map_err(|err| map_scm_err("open service", err))
    }

    fn service_key(&self, id: &str, op: &'static str) -> Result<RegKey> {
        RegKey::predef(HKEY_LOCAL_MACHINE)
            .open_subkey_with_flags(format!("{SERVICES_KEY}\\{id}"), KEY_SET_VALUE)
            .map_err(|err| map_io_err(op, err))
    }
}

#[async_trait::async_trait]
impl GatewaySession for ScmSession {
    async fn create(&mut self, spec: &CreateSpec) -> Result<()> {
        let info = ServiceInfo {
            name: OsString::from(&spec.id),
            display_name: OsString::from(&spec.display_name),
            service_type: ServiceType::OWN_PROCESS,
            start_type: if spec.auto_start {
                ServiceStartType::AutoStart
            } else {
                ServiceStartType::OnDemand
            },
            error_control: ServiceErrorControl::Normal,
            executable_path: spec.executable_path.clone(),
            launch_arguments: spec.launch_arguments.iter().map(OsString::from).collect(),
            dependencies: vec![],
            account_name: None,
            account_password: None,
        };

        let service = self
            .handle
            .create_service(&info, ServiceAccess::CHANGE_CONFIG)
            .map_err(|err| map_scm_err("create service", err))?;

        // Cosmetic only; a failure here must not orphan the service object.
        if let Err(err) = service.set_description(&spec.description) {
            tracing::warn!("failed to set description for {}: {err}", spec.id);
        }

        Ok(())
    }

    async fn delete(&mut self, id: &str) -> Result<()> {
        let service = self.open(id, ServiceAccess::DELETE)?;
        service
            .delete()
            .map_err(|err| map_scm_err("delete service", err))
    }

    async fn query(&mut self, id: &str) -> Result<StatusProbe> {
        let service = self.open(id, ServiceAccess::QUERY_STATUS)?;
        let status = service
            .query_status()
            .map_err(|err| map_scm_err("query service status", err))?;
        Ok(map_state(status.current_state, status.process_id))
    }

    async fn start(&mut self, id: &str) -> Result<()> {
        let service = self.open(id, ServiceAccess::START)?;
        let no_args: [&OsStr; 0] = [];
        service
            .start(&no_args)
            .map_err(|err| map_scm_err("start service", err))
    }

    async fn control(&mut self, id: &str, signal: ControlSignal) -> Result<()> {
        let service = self.open(id, ServiceAccess::STOP)?;
        match signal {
            ControlSignal::Stop => service
                .stop()
                .map(|_| ())
                .map_err(|err| map_scm_err("send stop signal", err)),
        }
    }

    async fn update_binary_path(&mut self, id: &str, binary_path: &str) -> Result<()> {
        // Written straight to the ImagePath value: the registered command
        // line contains the wrapper flag and service id, which the
        // ServiceInfo path/arguments split cannot express after creation.
        let key = self.service_key(id, "update service binary path")?;
        key.set_value("ImagePath", &binary_path)
            .map_err(|err| map_io_err("update service binary path", err))
    }

    async fn set_start_type(&mut self, id: &str, automatic: bool) -> Result<()> {
        let key = self.service_key(id, "update service start type")?;
        let start = if automatic {
            START_AUTOMATIC
        } else {
            START_MANUAL
        };
        key.set_value("Start", &start)
            .map_err(|err| map_io_err("update service start type", err))
    }
}
