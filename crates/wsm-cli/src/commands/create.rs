use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use tokio::sync::mpsc::Receiver;
use wsm_core::{ConfigStore, ServiceGateway, ServiceManager};
use wsm_types::{CreateServiceRequest, ManagerEvent};

/// How long to linger for the deferred first start to report before the
/// process exits.
const FIRST_START_GRACE: Duration = Duration::from_secs(5);

pub async fn create<G, S>(
    manager: &ServiceManager<G, S>,
    events: &mut Receiver<ManagerEvent>,
    name: String,
    exe: PathBuf,
    args: String,
    working_dir: Option<PathBuf>,
    log: Option<PathBuf>,
) -> Result<()>
where
    G: ServiceGateway + 'static,
    S: ConfigStore + 'static,
{
    let service = manager
        .create_service(CreateServiceRequest {
            name,
            exe_path: exe,
            args,
            working_dir,
            log_path: log,
        })
        .await?;

    println!("created {} ({})", service.id, service.name);

    // The first start is deferred and fire-and-forget; give it a moment to
    // report so the outcome is visible without a second command.
    let deadline = tokio::time::Instant::now() + FIRST_START_GRACE;
    loop {
        let Ok(maybe_event) = tokio::time::timeout_at(deadline, events.recv()).await else {
            println!("first start still pending; check `wsm list`");
            return Ok(());
        };
        match maybe_event {
            Some(ManagerEvent::StatusChanged {
                service_id,
                status,
                pid,
            }) if service_id == service.id => {
                println!("{service_id} is {status} (pid {pid})");
                return Ok(());
            }
            Some(_) => {}
            None => return Ok(()),
        }
    }
}
