use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc::Receiver;
use wsm_core::{ConfigStore, ServiceGateway, ServiceManager};
use wsm_types::ManagerEvent;

const REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// Prints the service list, then follows this process's manager
/// notifications and periodic refreshes as JSON lines until Ctrl-C.
pub async fn watch<G, S>(
    manager: &ServiceManager<G, S>,
    mut events: Receiver<ManagerEvent>,
) -> Result<()>
where
    G: ServiceGateway + 'static,
    S: ConfigStore + 'static,
{
    let services = manager.get_services().await?;
    print_event(&ManagerEvent::ListUpdated { services })?;

    let mut refresh = tokio::time::interval(REFRESH_INTERVAL);
    refresh.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),

            maybe_event = events.recv() => {
                let Some(event) = maybe_event else { return Ok(()) };
                print_event(&event)?;
            }

            _ = refresh.tick() => {
                let services = manager.get_services().await?;
                print_event(&ManagerEvent::ListUpdated { services })?;
            }
        }
    }
}

fn print_event(event: &ManagerEvent) -> Result<()> {
    println!("{}", serde_json::to_string(event)?);
    Ok(())
}
