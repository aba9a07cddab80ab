use anyhow::Result;
use wsm_core::{ConfigStore, ServiceGateway, ServiceManager};

pub async fn autostart<G, S>(
    manager: &ServiceManager<G, S>,
    id: &str,
    enabled: Option<bool>,
) -> Result<()>
where
    G: ServiceGateway + 'static,
    S: ConfigStore + 'static,
{
    match enabled {
        Some(enabled) => {
            manager.set_service_auto_start(id, enabled).await?;
            println!(
                "{id} start type set to {}",
                if enabled { "automatic" } else { "manual" }
            );
        }
        None => {
            let enabled = manager.get_service_auto_start(id).await?;
            println!("{}", if enabled { "automatic" } else { "manual" });
        }
    }
    Ok(())
}
