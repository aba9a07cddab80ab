use anyhow::Result;
use wsm_core::{ConfigStore, ServiceGateway, ServiceManager};

pub async fn stop<G, S>(manager: &ServiceManager<G, S>, id: &str) -> Result<()>
where
    G: ServiceGateway + 'static,
    S: ConfigStore + 'static,
{
    manager.stop_service(id).await?;
    println!("{id} stopped");
    Ok(())
}
