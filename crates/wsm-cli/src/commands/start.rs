use anyhow::Result;
use wsm_core::{ConfigStore, ServiceGateway, ServiceManager};

pub async fn start<G, S>(manager: &ServiceManager<G, S>, id: &str) -> Result<()>
where
    G: ServiceGateway + 'static,
    S: ConfigStore + 'static,
{
    manager.start_service(id).await?;
    println!("{id} started");
    Ok(())
}
