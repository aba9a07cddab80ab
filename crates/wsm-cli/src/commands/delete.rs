use anyhow::Result;
use wsm_core::{ConfigStore, ServiceGateway, ServiceManager};

pub async fn delete<G, S>(manager: &ServiceManager<G, S>, id: &str) -> Result<()>
where
    G: ServiceGateway + 'static,
    S: ConfigStore + 'static,
{
    manager.delete_service(id).await?;
    println!("{id} deleted");
    Ok(())
}
