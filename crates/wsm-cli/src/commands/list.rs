use anyhow::Result;
use colored::{Color, Colorize};
use wsm_core::{ConfigStore, ServiceGateway, ServiceManager};
use wsm_types::ServiceStatus;

pub async fn list<G, S>(manager: &ServiceManager<G, S>) -> Result<()>
where
    G: ServiceGateway + 'static,
    S: ConfigStore + 'static,
{
    let services = manager.get_services().await?;

    if services.is_empty() {
        println!("no services");
        return Ok(());
    }

    println!(
        "{:<32} {:<20} {:<10} {:>7}  {:<5}  {}",
        "ID", "NAME", "STATUS", "PID", "BOOT", "EXECUTABLE"
    );
    for service in &services {
        let status = format!("{:<10}", service.status).color(status_color(service.status));
        println!(
            "{:<32} {:<20} {status} {:>7}  {:<5}  {}",
            service.id,
            service.name,
            service.pid,
            if service.auto_start { "auto" } else { "man" },
            service.exe_path.display(),
        );
    }

    Ok(())
}

fn status_color(status: ServiceStatus) -> Color {
    match status {
        ServiceStatus::Running => Color::Green,
        ServiceStatus::Stopped => Color::Yellow,
        ServiceStatus::Starting | ServiceStatus::Stopping => Color::Cyan,
        ServiceStatus::Error => Color::Red,
    }
}
