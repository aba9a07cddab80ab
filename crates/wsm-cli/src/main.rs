use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc::Receiver;
use wsm_core::{ConfigStore, ServiceGateway, ServiceManager};
use wsm_types::ManagerEvent;

mod commands;
mod config;

fn main() -> Result<()> {
    // Host mode must claim the process before the async runtime exists: the
    // service dispatcher blocks this thread for the service lifetime.
    if let Some(service_id) = wsm_core::host::wrapper_invocation(std::env::args()) {
        wsm_core::host::run(&service_id)?;
        return Ok(());
    }

    run_cli()
}

#[tokio::main]
async fn run_cli() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = config::Cli::parse();

    if !wsm_core::privileges::is_elevated() {
        tracing::warn!(
            "not running with administrator rights; service operations may be denied"
        );
    }

    let data_file = match &cli.data_file {
        Some(path) => path.clone(),
        None => default_data_file()?,
    };

    let (manager, events) = build_manager(data_file)?;
    dispatch(cli, &manager, events).await
}

async fn dispatch<G, S>(
    cli: config::Cli,
    manager: &Arc<ServiceManager<G, S>>,
    mut events: Receiver<ManagerEvent>,
) -> Result<()>
where
    G: ServiceGateway + 'static,
    S: ConfigStore + 'static,
{
    match cli.command {
        config::Commands::Create {
            name,
            exe,
            args,
            working_dir,
            log,
        } => commands::create(manager, &mut events, name, exe, args, working_dir, log).await,
        config::Commands::List => commands::list(manager).await,
        config::Commands::Start { id } => commands::start(manager, &id).await,
        config::Commands::Stop { id } => commands::stop(manager, &id).await,
        config::Commands::Delete { id } => commands::delete(manager, &id).await,
        config::Commands::Autostart { id, enabled } => {
            commands::autostart(manager, &id, enabled).await
        }
        config::Commands::Watch => commands::watch(manager, events).await,
    }
}

fn default_data_file() -> Result<PathBuf> {
    let config_dir =
        dirs::config_dir().ok_or_else(|| anyhow::anyhow!("no user config directory"))?;
    Ok(config_dir.join("wsm").join("services.json"))
}

#[cfg(windows)]
fn build_manager(
    data_file: PathBuf,
) -> Result<(
    Arc<ServiceManager<wsm_core::ScmGateway, wsm_core::RegistryConfigStore>>,
    Receiver<ManagerEvent>,
)> {
    Ok(ServiceManager::new(
        wsm_core::ScmGateway::new(),
        wsm_core::RegistryConfigStore::new(),
        wsm_core::ManagerOptions {
            data_file,
            wrapper_exe: std::env::current_exe()?,
        },
    ))
}

#[cfg(not(windows))]
fn build_manager(
    data_file: PathBuf,
) -> Result<(
    Arc<ServiceManager<wsm_core::MockGateway, wsm_core::MemoryConfigStore>>,
    Receiver<ManagerEvent>,
)> {
    let _ = data_file;
    anyhow::bail!("wsm manages Windows services and requires the Windows service control manager")
}
