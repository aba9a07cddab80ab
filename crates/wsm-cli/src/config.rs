use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// CLI for wsm
#[derive(Parser, Debug)]
#[command(
    name = "wsm",
    version,
    about = "Run arbitrary executables as supervised Windows services"
)]
pub struct Cli {
    /// Snapshot file overriding the default under the user config directory
    #[arg(long, global = true)]
    pub data_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Register a new service wrapping an executable
    Create {
        /// Display name for the service
        #[arg(long)]
        name: String,

        /// Path to the executable to supervise
        #[arg(long)]
        exe: PathBuf,

        /// Arguments passed to the executable
        #[arg(long, default_value = "", allow_hyphen_values = true)]
        args: String,

        /// Working directory (defaults to the executable's directory)
        #[arg(long)]
        working_dir: Option<PathBuf>,

        /// File receiving the executable's stdout/stderr
        #[arg(long)]
        log: Option<PathBuf>,
    },

    /// List managed services with refreshed statuses
    List,

    /// Start a service and wait until it is running
    Start {
        /// Service id, as shown by `wsm list`
        id: String,
    },

    /// Stop a service (succeeds immediately when already stopped)
    Stop {
        /// Service id, as shown by `wsm list`
        id: String,
    },

    /// Stop (best effort) and unregister a service
    Delete {
        /// Service id, as shown by `wsm list`
        id: String,
    },

    /// Show or change whether the OS launches the service at boot
    Autostart {
        /// Service id, as shown by `wsm list`
        id: String,

        /// true for automatic start at boot, false for manual; omit to show
        enabled: Option<bool>,
    },

    /// Follow service list and status notifications as JSON lines
    Watch,
}
