use std::{
    fs::File,
    path::Path,
    process::{Child, Command, Stdio},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use wsm_types::PersistedConfig;

use crate::error::Result;

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Supervises exactly one child process for the lifetime of one host
/// instance. A monitor thread watches for the child exiting on its own and
/// flips the running flag; the flag transition is monotone, so the control
/// loop only ever reads it.
#[derive(Debug)]
pub struct ChildSupervisor {
    child: Arc<Mutex<Child>>,
    pid: u32,
    running: Arc<AtomicBool>,
    monitor: Option<JoinHandle<()>>,
}

impl ChildSupervisor {
    /// Launches the configured workload with its window hidden, the working
    /// directory set (defaulting to the executable's own directory), and
    /// stdout/stderr redirected into the configured log file, truncated at
    /// launch. Without a log path the output is discarded.
    ///
    /// # Errors
    /// Fails when the log file cannot be opened or the process cannot be
    /// spawned.
    pub fn launch(config: &PersistedConfig) -> Result<Self> {
        let mut command = Command::new(&config.exe_path);
        if !config.args.trim().is_empty() {
            command.args(config.args.split_whitespace());
        }

        let working_dir = config
            .working_dir
            .clone()
            .filter(|dir| !dir.as_os_str().is_empty())
            .or_else(|| config.exe_path.parent().map(Path::to_path_buf));
        if let Some(dir) = working_dir {
            command.current_dir(dir);
        }

        match &config.log_path {
            Some(path) => {
                if let Some(dir) = path.parent() {
                    std::fs::create_dir_all(dir)?;
                }
                let log = File::create(path)?;
                let log_err = log.try_clone()?;
                command.stdout(Stdio::from(log)).stderr(Stdio::from(log_err));
            }
            None => {
                command.stdout(Stdio::null()).stderr(Stdio::null());
            }
        }

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            command.creation_flags(CREATE_NO_WINDOW);
        }

        let child = command.spawn()?;
        let pid = child.id();
        tracing::info!("child process started: {} (pid {pid})", config.exe_path.display());

        let child = Arc::new(Mutex::new(child));
        let running = Arc::new(AtomicBool::new(true));
        let monitor = thread::spawn({
            let child = Arc::clone(&child);
            let running = Arc::clone(&running);
            move || monitor_child(&child, &running)
        });

        Ok(Self {
            child,
            pid,
            running,
            monitor: Some(monitor),
        })
    }

    /// Whether the child is still alive. Flips to false exactly once, when
    /// the monitor observes the exit.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Forcibly terminates the child and waits until the monitor has
    /// observed the exit. Safe to call after the child already exited.
    pub fn terminate(&mut self) {
        if self.is_running() {
            tracing::info!("stopping child process (pid {})", self.pid);
            if let Ok(mut child) = self.child.lock() {
                if let Err(err) = child.kill() {
                    tracing::warn!("failed to kill child process: {err}");
                }
            }
        }
        if let Some(monitor) = self.monitor.take() {
            let _ = monitor.join();
        }
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Polls for child exit under short-lived locks, so a concurrent terminate
/// can still reach the process handle.
fn monitor_child(child: &Arc<Mutex<Child>>, running: &Arc<AtomicBool>) {
    loop {
        let exited = match child.lock() {
            Ok(mut guard) => match guard.try_wait() {
                Ok(Some(status)) => {
                    tracing::info!("child process exited: {status}");
                    true
                }
                Ok(None) => false,
                Err(err) => {
                    tracing::warn!("failed to poll child process: {err}");
                    true
                }
            },
            Err(_) => true,
        };
        if exited {
            break;
        }
        thread::sleep(EXIT_POLL_INTERVAL);
    }
    running.store(false, Ordering::SeqCst);
}
