mod child;
#[cfg(windows)]
mod service;

pub use child::ChildSupervisor;

use std::path::Path;

use crate::error::Result;
#[cfg(not(windows))]
use crate::error::Error;

/// Invocation flag routing execution into host mode. The OS registrar
/// launches `"<managing-program>" --service-wrapper <service-id>`; it never
/// launches the target executable directly, because the service control
/// protocol requires the registered binary to speak that protocol.
pub const WRAPPER_FLAG: &str = "--service-wrapper";

/// Returns the service id when the command line selects host mode.
pub fn wrapper_invocation<I, A>(args: I) -> Option<String>
where
    I: IntoIterator<Item = A>,
    A: AsRef<str>,
{
    let mut args = args.into_iter().skip(1);
    if args.next()?.as_ref() != WRAPPER_FLAG {
        return None;
    }
    Some(args.next()?.as_ref().to_owned())
}

/// Command line registered as the OS service binary path.
pub fn wrapper_command_line(program: &Path, service_id: &str) -> String {
    format!("\"{}\" {WRAPPER_FLAG} {service_id}", program.display())
}

/// Runs the host for one service: registers with the OS service control
/// protocol and supervises the configured child process until a stop signal
/// arrives or the child exits on its own. Blocks for the service lifetime.
///
/// # Errors
/// Fails when the service control dispatcher cannot be entered or the
/// service configuration cannot be loaded.
pub fn run(service_id: &str) -> Result<()> {
    #[cfg(windows)]
    {
        service::run(service_id)
    }
    #[cfg(not(windows))]
    {
        let _ = service_id;
        Err(Error::Unsupported(
            "host mode requires the Windows service control manager",
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn wrapper_invocation_extracts_service_id() {
        let args = ["wsm", "--service-wrapper", "WSM_demo_1700000000"];
        assert_eq!(
            wrapper_invocation(args),
            Some("WSM_demo_1700000000".to_owned())
        );
    }

    #[test]
    fn wrapper_invocation_ignores_other_command_lines() {
        assert_eq!(wrapper_invocation(["wsm"]), None);
        assert_eq!(wrapper_invocation(["wsm", "list"]), None);
        assert_eq!(wrapper_invocation(["wsm", "--service-wrapper"]), None);
        assert_eq!(
            wrapper_invocation(["wsm", "start", "--service-wrapper"]),
            None
        );
    }

    #[test]
    fn wrapper_command_line_quotes_the_program() {
        let line = wrapper_command_line(&PathBuf::from(r"C:\Program Files\wsm\wsm.exe"), "WSM_a_1");
        assert_eq!(
            line,
            "\"C:\\Program Files\\wsm\\wsm.exe\" --service-wrapper WSM_a_1"
        );
    }
}
