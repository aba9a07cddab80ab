//! Capability probe for service management rights. The manager performs no
//! elevation itself; callers decide what to do with a negative answer.

/// Whether this process can administer OS services.
#[must_use]
pub fn is_elevated() -> bool {
    imp::is_elevated()
}

#[cfg(windows)]
mod imp {
    use windows_service::service_manager::{ServiceManager, ServiceManagerAccess};

    pub(super) fn is_elevated() -> bool {
        // Service creation access is exactly the capability the manager
        // needs; the probe handle is released immediately.
        ServiceManager::local_computer(
            None::<&str>,
            ServiceManagerAccess::CONNECT | ServiceManagerAccess::CREATE_SERVICE,
        )
        .is_ok()
    }
}

#[cfg(unix)]
mod imp {
    pub(super) fn is_elevated() -> bool {
        // Unsafe: geteuid has no failure modes.
        #[allow(unsafe_code)]
        unsafe {
            libc::geteuid() == 0
        }
    }
}

#[cfg(not(any(windows, unix)))]
mod imp {
    pub(super) fn is_elevated() -> bool {
        false
    }
}
