use log::{info, warn};

/// Check if the process is running with elevated privileges
pub fn is_elevated() -> bool {
    #[cfg(unix)]
    {
        // SAFETY: geteuid has no preconditions and cannot fail.
        unsafe { libc::geteuid() == 0 }
    }
    #[cfg(not(unix))]
    {
        false
    }
}

/// Log the privilege level once at startup.
pub fn report_privileges() {
    if is_elevated() {
        info!("Running with elevated privileges");
    } else {
        warn!("Not running with elevated privileges, privileged memory sources will be disabled");
    }
}

/// Get instructions for elevating privileges on the current platform
pub fn get_elevation_instructions() -> &'static str {
    #[cfg(target_os = "windows")]
    {
        "Run as Administrator by right-clicking the executable and selecting 'Run as administrator'"
    }
    #[cfg(any(target_os = "linux", target_os = "macos"))]
    {
        "Run with sudo: 'sudo ./rust_acquire'"
    }
    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        "Run with elevated privileges appropriate for your operating system"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elevation_instructions_not_empty() {
        assert!(!get_elevation_instructions().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_is_elevated_matches_euid() {
        let euid = unsafe { libc::geteuid() };
        assert_eq!(is_elevated(), euid == 0);
    }
}
