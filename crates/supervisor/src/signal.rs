//! Process-group signalling.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Signal {
    Terminate,
    Kill,
}

/// Sends `sig` to every process in group `pgid`.
///
/// Returns `false` if the group no longer exists or could not be signalled.
#[cfg(unix)]
pub(crate) fn signal_group(pgid: u32, sig: Signal) -> bool {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return false;
    };
    if pgid <= 0 {
        return false;
    }
    let signo = match sig {
        Signal::Terminate => libc::SIGTERM,
        Signal::Kill => libc::SIGKILL,
    };
    // SAFETY: kill(2) takes plain integers; a negative pid addresses the
    // process group and never touches memory owned by this process.
    let rc = unsafe { libc::kill(-pgid, signo) };
    if rc != 0 {
        tracing::debug!(pgid, ?sig, err = %std::io::Error::last_os_error(), "group signal failed");
    }
    rc == 0
}

#[cfg(not(unix))]
pub(crate) fn signal_group(_pgid: u32, _sig: Signal) -> bool {
    false
}

/// Maps an exit status to a code, negative for a terminating signal.
pub(crate) fn exit_code(status: std::process::ExitStatus) -> Option<i32> {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return Some(-sig);
        }
    }
    status.code()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Command;

    #[test]
    fn missing_group_reports_failure() {
        assert!(!signal_group(0, Signal::Terminate));
        // Max pid is well below this on Linux.
        assert!(!signal_group(4_000_000, Signal::Kill));
    }

    #[test]
    fn killed_status_maps_to_negative_signal() {
        let status = Command::new("sh")
            .args(["-c", "kill -9 $$"])
            .status()
            .unwrap();
        assert_eq!(exit_code(status), Some(-9));
    }

    #[test]
    fn normal_exit_code() {
        let status = Command::new("sh").args(["-c", "exit 3"]).status().unwrap();
        assert_eq!(exit_code(status), Some(3));
    }
}
