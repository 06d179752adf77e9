/// Last observed state of one member process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    /// Stopped by the given signal (SIGTSTP, SIGSTOP, SIGTTIN, SIGTTOU).
    Stopped(i32),
    /// Exited normally with the given code.
    Exited(i32),
    /// Terminated by the given signal.
    Signaled(i32),
}

impl ProcessState {
    pub fn is_finished(self) -> bool {
        matches!(self, ProcessState::Exited(_) | ProcessState::Signaled(_))
    }

    /// Shell convention: exit code, or `128 + signal` for a signal death.
    pub fn exit_code(self) -> Option<i32> {
        match self {
            ProcessState::Exited(code) => Some(code),
            ProcessState::Signaled(signal) => Some(128 + signal),
            _ => None,
        }
    }

    /// Decode a raw `waitpid` status word.
    #[cfg(unix)]
    pub fn from_wait_status(raw_status: libc::c_int) -> Self {
        if libc::WIFEXITED(raw_status) {
            return ProcessState::Exited(libc::WEXITSTATUS(raw_status));
        }
        if libc::WIFSIGNALED(raw_status) {
            return ProcessState::Signaled(libc::WTERMSIG(raw_status));
        }
        if libc::WIFSTOPPED(raw_status) {
            return ProcessState::Stopped(libc::WSTOPSIG(raw_status));
        }
        // WIFCONTINUED, the only other report waitpid can give us.
        ProcessState::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Linux encodings: exit code in bits 8..16, 0x7f marks a stop, 0xffff a continue.
    #[cfg(target_os = "linux")]
    #[test]
    fn decodes_linux_wait_statuses() {
        assert_eq!(ProcessState::from_wait_status(0), ProcessState::Exited(0));
        assert_eq!(ProcessState::from_wait_status(7 << 8), ProcessState::Exited(7));
        assert_eq!(
            ProcessState::from_wait_status(libc::SIGKILL),
            ProcessState::Signaled(libc::SIGKILL)
        );
        assert_eq!(
            ProcessState::from_wait_status((libc::SIGTSTP << 8) | 0x7f),
            ProcessState::Stopped(libc::SIGTSTP)
        );
        assert_eq!(ProcessState::from_wait_status(0xffff), ProcessState::Running);
    }

    #[test]
    fn exit_codes_follow_shell_convention() {
        assert_eq!(ProcessState::Exited(3).exit_code(), Some(3));
        assert_eq!(ProcessState::Signaled(2).exit_code(), Some(130));
        assert_eq!(ProcessState::Running.exit_code(), None);
        assert_eq!(ProcessState::Stopped(20).exit_code(), None);
    }

    #[test]
    fn only_exits_and_signal_deaths_finish() {
        assert!(ProcessState::Exited(0).is_finished());
        assert!(ProcessState::Signaled(9).is_finished());
        assert!(!ProcessState::Stopped(19).is_finished());
        assert!(!ProcessState::Running.is_finished());
    }
}
