use std::io::{self, Write};

use crate::jobs::{JobState, JobTable, Pid, Placement};
use crate::status::ProcessState;

/// Signals the shell ignores so that keyboard-generated job-control signals
/// reach only the foreground job. SIGINT is handled separately by the
/// prompt's Ctrl-C handler.
const SHELL_IGNORED: &[libc::c_int] = &[libc::SIGQUIT, libc::SIGTSTP, libc::SIGTTIN, libc::SIGTTOU];

/// Signals a child puts back to their default action before exec.
const CHILD_DEFAULTED: &[libc::c_int] = &[
    libc::SIGINT,
    libc::SIGQUIT,
    libc::SIGTSTP,
    libc::SIGTTIN,
    libc::SIGTTOU,
    libc::SIGCHLD,
];

pub fn ignore_job_control_signals() -> io::Result<()> {
    for &signal in SHELL_IGNORED {
        set_disposition(signal, libc::SIG_IGN)?;
    }
    Ok(())
}

/// Undo the shell's dispositions in a freshly forked child.
///
/// Runs between fork and exec, so it sticks to async-signal-safe calls.
pub fn restore_default_signals() -> io::Result<()> {
    for &signal in CHILD_DEFAULTED {
        set_disposition(signal, libc::SIG_DFL)?;
    }
    Ok(())
}

fn set_disposition(signal: libc::c_int, handler: libc::sighandler_t) -> io::Result<()> {
    let previous = unsafe { libc::signal(signal, handler) };
    if previous == libc::SIG_ERR {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

pub(crate) fn set_process_group(pid: Pid, pgid: Pid) -> io::Result<()> {
    loop {
        let rc = unsafe { libc::setpgid(pid, pgid) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(code) if code == libc::EINTR => continue,
            // Already exec'd or gone; caller can proceed with best-effort behavior.
            Some(code) if code == libc::EACCES || code == libc::ESRCH => return Ok(()),
            _ => return Err(err),
        }
    }
}

pub(crate) fn send_continue_to_group(pgid: Pid) -> io::Result<()> {
    if pgid <= 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "invalid process group id",
        ));
    }

    loop {
        let rc = unsafe { libc::kill(-pgid, libc::SIGCONT) };
        if rc == 0 {
            tracing::debug!(pgid, "sent SIGCONT");
            return Ok(());
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return Err(err);
    }
}

/// Tracks which process group owns the controlling terminal.
///
/// `foreground` is changed only through [`TerminalCoordinator::transfer`].
/// Without a terminal (stdin is not a tty) the ownership is still tracked
/// but no `tcsetpgrp` is issued.
#[derive(Debug)]
pub struct TerminalCoordinator {
    tty_fd: Option<libc::c_int>,
    shell_pgid: Pid,
    foreground: Pid,
}

impl TerminalCoordinator {
    pub fn new(interactive: bool) -> Self {
        let tty_fd = (interactive && unsafe { libc::isatty(libc::STDIN_FILENO) } == 1)
            .then_some(libc::STDIN_FILENO);
        let shell_pgid = unsafe { libc::getpgrp() };
        Self {
            tty_fd,
            shell_pgid,
            foreground: shell_pgid,
        }
    }

    /// Set up the shell's own signal dispositions and, when attached to a
    /// terminal, take it over in a process group of our own.
    pub fn claim(&mut self) -> io::Result<()> {
        let Some(fd) = self.tty_fd else {
            return ignore_job_control_signals();
        };

        // Launched in the background: wait until someone puts us in front.
        loop {
            let owner = unsafe { libc::tcgetpgrp(fd) };
            if owner < 0 {
                return Err(io::Error::last_os_error());
            }
            let own = unsafe { libc::getpgrp() };
            if owner == own {
                break;
            }
            unsafe { libc::kill(-own, libc::SIGTTIN) };
        }

        ignore_job_control_signals()?;

        let pid = unsafe { libc::getpid() };
        if unsafe { libc::getpgrp() } != pid {
            set_process_group(pid, pid)?;
        }
        self.shell_pgid = pid;
        self.transfer(pid)
    }

    pub fn shell_pgid(&self) -> Pid {
        self.shell_pgid
    }

    /// Process group currently owning the terminal.
    pub fn foreground(&self) -> Pid {
        self.foreground
    }

    pub fn is_interactive(&self) -> bool {
        self.tty_fd.is_some()
    }

    /// Terminal descriptor a foreground child should take over, if any.
    pub fn tty_fd(&self) -> Option<libc::c_int> {
        self.tty_fd
    }

    /// Give the terminal to `pgid`. The only place ownership changes.
    pub fn transfer(&mut self, pgid: Pid) -> io::Result<()> {
        if let Some(fd) = self.tty_fd {
            set_terminal_foreground(fd, pgid)?;
        }
        tracing::debug!(from = self.foreground, to = pgid, "terminal ownership transferred");
        self.foreground = pgid;
        Ok(())
    }

    /// Hand the terminal back to the shell.
    pub fn reclaim(&mut self) -> io::Result<()> {
        self.transfer(self.shell_pgid())
    }

    /// Give the terminal to `pgid` until the guard drops.
    pub fn hand_over(&mut self, pgid: Pid) -> io::Result<ForegroundGuard<'_>> {
        self.transfer(pgid)?;
        Ok(ForegroundGuard { terminal: self })
    }
}

/// Returns the terminal to the shell when dropped, whatever happened while
/// the job was in the foreground.
pub struct ForegroundGuard<'a> {
    terminal: &'a mut TerminalCoordinator,
}

impl Drop for ForegroundGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.terminal.reclaim() {
            tracing::warn!(%err, "failed to reclaim the terminal");
        }
    }
}

struct SignalIgnoreGuard {
    signal: libc::c_int,
    previous: libc::sighandler_t,
}

impl SignalIgnoreGuard {
    fn ignore(signal: libc::c_int) -> io::Result<Self> {
        let previous = unsafe { libc::signal(signal, libc::SIG_IGN) };
        if previous == libc::SIG_ERR {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { signal, previous })
    }
}

impl Drop for SignalIgnoreGuard {
    fn drop(&mut self) {
        unsafe {
            libc::signal(self.signal, self.previous);
        }
    }
}

/// Make the caller's own process group the terminal's foreground group.
///
/// Runs between fork and exec in a foreground child, after it has joined
/// its job's group. SIGTTOU is still ignored there (inherited from the
/// shell), so the call succeeds from outside the foreground group.
pub fn claim_terminal_in_child(fd: libc::c_int) -> io::Result<()> {
    let pgid = unsafe { libc::getpgrp() };
    loop {
        if unsafe { libc::tcsetpgrp(fd, pgid) } == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINTR) {
            return Err(err);
        }
    }
}

fn set_terminal_foreground(fd: libc::c_int, pgid: Pid) -> io::Result<()> {
    if pgid <= 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "invalid process group id",
        ));
    }

    let _sigttou = SignalIgnoreGuard::ignore(libc::SIGTTOU)?;
    loop {
        let rc = unsafe { libc::tcsetpgrp(fd, pgid) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return Err(err);
    }
}

// ── Status notification ──

/// One observed child status change, handed to the main loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusEvent {
    pub pid: Pid,
    pub state: ProcessState,
}

/// Non-blocking sweep over every live process in the table.
///
/// Only pids the table knows about are waited on, so children spawned
/// by anything else in the process are left alone.
pub fn collect_status_events(table: &JobTable) -> Vec<StatusEvent> {
    let flags = libc::WNOHANG | libc::WUNTRACED | libc::WCONTINUED;
    let mut events = Vec::new();

    for (pid, job) in table.live_pids() {
        // Several reports can be queued for one pid (stop, then continue, then exit).
        loop {
            match wait_raw(pid, flags) {
                Ok(Some((_, state))) => {
                    events.push(StatusEvent { pid, state });
                    if state.is_finished() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!(job, pid, %err, "waitpid failed");
                    break;
                }
            }
        }
    }

    events
}

/// Feed status changes into the table. The single writer of process state
/// on the notification path.
pub fn apply_status_events(table: &mut JobTable, events: impl IntoIterator<Item = StatusEvent>) {
    for event in events {
        table.update_status(event.pid, event.state);
    }
}

/// Exit code recorded for a process whose status could not be collected.
const LOST_STATUS: i32 = 1;

/// Block until job `id` stops or finishes, applying every change on the way.
pub fn wait_for_job(table: &mut JobTable, id: usize) -> io::Result<JobState> {
    loop {
        let Some(job) = table.get(id) else {
            return Err(io::Error::new(io::ErrorKind::NotFound, "job vanished"));
        };
        let state = job.state();
        if state != JobState::Running {
            return Ok(state);
        }
        let pgid = job.pgid;

        match wait_raw(-pgid, libc::WUNTRACED) {
            Ok(Some((pid, state))) => apply_status_events(table, [StatusEvent { pid, state }]),
            Ok(None) => {}
            Err(err) if err.raw_os_error() == Some(libc::ECHILD) => {
                // Reaped behind our back: the real status is gone, so record a failure.
                tracing::warn!(job = id, pgid, "no children left in process group");
                let lost: Vec<Pid> = job.live_pids().collect();
                let lost = lost.into_iter().map(|pid| StatusEvent {
                    pid,
                    state: ProcessState::Exited(LOST_STATUS),
                });
                apply_status_events(table, lost);
            }
            Err(err) => return Err(err),
        }
    }
}

/// Put job `id` in the foreground and block until it stops or finishes.
///
/// The terminal goes back to the shell either way. A finished job is removed
/// from the table; a stopped one moves to the background and is reported.
/// Returns the shell-style status of the job.
pub fn run_foreground(
    table: &mut JobTable,
    terminal: &mut TerminalCoordinator,
    id: usize,
    stdout: &mut dyn Write,
) -> io::Result<i32> {
    let pgid = match table.get_mut(id) {
        Some(job) => {
            job.placement = Placement::Foreground;
            job.pgid
        }
        None => return Err(io::Error::new(io::ErrorKind::NotFound, "no such job")),
    };

    let waited = match terminal.hand_over(pgid) {
        Ok(guard) => {
            tracing::debug!(job = id, owner = guard.terminal.foreground(), "waiting in foreground");
            wait_for_job(table, id)
        }
        Err(err) => {
            tracing::warn!(job = id, pgid, %err, "could not give the terminal to the job");
            wait_for_job(table, id)
        }
    };

    match waited? {
        JobState::Stopped => {
            let Some(job) = table.get_mut(id) else {
                return Ok(0);
            };
            job.placement = Placement::Background;
            let _ = writeln!(stdout);
            let _ = writeln!(stdout, "{job}");
            let signal = job
                .processes
                .iter()
                .find_map(|p| match p.state {
                    ProcessState::Stopped(signal) => Some(signal),
                    _ => None,
                })
                .unwrap_or(libc::SIGTSTP);
            Ok(128 + signal)
        }
        JobState::Done => {
            let code = table.remove(id).and_then(|job| job.exit_code()).unwrap_or(0);
            Ok(code)
        }
        JobState::Running => Ok(0),
    }
}

/// `waitpid` with EINTR retry. `Ok(None)` means nothing to report (WNOHANG).
fn wait_raw(pid: Pid, flags: libc::c_int) -> io::Result<Option<(Pid, ProcessState)>> {
    let mut raw_status: libc::c_int = 0;

    loop {
        let rc = unsafe { libc::waitpid(pid, &mut raw_status, flags) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return Err(err);
        }
        if rc == 0 {
            return Ok(None);
        }
        return Ok(Some((rc, ProcessState::from_wait_status(raw_status))));
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::process::CommandExt;
    use std::process::Command;

    use super::*;
    use crate::jobs::{Placement, Process};

    fn spawn_grouped(program: &str, args: &[&str]) -> Pid {
        let child = Command::new(program)
            .args(args)
            .process_group(0)
            .spawn()
            .expect("spawn child");
        child.id() as Pid
    }

    #[test]
    fn transfer_tracks_owner_without_a_terminal() {
        let mut terminal = TerminalCoordinator::new(false);
        assert!(!terminal.is_interactive());
        let shell = terminal.shell_pgid();
        assert_eq!(terminal.foreground(), shell);

        {
            let guard = terminal.hand_over(4242).unwrap();
            assert_eq!(guard.terminal.foreground(), 4242);
        }
        assert_eq!(terminal.foreground(), shell);
    }

    #[test]
    fn wait_for_job_reports_exit() {
        let pid = spawn_grouped("sh", &["-c", "exit 3"]);
        let mut table = JobTable::new();
        let id = table.register(pid, "sh -c exit 3", vec![Process::new(pid, "sh")], Placement::Foreground);

        assert_eq!(wait_for_job(&mut table, id).unwrap(), JobState::Done);
        assert_eq!(table.get(id).unwrap().exit_code(), Some(3));
    }

    #[test]
    fn wait_for_job_returns_on_stop_and_poll_sees_continue_and_exit() {
        let pid = spawn_grouped("sleep", &["0.3"]);
        let mut table = JobTable::new();
        let id = table.register(pid, "sleep 0.3", vec![Process::new(pid, "sleep")], Placement::Foreground);

        unsafe { libc::kill(pid, libc::SIGSTOP) };
        assert_eq!(wait_for_job(&mut table, id).unwrap(), JobState::Stopped);

        send_continue_to_group(pid).unwrap();
        table.get_mut(id).unwrap().mark_continued();
        assert_eq!(wait_for_job(&mut table, id).unwrap(), JobState::Done);
        assert_eq!(table.get(id).unwrap().exit_code(), Some(0));
    }

    #[test]
    fn collect_status_events_is_non_blocking() {
        let pid = spawn_grouped("sleep", &["5"]);
        let mut table = JobTable::new();
        let id = table.register(pid, "sleep 5", vec![Process::new(pid, "sleep")], Placement::Background);

        assert!(collect_status_events(&table).is_empty());

        unsafe { libc::kill(pid, libc::SIGKILL) };
        let mut events = Vec::new();
        for _ in 0..100 {
            events = collect_status_events(&table);
            if !events.is_empty() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert_eq!(
            events,
            vec![StatusEvent { pid, state: ProcessState::Signaled(libc::SIGKILL) }]
        );
        apply_status_events(&mut table, events);
        assert_eq!(table.get(id).unwrap().state(), JobState::Done);
    }

    #[test]
    fn run_foreground_removes_finished_job() {
        let pid = spawn_grouped("sh", &["-c", "exit 5"]);
        let mut table = JobTable::new();
        let mut terminal = TerminalCoordinator::new(false);
        let id = table.register(pid, "sh", vec![Process::new(pid, "sh")], Placement::Foreground);

        let mut out = Vec::new();
        assert_eq!(run_foreground(&mut table, &mut terminal, id, &mut out).unwrap(), 5);
        assert!(table.is_empty());
        assert!(out.is_empty());
        assert_eq!(terminal.foreground(), terminal.shell_pgid());
    }

    #[test]
    fn run_foreground_backgrounds_stopped_job() {
        let pid = spawn_grouped("sh", &["-c", "kill -STOP $$"]);
        let mut table = JobTable::new();
        let mut terminal = TerminalCoordinator::new(false);
        let id = table.register(pid, "stopper", vec![Process::new(pid, "sh")], Placement::Foreground);

        let mut out = Vec::new();
        let code = run_foreground(&mut table, &mut terminal, id, &mut out).unwrap();
        assert_eq!(code, 128 + libc::SIGSTOP);

        let job = table.get(id).unwrap();
        assert_eq!(job.state(), JobState::Stopped);
        assert_eq!(job.placement, Placement::Background);
        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("Stopped"), "output was: {printed}");
        assert_eq!(terminal.foreground(), terminal.shell_pgid());

        unsafe { libc::kill(-pid, libc::SIGKILL) };
        table.get_mut(id).unwrap().mark_continued();
        assert_eq!(wait_for_job(&mut table, id).unwrap(), JobState::Done);
    }

    #[test]
    fn lost_children_are_not_reported_as_success() {
        // Not a child of this process, so waitpid on its group gives ECHILD.
        let mut table = JobTable::new();
        let id = table.register(
            999_999,
            "ghost",
            vec![Process::new(999_999, "ghost")],
            Placement::Foreground,
        );

        assert_eq!(wait_for_job(&mut table, id).unwrap(), JobState::Done);
        assert_eq!(table.get(id).unwrap().exit_code(), Some(LOST_STATUS));
        assert_ne!(LOST_STATUS, 0);
    }

    #[test]
    fn child_terminal_claim_fails_without_a_terminal() {
        let file = tempfile::tempfile().unwrap();
        let fd = std::os::fd::AsRawFd::as_raw_fd(&file);
        assert!(claim_terminal_in_child(fd).is_err());
    }

    #[test]
    fn continue_rejects_invalid_group() {
        assert!(send_continue_to_group(0).is_err());
    }
}
