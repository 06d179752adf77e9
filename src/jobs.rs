use std::collections::BTreeMap;
use std::fmt;

use crate::status::ProcessState;

pub type Pid = libc::pid_t;

/// Aggregate lifecycle state of a job, derived from its processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Running,
    Stopped,
    Done,
}

/// Whether the shell is (or would be) blocking on the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Foreground,
    Background,
}

/// One OS process belonging to a job.
#[derive(Debug, Clone)]
pub struct Process {
    pub pid: Pid,
    /// Program the process was started from.
    pub program: String,
    pub state: ProcessState,
}

impl Process {
    pub fn new(pid: Pid, program: impl Into<String>) -> Self {
        Self {
            pid,
            program: program.into(),
            state: ProcessState::Running,
        }
    }
}

/// All processes launched from one input line, sharing a process group.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: usize,
    pub pgid: Pid,
    pub command: String,
    pub processes: Vec<Process>,
    pub placement: Placement,
}

impl Job {
    /// Done iff every process finished; Stopped iff some process is stopped
    /// and none is running; Running otherwise.
    pub fn state(&self) -> JobState {
        let mut any_stopped = false;
        for process in &self.processes {
            match process.state {
                ProcessState::Running => return JobState::Running,
                ProcessState::Stopped(_) => any_stopped = true,
                ProcessState::Exited(_) | ProcessState::Signaled(_) => {}
            }
        }
        if any_stopped {
            JobState::Stopped
        } else {
            JobState::Done
        }
    }

    /// Status of the last stage, once it has finished.
    pub fn exit_code(&self) -> Option<i32> {
        self.processes.last().and_then(|p| p.state.exit_code())
    }

    /// Pids that can still report a status change.
    pub fn live_pids(&self) -> impl Iterator<Item = Pid> + '_ {
        self.processes
            .iter()
            .filter(|p| !p.state.is_finished())
            .map(|p| p.pid)
    }

    pub fn last_pid(&self) -> Option<Pid> {
        self.processes.last().map(|p| p.pid)
    }

    /// Record that the group was sent SIGCONT.
    pub fn mark_continued(&mut self) {
        for process in &mut self.processes {
            if let ProcessState::Stopped(_) = process.state {
                process.state = ProcessState::Running;
            }
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match (self.state(), self.exit_code()) {
            (JobState::Running, _) => "Running".to_string(),
            (JobState::Stopped, _) => "Stopped".to_string(),
            (JobState::Done, Some(code)) if code != 0 => format!("Done({code})"),
            (JobState::Done, _) => "Done".to_string(),
        };
        write!(f, "[{}]  {:<10} {}", self.id, state, self.command)
    }
}

/// The shell's job table, keyed by job id.
///
/// Ids are handed out as one past the largest live id, so iteration order
/// is registration order.
#[derive(Debug, Default)]
pub struct JobTable {
    jobs: BTreeMap<usize, Job>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly spawned group. Returns the new job id.
    pub fn register(
        &mut self,
        pgid: Pid,
        command: impl Into<String>,
        processes: Vec<Process>,
        placement: Placement,
    ) -> usize {
        let id = self.jobs.keys().next_back().map_or(1, |last| last + 1);
        if let Some(stale) = self.find_by_pgid(pgid) {
            tracing::warn!(job = stale.id, pgid, "process group id reused while still tracked");
        }
        let job = Job {
            id,
            pgid,
            command: command.into(),
            processes,
            placement,
        };
        tracing::debug!(job = id, pgid, command = %job.command, "registered job");
        self.jobs.insert(id, job);
        id
    }

    pub fn get(&self, id: usize) -> Option<&Job> {
        self.jobs.get(&id)
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut Job> {
        self.jobs.get_mut(&id)
    }

    pub fn find_by_pgid(&self, pgid: Pid) -> Option<&Job> {
        self.jobs.values().find(|job| job.pgid == pgid)
    }

    /// Apply an observed status change to the owning process.
    ///
    /// Returns the id of the job that owns `pid`. Finished processes never
    /// change again, so a Done job stays Done.
    pub fn update_status(&mut self, pid: Pid, state: ProcessState) -> Option<usize> {
        for job in self.jobs.values_mut() {
            let Some(process) = job.processes.iter_mut().find(|p| p.pid == pid) else {
                continue;
            };
            if process.state.is_finished() {
                tracing::warn!(pid, ?state, "status change for a finished process ignored");
            } else {
                tracing::debug!(job = job.id, pid, program = %process.program, ?state, "process status changed");
                process.state = state;
            }
            return Some(job.id);
        }
        tracing::trace!(pid, "status change for an unknown pid");
        None
    }

    /// Jobs in registration order.
    pub fn list(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    /// The last-registered job accepted by `predicate`.
    pub fn most_recent(&self, predicate: impl Fn(&Job) -> bool) -> Option<usize> {
        self.jobs
            .values()
            .rev()
            .find(|job| predicate(job))
            .map(|job| job.id)
    }

    pub fn remove(&mut self, id: usize) -> Option<Job> {
        let job = self.jobs.remove(&id);
        if job.is_some() {
            tracing::debug!(job = id, "removed job");
        }
        job
    }

    /// Remove and return every Done job, in registration order, for reporting.
    pub fn take_done(&mut self) -> Vec<Job> {
        let done: Vec<usize> = self
            .jobs
            .values()
            .filter(|job| job.state() == JobState::Done)
            .map(|job| job.id)
            .collect();
        done.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    /// `(pid, job id)` for every process that has not finished yet.
    pub fn live_pids(&self) -> Vec<(Pid, usize)> {
        self.jobs
            .values()
            .flat_map(|job| job.live_pids().map(move |pid| (pid, job.id)))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
