use std::io::Write;

use crate::error::{Result, ShellError};
use crate::job_control::{self, TerminalCoordinator};
use crate::jobs::{JobState, JobTable, Placement};
use crate::parser::{Builtin, BuiltinCommand};

/// Run a job-control builtin, writing output to the provided streams.
/// Returns the exit code.
pub fn execute(
    command: &BuiltinCommand,
    job_table: &mut JobTable,
    terminal: &mut TerminalCoordinator,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> i32 {
    // Pick up any exits/stops since the last prompt before looking at states.
    let events = job_control::collect_status_events(job_table);
    job_control::apply_status_events(job_table, events);

    let result = match command.builtin {
        Builtin::Jobs => builtin_jobs(&command.args, job_table, stdout),
        Builtin::Bg => builtin_bg(&command.args, job_table, stdout),
        Builtin::Fg => builtin_fg(&command.args, job_table, terminal, stdout),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            let _ = writeln!(stderr, "yash: {err}");
            err.exit_code()
        }
    }
}

/// List all tracked jobs. Finished jobs count as reported once listed.
fn builtin_jobs(args: &[String], job_table: &mut JobTable, stdout: &mut dyn Write) -> Result<i32> {
    if !args.is_empty() {
        return Err(ShellError::BuiltinArguments { name: "jobs" });
    }

    for job in job_table.list() {
        writeln!(stdout, "{job}")?;
    }
    job_table.take_done();
    Ok(0)
}

/// Resume a stopped job in the background.
fn builtin_bg(args: &[String], job_table: &mut JobTable, stdout: &mut dyn Write) -> Result<i32> {
    let default = job_table.most_recent(|job| job.state() == JobState::Stopped);
    let job_id = resolve_job_id(Builtin::Bg, args, default, job_table)?;

    let Some(job) = job_table.get_mut(job_id) else {
        return Err(ShellError::NoSuchJob { builtin: "bg", id: job_id });
    };
    if job.state() == JobState::Running && job.placement == Placement::Background {
        return Err(ShellError::JobNotStopped { id: job_id });
    }

    job_control::send_continue_to_group(job.pgid)?;
    job.mark_continued();
    job.placement = Placement::Background;
    writeln!(stdout, "[{}]  {}", job.id, job.command)?;
    Ok(0)
}

/// Bring a background or stopped job to the foreground and wait for it.
fn builtin_fg(
    args: &[String],
    job_table: &mut JobTable,
    terminal: &mut TerminalCoordinator,
    stdout: &mut dyn Write,
) -> Result<i32> {
    let default = job_table.most_recent(|job| job.state() != JobState::Done);
    let job_id = resolve_job_id(Builtin::Fg, args, default, job_table)?;

    let Some(job) = job_table.get_mut(job_id) else {
        return Err(ShellError::NoSuchJob { builtin: "fg", id: job_id });
    };
    writeln!(stdout, "{}", job.command)?;

    if job.state() == JobState::Stopped {
        job_control::send_continue_to_group(job.pgid)?;
        job.mark_continued();
    }

    Ok(job_control::run_foreground(job_table, terminal, job_id, stdout)?)
}

// ── Helpers ──

/// Parse a job ID from an argument (accepts `%N` or `N`), falling back to
/// `default` when no argument is given. The job must exist and not be done.
fn resolve_job_id(
    builtin: Builtin,
    args: &[String],
    default: Option<usize>,
    job_table: &JobTable,
) -> Result<usize> {
    let name = builtin.name();
    let id = match args {
        [] => default.ok_or(ShellError::NoCurrentJob { builtin: name })?,
        [arg] => arg
            .strip_prefix('%')
            .unwrap_or(arg)
            .parse::<usize>()
            .map_err(|_| ShellError::InvalidJobId {
                builtin: name,
                arg: arg.clone(),
            })?,
        _ => return Err(ShellError::BuiltinArguments { name }),
    };

    match job_table.get(id) {
        None => Err(ShellError::NoSuchJob { builtin: name, id }),
        Some(job) if job.state() == JobState::Done => {
            Err(ShellError::JobFinished { builtin: name, id })
        }
        Some(_) => Ok(id),
    }
}
