use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, Stdio};

use os_pipe::{PipeReader, PipeWriter};

use crate::error::{Result, ShellError};
use crate::job_control::{self, TerminalCoordinator};
use crate::jobs::{JobTable, Pid, Placement, Process};
use crate::redirect::{PipelineStage, StreamTarget};

/// Processes that made it past exec, all in one process group.
#[derive(Debug)]
pub struct Spawned {
    pub pgid: Pid,
    pub processes: Vec<Process>,
}

/// Outcome of spawning a pipeline: whatever started, plus per-stage failures.
#[derive(Debug, Default)]
pub struct LaunchReport {
    pub spawned: Option<Spawned>,
    pub errors: Vec<ShellError>,
}

/// Start every stage, wiring stage N's stdout to stage N+1's stdin.
///
/// A stage that cannot open a redirect target or cannot be executed is
/// skipped and reported; its siblings still run. The first process that
/// starts leads the group and later ones join it. With `tty` set, each
/// child takes that terminal for the group before exec.
pub fn spawn_stages(stages: &[PipelineStage], tty: Option<libc::c_int>) -> LaunchReport {
    let mut report = LaunchReport::default();
    let mut upstream: Option<PipeReader> = None;
    let last = stages.len().saturating_sub(1);

    for (index, stage) in stages.iter().enumerate() {
        let (next_upstream, pipe_out) = if index < last {
            match os_pipe::pipe() {
                Ok((reader, writer)) => (Some(reader), Some(writer)),
                Err(err) => {
                    report.errors.push(err.into());
                    break;
                }
            }
        } else {
            (None, None)
        };

        let pgid = report.spawned.as_ref().map(|s| s.pgid);
        match spawn_stage(stage, upstream.take(), pipe_out, pgid, tty) {
            Ok(pid) => {
                tracing::debug!(pid, pgid = pgid.unwrap_or(pid), argv = ?stage.argv, "spawned stage");
                let process = Process::new(pid, stage.program());
                match report.spawned.as_mut() {
                    Some(spawned) => spawned.processes.push(process),
                    None => {
                        report.spawned = Some(Spawned {
                            pgid: pid,
                            processes: vec![process],
                        })
                    }
                }
            }
            Err(err) => {
                tracing::debug!(argv = ?stage.argv, %err, "stage failed to start");
                report.errors.push(err);
            }
        }

        // The parent keeps neither end past this point except the reader for
        // the next stage.
        upstream = next_upstream;
    }

    report
}

/// Spawn one stage. Explicit redirections win over pipe ends; a pipe end
/// that loses is closed here.
fn spawn_stage(
    stage: &PipelineStage,
    pipe_in: Option<PipeReader>,
    pipe_out: Option<PipeWriter>,
    pgid: Option<Pid>,
    tty: Option<libc::c_int>,
) -> Result<Pid> {
    let stdin = match &stage.stdin {
        StreamTarget::File(path) => Stdio::from(open_input(path)?),
        StreamTarget::Inherit => pipe_in.map_or_else(Stdio::inherit, Stdio::from),
    };
    let stdout = match &stage.stdout {
        StreamTarget::File(path) => Stdio::from(open_output(path)?),
        StreamTarget::Inherit => pipe_out.map_or_else(Stdio::inherit, Stdio::from),
    };
    let stderr = match &stage.stderr {
        StreamTarget::File(path) => Stdio::from(open_output(path)?),
        StreamTarget::Inherit => Stdio::inherit(),
    };

    let mut command = Command::new(stage.program());
    command
        .args(stage.args())
        .stdin(stdin)
        .stdout(stdout)
        .stderr(stderr)
        .process_group(pgid.unwrap_or(0));
    // SAFETY: the closure only calls getpgrp, tcsetpgrp and signal, all
    // async-signal-safe. The group is already joined when it runs.
    unsafe {
        command.pre_exec(move || {
            if let Some(fd) = tty {
                job_control::claim_terminal_in_child(fd)?;
            }
            job_control::restore_default_signals()
        });
    }

    let child = command.spawn().map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => ShellError::CommandNotFound {
            program: stage.program().to_string(),
        },
        _ => ShellError::Spawn {
            program: stage.program().to_string(),
            source,
        },
    })?;

    // The pid is tracked through the job table and reaped with waitpid.
    let pid = child.id() as Pid;
    // Also set from this side so the group exists before anyone signals it.
    if let Err(err) = job_control::set_process_group(pid, pgid.unwrap_or(pid)) {
        tracing::warn!(pid, %err, "could not place child in its process group");
    }
    Ok(pid)
}

fn open_input(path: &Path) -> Result<File> {
    File::open(path).map_err(|source| ShellError::Redirect {
        path: path.to_path_buf(),
        source,
    })
}

fn open_output(path: &Path) -> Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o644)
        .open(path)
        .map_err(|source| ShellError::Redirect {
            path: path.to_path_buf(),
            source,
        })
}

/// Spawn a pipeline, register it as a job and either wait for it in the
/// foreground or announce it as a background job.
///
/// Returns the shell-style status of the line.
pub fn launch(
    stages: &[PipelineStage],
    command_text: &str,
    table: &mut JobTable,
    terminal: &mut TerminalCoordinator,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> i32 {
    let background = stages.iter().any(|stage| stage.background);
    let tty = if background { None } else { terminal.tty_fd() };
    let LaunchReport { spawned, errors } = spawn_stages(stages, tty);

    let mut status = 0;
    for err in &errors {
        let _ = writeln!(stderr, "yash: {err}");
        status = err.exit_code();
    }

    let Some(spawned) = spawned else {
        return status;
    };

    let placement = if background {
        Placement::Background
    } else {
        Placement::Foreground
    };
    let id = table.register(spawned.pgid, command_text, spawned.processes, placement);

    if background {
        let last_pid = table.get(id).and_then(|job| job.last_pid()).unwrap_or(0);
        let _ = writeln!(stdout, "[{id}] {last_pid}");
        return 0;
    }

    match job_control::run_foreground(table, terminal, id, stdout) {
        // A stage that never started decides the status of the line.
        Ok(code) if status == 0 => code,
        Ok(_) => status,
        Err(err) => {
            let _ = writeln!(stderr, "yash: {err}");
            1
        }
    }
}
