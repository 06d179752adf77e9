use std::io::{self, Write};

use crate::builtins;
use crate::config::Config;
use crate::error::{Result, ShellError};
use crate::job_control::{self, TerminalCoordinator};
use crate::jobs::JobTable;
use crate::launcher;
use crate::parser::{self, Line};
use crate::redirect::{self, PipelineStage};

/// The shell's state between lines: settings, the job table and the
/// terminal coordinator. Every command path receives them from here.
pub struct Shell {
    config: Config,
    jobs: JobTable,
    terminal: TerminalCoordinator,
}

impl Shell {
    pub fn new(config: Config, interactive: bool) -> Self {
        Self {
            config,
            jobs: JobTable::new(),
            terminal: TerminalCoordinator::new(interactive),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_interactive(&self) -> bool {
        self.terminal.is_interactive()
    }

    /// Install signal dispositions and take the terminal if there is one.
    pub fn claim_terminal(&mut self) -> io::Result<()> {
        self.terminal.claim()
    }

    /// Apply pending status changes and report background jobs that finished.
    pub fn notify(&mut self, stdout: &mut dyn Write) {
        if self.jobs.is_empty() {
            return;
        }
        let events = job_control::collect_status_events(&self.jobs);
        job_control::apply_status_events(&mut self.jobs, events);

        for job in self.jobs.take_done() {
            let _ = writeln!(stdout, "{job}");
        }
    }

    /// Run one raw input line. Bytes that are not UTF-8 are reported and
    /// the line is skipped.
    pub fn execute_bytes(&mut self, input: &[u8], stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
        match std::str::from_utf8(input) {
            Ok(line) => self.execute_line(line, stdout, stderr),
            Err(_) => {
                let err = ShellError::InvalidUtf8;
                let _ = writeln!(stderr, "yash: {err}");
                err.exit_code()
            }
        }
    }

    /// Run one input line to completion (or to the background).
    /// Returns the shell-style status; errors are printed, never raised.
    pub fn execute_line(&mut self, input: &str, stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
        let line = input.trim_end_matches(['\n', '\r']);
        match self.dispatch(line, stdout, stderr) {
            Ok(code) => code,
            Err(err) => {
                let _ = writeln!(stderr, "yash: {err}");
                err.exit_code()
            }
        }
    }

    fn dispatch(&mut self, line: &str, stdout: &mut dyn Write, stderr: &mut dyn Write) -> Result<i32> {
        if line.len() > self.config.max_line {
            return Err(ShellError::LineTooLong {
                limit: self.config.max_line,
            });
        }

        match parser::parse(line, self.config.max_tokens)? {
            Line::Empty => Ok(0),
            Line::Builtin(command) => Ok(builtins::execute(
                &command,
                &mut self.jobs,
                &mut self.terminal,
                stdout,
                stderr,
            )),
            Line::Pipeline(raw_stages) => {
                let stages = raw_stages
                    .iter()
                    .map(|tokens| redirect::resolve(tokens))
                    .collect::<Result<Vec<PipelineStage>>>()?;
                tracing::trace!(?stages, "resolved pipeline");
                Ok(launcher::launch(
                    &stages,
                    line.trim(),
                    &mut self.jobs,
                    &mut self.terminal,
                    stdout,
                    stderr,
                ))
            }
        }
    }
}
