#[cfg(not(unix))]
compile_error!("yash needs a POSIX process model (process groups, waitpid, tcsetpgrp)");

mod builtins;
mod config;
mod error;
mod job_control;
mod jobs;
mod launcher;
mod parser;
mod redirect;
mod shell;
mod status;

use std::io::{self, BufRead, Write};

use clap::Parser;
use crossterm::tty::IsTty;

use crate::config::Config;
use crate::shell::Shell;

fn main() {
    let config = Config::parse();
    config::init_logging(&config.log);

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut stderr = io::stderr();
    let interactive = stdin.is_tty();

    if let Err(err) = ctrlc::set_handler(|| {
        println!();
        let _ = io::stdout().flush();
    }) {
        tracing::warn!(%err, "failed to set Ctrl-C handler");
    }

    let mut input_lines = stdin.lock();

    let mut shell = Shell::new(config, interactive);
    if let Err(err) = shell.claim_terminal() {
        eprintln!("yash: cannot set up job control: {err}");
    }
    tracing::debug!(interactive = shell.is_interactive(), "shell started");

    loop {
        shell.notify(&mut stdout);

        if shell.is_interactive() {
            print!("{}", shell.config().prompt);
        }
        if stdout.flush().is_err() {
            break;
        }

        let mut input = Vec::new();
        match input_lines.read_until(b'\n', &mut input) {
            Ok(0) => {
                if shell.is_interactive() {
                    println!();
                }
                break;
            }
            Ok(_) => {
                let status = shell.execute_bytes(&input, &mut stdout, &mut stderr);
                tracing::debug!(status, "line finished");
            }
            Err(error) => {
                eprintln!("yash: error reading input: {error}");
                break;
            }
        }
    }
}
