use std::path::PathBuf;

use crate::error::{Result, ShellError};

/// What one standard stream of a stage should be connected to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StreamTarget {
    /// Whatever the launcher would otherwise give it: the shell's stream or a pipe end.
    #[default]
    Inherit,
    /// A file opened by the launcher right before spawning.
    File(PathBuf),
}

/// One executable unit: argument vector plus its I/O plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStage {
    /// Program name first, then its arguments. Never empty.
    pub argv: Vec<String>,
    pub stdin: StreamTarget,
    pub stdout: StreamTarget,
    pub stderr: StreamTarget,
    pub background: bool,
}

impl PipelineStage {
    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    pub fn args(&self) -> &[String] {
        &self.argv[1..]
    }
}

/// Separate redirection operators and the background marker from arguments.
///
/// Handles `<`, `>`, `2>` (each followed by a path) and a standalone `&`.
/// The same operator given twice keeps the last path. Nothing is opened
/// here; the launcher does that.
pub fn resolve(tokens: &[String]) -> Result<PipelineStage> {
    let mut argv = Vec::with_capacity(tokens.len());
    let mut stdin = StreamTarget::Inherit;
    let mut stdout = StreamTarget::Inherit;
    let mut stderr = StreamTarget::Inherit;
    let mut background = false;

    let mut iter = tokens.iter();
    while let Some(token) = iter.next() {
        let (operator, slot) = match token.as_str() {
            "<" => ("<", &mut stdin),
            ">" => (">", &mut stdout),
            "2>" => ("2>", &mut stderr),
            "&" => {
                background = true;
                continue;
            }
            _ => {
                argv.push(token.clone());
                continue;
            }
        };

        let path = iter
            .next()
            .ok_or(ShellError::MissingRedirectTarget { operator })?;
        *slot = StreamTarget::File(PathBuf::from(path));
    }

    if argv.is_empty() {
        return Err(ShellError::EmptyCommand);
    }

    Ok(PipelineStage {
        argv,
        stdin,
        stdout,
        stderr,
        background,
    })
}
