use crate::error::{Result, ShellError};

/// The job-control commands handled inside the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Jobs,
    Bg,
    Fg,
}

impl Builtin {
    fn lookup(name: &str) -> Option<Self> {
        match name {
            "jobs" => Some(Builtin::Jobs),
            "bg" => Some(Builtin::Bg),
            "fg" => Some(Builtin::Fg),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Jobs => "jobs",
            Builtin::Bg => "bg",
            Builtin::Fg => "fg",
        }
    }
}

/// A built-in invocation with its (already split) arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltinCommand {
    pub builtin: Builtin,
    pub args: Vec<String>,
}

/// What one input line turned into.
#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    /// Blank line: nothing to run, just prompt again.
    Empty,
    Builtin(BuiltinCommand),
    /// One or two stages of raw tokens, redirection operators still embedded.
    Pipeline(Vec<Vec<String>>),
}

/// Tokens that only make sense for external commands.
const OPERATORS: &[&str] = &["<", ">", "2>", "&"];

/// Split a stage on whitespace. Runs of blanks collapse; nothing is quoted.
pub fn tokenize(stage: &str) -> Vec<String> {
    stage.split_whitespace().map(str::to_string).collect()
}

/// Turn a raw line into a built-in call or a pipeline of at most two stages.
///
/// `max_tokens` bounds each stage; exceeding it is a parse error rather than
/// a silent truncation.
pub fn parse(input: &str, max_tokens: usize) -> Result<Line> {
    let segments: Vec<&str> = input.split('|').collect();
    if segments.len() > 2 {
        return Err(ShellError::PipelineTooLong);
    }

    let mut stages = Vec::with_capacity(segments.len());
    for segment in &segments {
        let tokens = tokenize(segment);
        if tokens.len() > max_tokens {
            return Err(ShellError::TooManyTokens { limit: max_tokens });
        }
        stages.push(tokens);
    }

    if let Some(builtin) = stages[0].first().and_then(|t| Builtin::lookup(t)) {
        let args = stages[0][1..].to_vec();
        if stages.len() > 1 || args.iter().any(|a| OPERATORS.contains(&a.as_str())) {
            return Err(ShellError::BuiltinNotCombinable { name: builtin.name() });
        }
        return Ok(Line::Builtin(BuiltinCommand { builtin, args }));
    }

    if stages.len() == 1 {
        if stages[0].is_empty() {
            return Ok(Line::Empty);
        }
    } else if stages.iter().any(Vec::is_empty) {
        return Err(ShellError::EmptyCommand);
    }

    Ok(Line::Pipeline(stages))
}
