use clap::Parser;

/// Longest line the shell accepts, in bytes.
pub const DEFAULT_MAX_LINE: usize = 2000;

/// Most tokens a single pipeline stage may carry.
pub const DEFAULT_MAX_TOKENS: usize = 67;

/// Runtime settings, from the command line or `YASH_*` environment variables.
#[derive(Debug, Clone, Parser)]
#[command(name = "yash", version, about = "A small job-control shell")]
pub struct Config {
    /// Prompt printed before each line (interactive sessions only)
    #[arg(long, env = "YASH_PROMPT", default_value = "# ")]
    pub prompt: String,

    /// Maximum number of tokens in one pipeline stage
    #[arg(long, env = "YASH_MAX_TOKENS", default_value_t = DEFAULT_MAX_TOKENS)]
    pub max_tokens: usize,

    /// Maximum accepted line length in bytes
    #[arg(long, env = "YASH_MAX_LINE", default_value_t = DEFAULT_MAX_LINE)]
    pub max_line: usize,

    /// Log filter directive, e.g. `debug` or `yash=trace`
    #[arg(long, env = "YASH_LOG", default_value = "warn")]
    pub log: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prompt: "# ".to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            max_line: DEFAULT_MAX_LINE,
            log: "warn".to_string(),
        }
    }
}

/// Install the stderr log subscriber. Only warnings show up unless asked.
pub fn init_logging(filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(filter)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
