//! # Observability
//!
//! One call to install a tracing subscriber for the engine. The engine logs
//! through `tracing`; the lower-level `agent` and `extract` modules log
//! through the `log` facade, which is bridged into the same subscriber.

use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Configuration for initializing the observability system.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// The maximum level captured for this crate.
    pub level: Level,
    pub target: LogTarget,
    /// Emit one JSON object per line instead of human-readable text.
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            target: LogTarget::default(),
            json: false,
        }
    }
}

/// Defines the output target for logs.
#[derive(Debug, Clone, Default)]
pub enum LogTarget {
    /// Log to stdout.
    #[default]
    Console,
    /// Log to a file, truncating it first.
    File(String),
}

/// Builds the filter: `RUST_LOG` plus a directive for this crate.
pub fn env_filter(level: Level) -> Result<EnvFilter, Box<dyn std::error::Error>> {
    Ok(EnvFilter::from_default_env().add_directive(format!("llm_stepflow={}", level).parse()?))
}

/// Initializes the global tracing subscriber and the `log` bridge.
///
/// Call once at the start of the application. `try_init` also installs the
/// `log` bridge, so no logger may be set beforehand.
///
/// # Errors
///
/// Fails if a global subscriber or logger is already installed, or the log
/// file cannot be created.
pub fn init(config: ObservabilityConfig) -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = tracing_subscriber::registry().with(env_filter(config.level)?);

    match (config.target, config.json) {
        (LogTarget::Console, false) => {
            subscriber
                .with(fmt::layer().with_writer(std::io::stdout))
                .try_init()?;
        }
        (LogTarget::Console, true) => {
            subscriber
                .with(fmt::layer().json().with_writer(std::io::stdout))
                .try_init()?;
        }
        (LogTarget::File(path), json) => {
            let file = std::fs::File::create(path)?;
            if json {
                subscriber
                    .with(fmt::layer().json().with_writer(file))
                    .try_init()?;
            } else {
                subscriber
                    .with(fmt::layer().with_ansi(false).with_writer(file))
                    .try_init()?;
            }
        }
    };

    Ok(())
}
