//! Logging facade. Re-exports the `slog` surface the rest of the crate
//! consumes (`logging::debug!(log, "msg"; "key" => value)`) and builds
//! the root logger from a TOML configuration via `sloggers`.

pub use slog::{crit, debug, error, info, o, trace, warn, Discard, Logger};

use crate::support::{EpsError, EpsResult};
use sloggers::{Config, LoggerConfig};

const DEFAULT_CONFIG: &str = r#"
type = "terminal"
level = "info"
destination = "stderr"
"#;

/// Root logger for the library, stderr terminal output at info level.
pub fn terminal() -> Logger {
    from_toml(DEFAULT_CONFIG).unwrap_or_else(|_| Logger::root(Discard, o!()))
}

/// Builds a logger from a `sloggers` TOML section.
pub fn from_toml(config: &str) -> EpsResult<Logger> {
    let config: LoggerConfig = serdeconv::from_toml_str(config)
        .map_err(|err| EpsError::OperSystem(err.to_string()))?;
    build(&config)
}

pub fn build(config: &LoggerConfig) -> EpsResult<Logger> {
    config
        .build_logger()
        .map_err(|err| EpsError::OperSystem(err.to_string()))
}
