//! Log output setup.
//!
//! Lines go to stdout. When the `CI` environment variable is set they are
//! JSON objects, otherwise human-readable text. The level defaults to
//! `info` and can be changed through `RUST_LOG`.

use std::{env, io};
use tracing_subscriber::EnvFilter;

/// Environment variable switching the output to JSON.
pub const CI_ENV: &str = "CI";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    /// JSON when `ci` holds a non-empty value.
    pub fn detect(ci: Option<&str>) -> Self {
        match ci {
            Some(v) if !v.is_empty() => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }

    pub fn from_env() -> Self {
        Self::detect(env::var(CI_ENV).ok().as_deref())
    }

    pub fn is_json(self) -> bool {
        self == LogFormat::Json
    }
}

/// Installs the global subscriber. Fails if one is already set.
pub fn init_logging(format: LogFormat) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stdout);

    match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    }
    .map_err(anyhow::Error::msg)
}
