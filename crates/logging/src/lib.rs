#![warn(missing_docs)]

//! Shared logging helpers, CLI argument definitions, and tracing utilities for the session-watch workspace.
//!
//! This crate consolidates logging infrastructure:
//! - [`fmt`]: Render tracing events to logfmt strings
//! - CLI argument parsing for log level configuration

use std::env;

use clap::Args;
use tracing_subscriber::{EnvFilter, filter::ParseError};

pub mod fmt;

/// Logging controls for CLI apps.
#[derive(Debug, Clone, Default, Args)]
pub struct LogArgs {
    /// Set global log level to trace (our crates only)
    #[arg(long, conflicts_with_all = ["debug", "log_level", "log_filter"])]
    pub trace: bool,

    /// Set global log level to debug (our crates only)
    #[arg(long, conflicts_with_all = ["trace", "log_level", "log_filter"])]
    pub debug: bool,

    /// Set a single global log level for our crates (error|warn|info|debug|trace)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Set an explicit tracing filter directive (overrides other flags)
    /// e.g. "session_watch=trace,dumpsessions=debug"
    #[arg(long)]
    pub log_filter: Option<String>,
}

impl LogArgs {
    /// Final filter spec for these arguments; see [`compute_spec`].
    pub fn spec(&self) -> String {
        compute_spec(
            self.trace,
            self.debug,
            self.log_level.as_deref(),
            self.log_filter.as_deref(),
        )
    }
}

/// List of crate targets that constitute "our" logs.
pub fn our_crates() -> &'static [&'static str] {
    &["session_watch", "dumpsessions", "logging"]
}

/// Build a filter directive string that sets the same `level` for all of our crates.
pub fn level_spec_for(level: &str) -> String {
    let lvl = level.to_ascii_lowercase();
    our_crates()
        .iter()
        .map(|t| format!("{}={}", t, lvl))
        .collect::<Vec<_>>()
        .join(",")
}

/// Environment variable checked before `RUST_LOG`.
pub const LOG_ENV: &str = "SESSION_WATCH_LOG";

/// Filter used when nothing else is configured: our crates at `info`,
/// everything else at `warn`.
pub fn default_spec() -> String {
    format!("warn,{}", level_spec_for("info"))
}

/// Pick the first non-blank filter from [`LOG_ENV`] and `RUST_LOG`.
fn env_spec(own: Option<String>, rust_log: Option<String>) -> Option<String> {
    [own, rust_log]
        .into_iter()
        .flatten()
        .find(|s| !s.trim().is_empty())
}

/// Compute the final filter spec string with precedence:
/// - `log_filter`
/// - `trace`/`debug`/`log_level` (crate-scoped)
/// - `SESSION_WATCH_LOG`, then `RUST_LOG`
/// - [`default_spec`]
pub fn compute_spec(
    trace: bool,
    debug: bool,
    log_level: Option<&str>,
    log_filter: Option<&str>,
) -> String {
    if let Some(spec) = log_filter {
        return spec.to_string();
    }
    if trace {
        return level_spec_for("trace");
    }
    if debug {
        return level_spec_for("debug");
    }
    if let Some(lvl) = log_level {
        return level_spec_for(lvl);
    }
    env_spec(env::var(LOG_ENV).ok(), env::var("RUST_LOG").ok()).unwrap_or_else(default_spec)
}

/// Parse a spec string into an `EnvFilter`, rejecting malformed directives
/// instead of silently ignoring them.
pub fn env_filter_from_spec(spec: &str) -> Result<EnvFilter, ParseError> {
    EnvFilter::try_new(spec)
}
