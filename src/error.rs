//! Error kinds and their process exit codes.
//!
//! Every failure surfaced to the CLI maps onto one of the kinds below.
//! Per-file problems (unreadable sources, parser failures) are not errors at
//! this level: they are skipped with a debug note, or turned into omitted
//! bundle entries by the budget selector.

use thiserror::Error;

/// Top-level error type for the analysis engine.
#[derive(Debug, Error)]
pub enum SliceError {
    /// Malformed CLI invocation or invalid flag value. Exit 3.
    #[error("{0}")]
    Usage(String),

    /// Every anchor request failed, or a symbol was ambiguous under strict
    /// mode. Exit 2. Carries the per-anchor detail already formatted for
    /// stderr.
    #[error("anchor resolution failed:\n{0}")]
    AnchorResolution(String),

    /// Unreadable or malformed configuration (repo config, root manifest).
    /// Exit 1.
    #[error("config error: {0}")]
    Config(String),

    /// I/O failure outside the per-file skip paths. Exit 1.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl SliceError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Process exit code for this error kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Usage(_) => 3,
            Self::AnchorResolution(_) => 2,
            Self::Config(_) | Self::Io { .. } => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, SliceError>;
