//! Errors produced while benchmarking an engine.
//!
//! Fatal errors ([`BenchError::is_fatal`]) abort the whole run. The rest
//! degrade a single line, position or depth and the run carries on.

use std::io;
use std::path::PathBuf;

use crate::aggregate::PositionResult;
use crate::uci::Depth;

/// Everything that can go wrong between reading the position list and
/// printing the averaged profile.
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    /// The position list could not be opened or read.
    #[error(
        "can not read positions from {}{}",
        path.display(),
        line.map_or_else(String::new, |line| format!(" (line {line})"))
    )]
    SourceUnavailable {
        /// Path of the position list.
        path: PathBuf,
        /// Line that failed to read, if the file was opened successfully.
        line: Option<usize>,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// The engine process could not be launched.
    #[error("failed to launch engine {}", engine.display())]
    SpawnFailed {
        /// Engine executable.
        engine: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// A depth report lacks one of the required fields.
    #[error("malformed depth report (missing or invalid `{field}`): {line}")]
    MalformedReport {
        /// The offending engine output line.
        line: String,
        /// Label of the first field that could not be extracted.
        field: &'static str,
    },

    /// The engine stopped before announcing the end of the search.
    #[error("engine session ended early after {} depth(s): {reason}", partial.len())]
    SessionTerminatedEarly {
        /// Samples received before the session ended.
        partial: PositionResult,
        /// Why the session ended.
        reason: String,
    },

    /// No position reported a sample at this depth.
    #[error("no position reached depth {depth}")]
    InsufficientData {
        /// Depth without contributing samples.
        depth: Depth,
    },

    /// The run was cancelled by the operator.
    #[error("interrupted")]
    Interrupted,

    /// A `NAME=VALUE` engine option could not be parsed.
    #[error("invalid engine option `{0}`: expected NAME=VALUE")]
    InvalidOption(String),
}

impl BenchError {
    /// Returns `true` for errors that abort the whole run.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::SourceUnavailable { .. }
                | Self::SpawnFailed { .. }
                | Self::Interrupted
                | Self::InvalidOption(_)
        )
    }
}
