//! The subset of the [Universal Chess Interface] (UCI) the harness speaks: the
//! commands sent to the engine and an incremental parser for its output.
//!
//! The parser is a small state machine. During the handshake only `uciok` and
//! `readyok` mean anything; once the search starts, `info depth ...` lines are
//! turned into [`DepthSample`]s until `bestmove` finishes the search. Anything
//! else the engine prints (`id`, `option`, `info string`, `info currmove`, ...)
//! is ignored.
//!
//! [Universal Chess Interface]: https://www.chessprogramming.org/UCI

use std::fmt;

use crate::error::BenchError;

/// Search depth in plies.
pub type Depth = u32;

/// Leading tokens of a depth report.
const REPORT_MARKER: &str = "info depth";
/// Leading token of the search completion line.
const COMPLETION_MARKER: &str = "bestmove";

/// Statistics the engine reported after finishing one depth.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DepthSample {
    /// Depth that was searched (starting from 1).
    pub depth: Depth,
    /// Nodes explored.
    pub nodes: u64,
    /// Elapsed time in milliseconds.
    pub time_ms: u64,
}

impl TryFrom<&str> for DepthSample {
    type Error = BenchError;

    /// Extracts `depth`, `nodes` and `time` from an `info` line. Fields can
    /// come in any order and unrelated fields are skipped.
    fn try_from(line: &str) -> Result<Self, BenchError> {
        let mut depth = None;
        let mut nodes = None;
        let mut time_ms = None;

        let mut tokens = line.split_whitespace();
        while let Some(token) = tokens.next() {
            let slot = match token {
                "depth" => &mut depth,
                "nodes" => &mut nodes,
                "time" => &mut time_ms,
                // Everything after `string` is free-form text.
                "string" => break,
                _ => continue,
            };
            *slot = tokens.next().and_then(|value| value.parse::<u64>().ok());
        }

        let malformed = |field| BenchError::MalformedReport {
            line: line.trim_end().to_string(),
            field,
        };
        let depth = depth
            .and_then(|depth| Depth::try_from(depth).ok())
            .filter(|&depth| depth > 0)
            .ok_or_else(|| malformed("depth"))?;
        let nodes = nodes.ok_or_else(|| malformed("nodes"))?;
        let time_ms = time_ms.ok_or_else(|| malformed("time"))?;
        Ok(Self {
            depth,
            nodes,
            time_ms,
        })
    }
}

/// Commands sent to the engine, one per line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command<'a> {
    /// Asks the engine to identify itself and switch to UCI mode.
    Uci,
    /// Sets an engine parameter.
    SetOption {
        /// Option name, e.g. `Hash`.
        name: &'a str,
        /// Option value.
        value: &'a str,
    },
    /// Synchronizes with the engine.
    IsReady,
    /// Sets up the position the search will start from.
    Position {
        /// Position descriptor, passed through as is.
        fen: &'a str,
    },
    /// Starts a fixed-depth search.
    Go {
        /// Maximum depth to search to.
        depth: Depth,
    },
    /// Asks the engine to exit.
    Quit,
}

impl fmt::Display for Command<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uci => f.write_str("uci"),
            Self::SetOption { name, value } => write!(f, "setoption name {name} value {value}"),
            Self::IsReady => f.write_str("isready"),
            Self::Position { fen } => write!(f, "position fen {fen}"),
            Self::Go { depth } => write!(f, "go depth {depth}"),
            Self::Quit => f.write_str("quit"),
        }
    }
}

/// Where the conversation with the engine currently is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// `uci`/`isready` were sent, waiting for `readyok`.
    Handshake,
    /// `go` was sent, waiting for depth reports or `bestmove`.
    Searching,
    /// `bestmove` was received.
    Finished,
}

/// Meaning of a single line of engine output.
#[derive(Debug)]
pub enum Event {
    /// `uciok`: the engine finished identifying itself.
    Identified,
    /// `readyok`: the engine is ready to accept a position.
    Ready,
    /// A well-formed depth report.
    Report(DepthSample),
    /// A depth report that lacks one of the required fields.
    Malformed(BenchError),
    /// `bestmove`: the search is over.
    Completed,
    /// Anything else.
    Ignored,
}

/// Incremental parser for engine output.
#[derive(Debug)]
pub struct Parser {
    phase: Phase,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    /// Creates a parser that expects the handshake first.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            phase: Phase::Handshake,
        }
    }

    /// Returns the current phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Switches to reading search output. Called right after `go` is sent.
    pub fn start_search(&mut self) {
        debug_assert_eq!(self.phase, Phase::Handshake);
        self.phase = Phase::Searching;
    }

    /// Interprets the next line of engine output.
    pub fn feed(&mut self, line: &str) -> Event {
        let line = line.trim();
        match self.phase {
            Phase::Handshake => match line {
                "uciok" => Event::Identified,
                "readyok" => Event::Ready,
                _ => Event::Ignored,
            },
            Phase::Searching => {
                if starts_with_token(line, COMPLETION_MARKER) {
                    self.phase = Phase::Finished;
                    Event::Completed
                } else if starts_with_token(line, REPORT_MARKER) {
                    match DepthSample::try_from(line) {
                        Ok(sample) => Event::Report(sample),
                        Err(e) => Event::Malformed(e),
                    }
                } else {
                    Event::Ignored
                }
            },
            Phase::Finished => Event::Ignored,
        }
    }
}

/// Checks that `line` starts with `marker` as whole words, so that e.g.
/// `bestmoves` does not count as `bestmove`.
fn starts_with_token(line: &str, marker: &str) -> bool {
    let mut line = line.split_whitespace();
    marker
        .split_whitespace()
        .all(|expected| line.next() == Some(expected))
}
