//! Run parameters, parsed from the command line.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;

use crate::error::BenchError;
use crate::uci::Depth;

/// Default depth every position is searched to.
pub const DEFAULT_MAX_DEPTH: Depth = 7;

/// Runs a UCI engine through a list of positions and reports how many nodes
/// and how much time it spends at every search depth.
#[derive(Parser, Debug, Clone)]
#[command(version, long_version = crate::build::CLAP_LONG_VERSION, about)]
pub struct Config {
    /// Engine executable to benchmark.
    #[arg(long, env = "UCI_BENCH_ENGINE")]
    pub engine: PathBuf,

    /// Extra argument passed to the engine on launch. Can be repeated.
    #[arg(long = "engine-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub engine_args: Vec<String>,

    /// File with one position (FEN) per line.
    #[arg(long, env = "UCI_BENCH_POSITIONS", default_value = "benchmark-positions")]
    pub positions: PathBuf,

    /// Depth each position is searched to, i.e. how many depth reports are
    /// expected per position.
    #[arg(
        long,
        env = "UCI_BENCH_MAX_DEPTH",
        default_value_t = DEFAULT_MAX_DEPTH,
        value_parser = clap::value_parser!(Depth).range(1..)
    )]
    pub max_depth: Depth,

    /// Engine option sent as `setoption` before every search. Can be
    /// repeated.
    #[arg(long = "option", value_name = "NAME=VALUE")]
    pub options: Vec<EngineOption>,

    /// Seconds to wait for the engine to answer `isready`.
    #[arg(long, value_name = "SECS", default_value_t = 10)]
    pub ready_timeout: u64,

    /// Seconds a single search may take before the engine is killed. Searches
    /// are not limited by default.
    #[arg(long, value_name = "SECS")]
    pub search_timeout: Option<u64>,
}

impl Config {
    /// Creates a configuration with default limits.
    #[must_use]
    pub fn new(engine: impl Into<PathBuf>, positions: impl Into<PathBuf>) -> Self {
        Self {
            engine: engine.into(),
            engine_args: Vec::new(),
            positions: positions.into(),
            max_depth: DEFAULT_MAX_DEPTH,
            options: Vec::new(),
            ready_timeout: 10,
            search_timeout: None,
        }
    }

    /// Bounded wait for `readyok`.
    #[must_use]
    pub const fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout)
    }

    /// Wall-clock limit of one search, if any.
    #[must_use]
    pub fn search_timeout(&self) -> Option<Duration> {
        self.search_timeout.map(Duration::from_secs)
    }
}

/// `setoption` parameter given as `NAME=VALUE`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineOption {
    /// Option name, e.g. `Hash`.
    pub name: String,
    /// Option value.
    pub value: String,
}

impl FromStr for EngineOption {
    type Err = BenchError;

    fn from_str(input: &str) -> Result<Self, BenchError> {
        let (name, value) = input
            .split_once('=')
            .ok_or_else(|| BenchError::InvalidOption(input.to_string()))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(BenchError::InvalidOption(input.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            value: value.trim().to_string(),
        })
    }
}
