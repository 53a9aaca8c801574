//! Runs the whole benchmark: every position once, in order, each in its own
//! engine process.

use std::io::Write;

use anyhow::Context;
use tracing::{info, info_span, warn};

use crate::aggregate::{AggregateProfile, Aggregator};
use crate::config::Config;
use crate::error::BenchError;
use crate::positions::PositionSource;
use crate::report::Reporter;
use crate::session::{self, Interrupt};

/// What a finished run produced.
#[derive(Debug)]
pub struct Summary {
    /// Number of positions that were benchmarked.
    pub positions: usize,
    /// Positions that did not reach the maximum depth.
    pub incomplete: usize,
    /// Per-depth averages over all positions.
    pub profile: AggregateProfile,
}

/// Benchmarks every position listed in the configured file and writes the
/// table to `output`.
///
/// A position whose engine dies, hangs past the search timeout or prints
/// garbage only degrades that position's row. Missing positions file, an
/// engine that can not be launched and an operator interrupt abort the run.
///
/// # Errors
///
/// Fatal [`BenchError`]s and failures to write the report.
pub fn run(
    config: &Config,
    output: impl Write,
    interrupt: &Interrupt,
) -> anyhow::Result<Summary> {
    let source = PositionSource::new(&config.positions);
    let positions = source.positions()?;

    let mut aggregator = Aggregator::new(config.max_depth);
    let mut reporter = Reporter::new(output);
    let mut incomplete = 0;
    reporter
        .depths(config.max_depth)
        .context("can not write the report")?;

    for (index, position) in (1..).zip(positions) {
        if interrupt.is_raised() {
            return Err(BenchError::Interrupted.into());
        }
        let position = position?;
        let _span = info_span!("position", index).entered();
        info!(%position, "benchmarking");

        let result = match session::benchmark(config, &position, interrupt) {
            Ok(result) => result,
            Err(BenchError::SessionTerminatedEarly { partial, reason }) => {
                warn!(
                    depth = partial.deepest(),
                    %reason,
                    "engine session ended early, keeping the depths reached so far"
                );
                partial
            },
            Err(e) => return Err(e.into()),
        };
        if !result.is_complete() {
            incomplete += 1;
        }
        reporter
            .position(index, &result)
            .context("can not write the report")?;
        aggregator.record_position(result);
    }

    let profile = aggregator.compute_averages();
    for depth in profile.missing_depths() {
        let reason = BenchError::InsufficientData { depth };
        warn!(%reason, "average is not available");
    }
    reporter
        .averages(&profile)
        .context("can not write the report")?;

    let positions = aggregator.results().len();
    info!(positions, incomplete, "benchmark finished");
    Ok(Summary {
        positions,
        incomplete,
        profile,
    })
}
