//! Per-position depth profiles and their cross-position average.

use crate::error::BenchError;
use crate::uci::{Depth, DepthSample};

/// Depth samples collected for one position, ordered by depth.
///
/// Depths are contiguous and start at 1: a sample is only accepted if it
/// extends the profile by exactly one depth and does not go beyond the maximum
/// search depth.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PositionResult {
    max_depth: Depth,
    samples: Vec<DepthSample>,
}

/// Why [`PositionResult::push`] refused a sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejection {
    /// The depth does not follow the last recorded one.
    OutOfOrder {
        /// Depth the profile expected next.
        expected: Depth,
    },
    /// The depth exceeds the requested maximum.
    TooDeep,
}

impl PositionResult {
    /// Creates an empty profile for a search to `max_depth`.
    #[must_use]
    pub fn new(max_depth: Depth) -> Self {
        Self {
            max_depth,
            samples: Vec::with_capacity(max_depth as usize),
        }
    }

    /// Appends the next sample.
    ///
    /// # Errors
    ///
    /// Returns the reason if the sample would break depth contiguity.
    pub fn push(&mut self, sample: DepthSample) -> Result<(), Rejection> {
        if sample.depth > self.max_depth {
            return Err(Rejection::TooDeep);
        }
        let expected = self.next_depth();
        if sample.depth != expected {
            return Err(Rejection::OutOfOrder { expected });
        }
        self.samples.push(sample);
        Ok(())
    }

    /// Depth the next accepted sample must have.
    #[must_use]
    pub fn next_depth(&self) -> Depth {
        self.deepest() + 1
    }

    /// Deepest depth recorded so far, 0 if there are no samples.
    #[must_use]
    pub fn deepest(&self) -> Depth {
        self.samples.last().map_or(0, |sample| sample.depth)
    }

    /// Returns `true` if every depth up to the maximum was recorded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.deepest() == self.max_depth
    }

    /// Maximum depth the search was asked to reach.
    #[must_use]
    pub const fn max_depth(&self) -> Depth {
        self.max_depth
    }

    /// Number of recorded depths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` if the engine did not report a single depth.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Recorded samples, ordered by depth.
    #[must_use]
    pub fn samples(&self) -> &[DepthSample] {
        &self.samples
    }

    /// Sample for `depth`, if the engine reached it.
    #[must_use]
    pub fn at(&self, depth: Depth) -> Option<&DepthSample> {
        let index = usize::try_from(depth.checked_sub(1)?).ok()?;
        self.samples.get(index)
    }
}

/// Mean work spent at one depth.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DepthMean {
    /// Depth the mean was computed for.
    pub depth: Depth,
    /// Average nodes explored.
    pub nodes: f64,
    /// Average elapsed time in milliseconds.
    pub time_ms: f64,
    /// Number of positions that reached this depth.
    pub positions: usize,
}

/// Per-depth averages over all recorded positions.
#[derive(Clone, Debug, PartialEq)]
pub struct AggregateProfile {
    means: Vec<Option<DepthMean>>,
}

impl AggregateProfile {
    /// Maximum depth covered by the profile.
    #[must_use]
    pub fn max_depth(&self) -> Depth {
        Depth::try_from(self.means.len()).unwrap_or(Depth::MAX)
    }

    /// Average at `depth`.
    ///
    /// # Errors
    ///
    /// [`BenchError::InsufficientData`] if no position reached `depth`.
    pub fn mean(&self, depth: Depth) -> Result<&DepthMean, BenchError> {
        usize::try_from(depth)
            .ok()
            .and_then(|depth| depth.checked_sub(1))
            .and_then(|index| self.means.get(index))
            .and_then(Option::as_ref)
            .ok_or(BenchError::InsufficientData { depth })
    }

    /// Averages ordered by depth, with gaps for depths no position reached.
    pub fn means(&self) -> impl Iterator<Item = Option<&DepthMean>> + '_ {
        self.means.iter().map(Option::as_ref)
    }

    /// Depths without a single contributing position.
    pub fn missing_depths(&self) -> impl Iterator<Item = Depth> + '_ {
        (1..=self.max_depth()).filter(|&depth| self.mean(depth).is_err())
    }
}

/// Collects position results during a run and averages them at the end.
#[derive(Debug)]
pub struct Aggregator {
    max_depth: Depth,
    results: Vec<PositionResult>,
}

impl Aggregator {
    /// Creates an empty aggregator for searches to `max_depth`.
    #[must_use]
    pub const fn new(max_depth: Depth) -> Self {
        Self {
            max_depth,
            results: Vec::new(),
        }
    }

    /// Records the outcome of one position, complete or not.
    pub fn record_position(&mut self, result: PositionResult) {
        debug_assert_eq!(result.max_depth(), self.max_depth);
        self.results.push(result);
    }

    /// Results in the order they were recorded.
    #[must_use]
    pub fn results(&self) -> &[PositionResult] {
        &self.results
    }

    /// Averages nodes and time at every depth over the positions that
    /// reached it. Positions that stopped early do not count towards deeper
    /// depths.
    #[must_use]
    pub fn compute_averages(&self) -> AggregateProfile {
        let means = (1..=self.max_depth)
            .map(|depth| {
                let (nodes, time_ms, positions) = self
                    .results
                    .iter()
                    .filter_map(|result| result.at(depth))
                    .fold((0_u128, 0_u128, 0_usize), |(nodes, time, count), sample| {
                        (
                            nodes + u128::from(sample.nodes),
                            time + u128::from(sample.time_ms),
                            count + 1,
                        )
                    });
                (positions > 0).then(|| DepthMean {
                    depth,
                    nodes: mean(nodes, positions),
                    time_ms: mean(time_ms, positions),
                    positions,
                })
            })
            .collect();
        AggregateProfile { means }
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean(sum: u128, count: usize) -> f64 {
    debug_assert!(count > 0);
    sum as f64 / count as f64
}
