//! Fixed-width text table with the benchmark results.
//!
//! Every row starts with a label padded to [`LABEL_WIDTH`] followed by one
//! [`COLUMN_WIDTH`]-wide, right-aligned column per depth, so that the n-th
//! value of every row belongs to depth n. Values are printed with one decimal
//! place; rounding only happens here.

use std::io::{self, Write};

use itertools::Itertools;

use crate::aggregate::{AggregateProfile, DepthMean, PositionResult};
use crate::uci::Depth;

/// Width of the row labels.
pub const LABEL_WIDTH: usize = 27;
/// Width of each value column.
pub const COLUMN_WIDTH: usize = 11;
/// Printed instead of an average no position contributed to.
pub const MISSING: &str = "n/a";

/// Writes the table rows to `output` as results come in.
#[derive(Debug)]
pub struct Reporter<W: Write> {
    output: W,
}

impl<W: Write> Reporter<W> {
    /// Creates a reporter writing to `output`.
    pub const fn new(output: W) -> Self {
        Self { output }
    }

    /// Labels the columns with their depths.
    ///
    /// # Errors
    ///
    /// Propagates write errors.
    pub fn depths(&mut self, max_depth: Depth) -> io::Result<()> {
        self.row("depth:", (1..=max_depth).map(|depth| format!("{depth:>COLUMN_WIDTH$}")))
    }

    /// Writes the profile of the `index`-th position (starting from 1). Depths
    /// the engine did not reach are left out.
    ///
    /// # Errors
    ///
    /// Propagates write errors.
    #[allow(clippy::cast_precision_loss)]
    pub fn position(&mut self, index: usize, result: &PositionResult) -> io::Result<()> {
        writeln!(self.output, "position {index}:")?;
        self.row(
            "nodes explored:",
            result.samples().iter().map(|sample| value(sample.nodes as f64)),
        )?;
        self.row(
            "time used in ms:",
            result.samples().iter().map(|sample| value(sample.time_ms as f64)),
        )?;
        self.output.flush()
    }

    /// Writes the average nodes and time rows. Depths without data show
    /// [`MISSING`].
    ///
    /// # Errors
    ///
    /// Propagates write errors.
    pub fn averages(&mut self, profile: &AggregateProfile) -> io::Result<()> {
        self.row(
            "average nodes explored:",
            profile.means().map(|mean| average(mean, |mean| mean.nodes)),
        )?;
        self.row(
            "average time used (in ms):",
            profile.means().map(|mean| average(mean, |mean| mean.time_ms)),
        )?;
        self.output.flush()
    }

    /// Gives the output back, e.g. to inspect a buffer.
    pub fn into_inner(self) -> W {
        self.output
    }

    fn row(&mut self, label: &str, mut cells: impl Iterator<Item = String>) -> io::Result<()> {
        writeln!(
            self.output,
            "{label:<LABEL_WIDTH$}{}",
            cells.join("")
        )
    }
}

fn value(value: f64) -> String {
    format!("{value:>COLUMN_WIDTH$.1}")
}

fn average(mean: Option<&DepthMean>, metric: impl Fn(&DepthMean) -> f64) -> String {
    mean.map_or_else(
        || format!("{MISSING:>COLUMN_WIDTH$}"),
        |mean| value(metric(mean)),
    )
}
