//! Benchmarking harness for [UCI] chess engines.
//!
//! The harness runs an engine through a list of positions, searching each one
//! to a fixed depth in a fresh engine process, and collects the nodes and time
//! the engine reports for every depth. The per-position profiles and their
//! average are printed as a fixed-width table:
//!
//! - [`positions`] reads the position list.
//! - [`uci`] speaks the protocol and parses engine output.
//! - [`session`] owns the engine process of a single position.
//! - [`aggregate`] accumulates profiles and averages them.
//! - [`report`] prints the table.
//! - [`runner`] ties everything together.
//!
//! [UCI]: https://www.chessprogramming.org/UCI

// Rustdoc lints.
#![warn(
    rustdoc::missing_crate_level_docs,
    rustdoc::broken_intra_doc_links,
    rustdoc::invalid_codeblock_attributes,
    rustdoc::invalid_html_tags,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::bare_urls
)]

pub mod aggregate;
pub mod config;
pub mod error;
pub mod positions;
pub mod report;
pub mod runner;
pub mod session;
pub mod uci;

pub use config::Config;
pub use error::BenchError;
pub use runner::{run, Summary};
pub use session::Interrupt;
use shadow_rs::shadow;

shadow!(build);

/// Returns the full harness version that can be used to identify how it was
/// built in the first place.
#[must_use]
pub fn version() -> String {
    format!(
        "{} (commit {}, branch {})",
        build::PKG_VERSION,
        build::SHORT_COMMIT,
        build::BRANCH
    )
}

/// Returns `true` if the binary was built from a tree with uncommitted
/// changes, which makes benchmark numbers hard to reproduce.
#[must_use]
pub fn built_from_dirty_tree() -> bool {
    !shadow_rs::git_clean()
}
