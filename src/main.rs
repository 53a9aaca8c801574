use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uci_bench::{BenchError, Config, Interrupt};

/// Conventional exit status of a process stopped by SIGINT.
const INTERRUPTED: u8 = 130;

fn main() -> ExitCode {
    // Logs go to stderr so that stdout only carries the table.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("uci_bench=info")),
        )
        .with_writer(io::stderr)
        .init();

    let config = Config::parse();
    info!(version = %uci_bench::version(), "uci-bench");
    if uci_bench::built_from_dirty_tree() {
        warn!("built with uncommitted changes");
    }

    let interrupt = Interrupt::new();
    let handler = {
        let interrupt = interrupt.clone();
        ctrlc::set_handler(move || interrupt.raise())
    };
    if let Err(e) = handler {
        warn!(reason = %e, "can not install the interrupt handler");
    }

    match uci_bench::run(&config, io::stdout().lock(), &interrupt) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            match e.downcast_ref::<BenchError>() {
                Some(BenchError::Interrupted) => ExitCode::from(INTERRUPTED),
                _ => ExitCode::FAILURE,
            }
        },
    }
}
