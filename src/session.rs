//! Lifecycle of a single engine process.
//!
//! Every position gets a fresh engine: [`EngineSession::start`] launches it,
//! [`EngineSession::search`] performs the handshake and runs one fixed-depth
//! search, and [`EngineSession::terminate`] (also called on drop) asks the
//! engine to quit and kills it if it does not. No state survives between
//! positions.
//!
//! Engine output is drained by a reader thread and handed over a channel, so
//! that every wait can be bounded by a deadline and interrupted by the
//! operator.

use std::io::{self, BufRead, BufReader, Write};
use std::process::{self, Child, ChildStdin, ChildStdout, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::aggregate::PositionResult;
use crate::config::Config;
use crate::error::BenchError;
use crate::positions::Position;
use crate::uci::{Command, Event, Parser};

/// How often blocked waits check for an interrupt.
const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Time the engine gets to exit after `quit` before it is killed.
const QUIT_GRACE_PERIOD: Duration = Duration::from_millis(500);

/// Shared flag the operator's interrupt handler raises to stop the run.
#[derive(Clone, Debug, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    /// Creates a flag that is not raised.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks every session holding this flag to stop.
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once [`Interrupt::raise`] was called.
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of waiting for the next line of engine output.
enum Wait {
    Line(String),
    Closed,
    TimedOut,
}

/// A running engine process and its standard streams.
#[derive(Debug)]
pub struct EngineSession {
    config: Config,
    child: Child,
    stdin: Option<ChildStdin>,
    lines: Receiver<io::Result<String>>,
    reader: Option<JoinHandle<()>>,
    parser: Parser,
    interrupt: Interrupt,
    terminated: bool,
}

impl EngineSession {
    /// Launches the engine with piped standard input and output.
    ///
    /// # Errors
    ///
    /// [`BenchError::SpawnFailed`] if the process can not be started.
    pub fn start(config: &Config, interrupt: Interrupt) -> Result<Self, BenchError> {
        let spawn_failed = |source| BenchError::SpawnFailed {
            engine: config.engine.clone(),
            source,
        };
        let mut child = process::Command::new(&config.engine)
            .args(&config.engine_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(spawn_failed)?;
        debug!(pid = child.id(), engine = %config.engine.display(), "engine started");

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let (sender, lines) = mpsc::channel();
        let mut session = Self {
            config: config.clone(),
            child,
            stdin,
            lines,
            reader: None,
            parser: Parser::new(),
            interrupt,
            terminated: false,
        };

        // Dropping `session` on any of the errors below kills the engine.
        let stdout = stdout.ok_or_else(|| spawn_failed(io::Error::other("stdout is not piped")))?;
        session.reader = Some(
            thread::Builder::new()
                .name("engine-stdout".to_string())
                .spawn(move || forward_lines(stdout, &sender))
                .map_err(spawn_failed)?,
        );
        if session.stdin.is_none() {
            session.terminate();
            return Err(spawn_failed(io::Error::other("stdin is not piped")));
        }
        Ok(session)
    }

    /// Synchronizes with the engine, sets up `position` and searches it to the
    /// configured depth, collecting a sample for every reported depth.
    ///
    /// Depth reports that lack a field are logged and skipped. Reports that do
    /// not extend the profile by exactly one depth are dropped.
    ///
    /// # Errors
    ///
    /// - [`BenchError::SessionTerminatedEarly`] with the samples collected so
    ///   far if the engine stops talking before `bestmove` or the search
    ///   timeout expires.
    /// - [`BenchError::Interrupted`] if the operator interrupted the run.
    pub fn search(&mut self, position: &Position) -> Result<PositionResult, BenchError> {
        let max_depth = self.config.max_depth;
        let mut result = PositionResult::new(max_depth);

        self.handshake()?;

        let sent = self
            .send(&Command::Position {
                fen: position.as_str(),
            })
            .and_then(|()| self.send(&Command::Go { depth: max_depth }));
        if let Err(e) = sent {
            return Err(terminated_early(
                result,
                format!("can not send the search request: {e}"),
            ));
        }
        self.parser.start_search();

        let timeout = self.config.search_timeout();
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        loop {
            let line = match self.next_line(deadline)? {
                Wait::Line(line) => line,
                Wait::Closed => {
                    return Err(terminated_early(
                        result,
                        "engine output ended before `bestmove`",
                    ))
                },
                Wait::TimedOut => {
                    let seconds = timeout.map_or(0, |timeout| timeout.as_secs());
                    return Err(terminated_early(
                        result,
                        format!("search did not finish within {seconds}s"),
                    ));
                },
            };
            match self.parser.feed(&line) {
                Event::Report(sample) => {
                    trace!(
                        depth = sample.depth,
                        nodes = sample.nodes,
                        time_ms = sample.time_ms,
                        "depth report"
                    );
                    if let Err(rejection) = result.push(sample) {
                        warn!(depth = sample.depth, ?rejection, "dropping depth report");
                    }
                },
                Event::Malformed(e) => {
                    warn!(depth = result.next_depth(), reason = %e, "skipping depth report");
                },
                Event::Completed => {
                    if !result.is_complete() {
                        warn!(
                            reached = result.deepest(),
                            max_depth, "search finished before reaching the maximum depth"
                        );
                    }
                    return Ok(result);
                },
                Event::Identified | Event::Ready | Event::Ignored => {},
            }
        }
    }

    /// Sends `uci`, the configured options and `isready`, and waits for the
    /// engine to acknowledge them. Running out of time is not an error: the
    /// search request is sent anyway, as most engines queue their input.
    fn handshake(&mut self) -> Result<(), BenchError> {
        let deadline = Instant::now() + self.config.ready_timeout();

        self.send_or_terminate(&Command::Uci)?;
        if !self.wait_for(|event| matches!(event, Event::Identified), deadline)? {
            warn!("engine did not answer `uci` with `uciok` in time");
        }

        let options = self.config.options.clone();
        for option in &options {
            self.send_or_terminate(&Command::SetOption {
                name: &option.name,
                value: &option.value,
            })?;
        }

        self.send_or_terminate(&Command::IsReady)?;
        if !self.wait_for(|event| matches!(event, Event::Ready), deadline)? {
            warn!("engine did not answer `isready` with `readyok` in time");
        }
        Ok(())
    }

    /// Reads handshake output until `expected` is seen (`true`) or the
    /// deadline passes (`false`).
    fn wait_for(
        &mut self,
        expected: impl Fn(&Event) -> bool,
        deadline: Instant,
    ) -> Result<bool, BenchError> {
        loop {
            match self.next_line(Some(deadline))? {
                Wait::Line(line) => {
                    if expected(&self.parser.feed(&line)) {
                        return Ok(true);
                    }
                },
                Wait::TimedOut => return Ok(false),
                Wait::Closed => {
                    return Err(terminated_early(
                        PositionResult::new(self.config.max_depth),
                        "engine output ended during the handshake",
                    ))
                },
            }
        }
    }

    /// Sends a handshake command. A failed write means the engine is gone.
    fn send_or_terminate(&mut self, command: &Command<'_>) -> Result<(), BenchError> {
        self.send(command).map_err(|e| {
            terminated_early(
                PositionResult::new(self.config.max_depth),
                format!("can not send `{command}`: {e}"),
            )
        })
    }

    /// Writes a single command and flushes it.
    fn send(&mut self, command: &Command<'_>) -> io::Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::BrokenPipe))?;
        trace!(%command, "sending");
        stdin.write_all(format!("{command}\n").as_bytes())?;
        stdin.flush()
    }

    /// Blocks until the engine prints a line, closes its output or the
    /// deadline passes. Checks for an interrupt every [`POLL_INTERVAL`].
    fn next_line(&mut self, deadline: Option<Instant>) -> Result<Wait, BenchError> {
        loop {
            if self.interrupt.is_raised() {
                return Err(BenchError::Interrupted);
            }
            let wait = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(Wait::TimedOut);
                    }
                    (deadline - now).min(POLL_INTERVAL)
                },
                None => POLL_INTERVAL,
            };
            match self.lines.recv_timeout(wait) {
                Ok(Ok(line)) => return Ok(Wait::Line(line)),
                Ok(Err(e)) => warn!(reason = %e, "unreadable engine output"),
                Err(RecvTimeoutError::Timeout) => {},
                Err(RecvTimeoutError::Disconnected) => return Ok(Wait::Closed),
            }
        }
    }

    /// Asks the engine to quit and kills it if it is still running after a
    /// short grace period. Calling this more than once is a no-op.
    pub fn terminate(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;

        if let Err(e) = self.send(&Command::Quit) {
            debug!(reason = %e, "engine did not accept `quit`");
        }
        // Closing stdin signals EOF to engines that ignore `quit`.
        drop(self.stdin.take());

        self.reap();
        if !self.join_reader() {
            warn!("engine output is still open after the engine exited, leaving its reader behind");
        }
    }

    /// Waits for the engine to exit after `quit`, then kills and reaps it.
    fn reap(&mut self) {
        let deadline = Instant::now() + QUIT_GRACE_PERIOD;
        while Instant::now() < deadline {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    debug!(%status, "engine exited");
                    return;
                },
                Ok(None) => thread::sleep(Duration::from_millis(10)),
                Err(e) => {
                    debug!(reason = %e, "can not poll engine status");
                    break;
                },
            }
        }

        if let Err(e) = self.child.kill() {
            debug!(reason = %e, "can not kill engine");
        }
        match self.child.wait() {
            Ok(status) => debug!(%status, "engine killed"),
            Err(e) => warn!(reason = %e, pid = self.child.id(), "can not reap engine process"),
        }
    }

    /// Joins the reader thread once the engine's stdout is closed. Returns
    /// `false` if it stays open for longer than the grace period, e.g. because
    /// a process the engine spawned inherited it. The thread is then detached
    /// and exits on its next line, since nobody receives them anymore.
    fn join_reader(&mut self) -> bool {
        let Some(reader) = self.reader.take() else {
            return true;
        };
        let deadline = Instant::now() + QUIT_GRACE_PERIOD;
        while !reader.is_finished() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
        if reader.join().is_err() {
            warn!("engine output reader panicked");
        }
        true
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Runs one position through a fresh engine process. The process is
/// terminated before returning, whatever the outcome.
///
/// # Errors
///
/// See [`EngineSession::start`] and [`EngineSession::search`].
pub fn benchmark(
    config: &Config,
    position: &Position,
    interrupt: &Interrupt,
) -> Result<PositionResult, BenchError> {
    let mut session = EngineSession::start(config, interrupt.clone())?;
    let result = session.search(position);
    session.terminate();
    result
}

fn terminated_early(partial: PositionResult, reason: impl Into<String>) -> BenchError {
    BenchError::SessionTerminatedEarly {
        partial,
        reason: reason.into(),
    }
}

/// Sends every line of engine output to the session until the engine closes
/// it or the session is gone.
fn forward_lines(stdout: ChildStdout, sender: &Sender<io::Result<String>>) {
    for line in BufReader::new(stdout).lines() {
        let fatal = line
            .as_ref()
            .is_err_and(|e| e.kind() != io::ErrorKind::InvalidData);
        if sender.send(line).is_err() || fatal {
            break;
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::path::PathBuf;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::uci::DepthSample;

    const FULL_SEARCH: &str = r#"
        while read -r command rest; do
            case "$command" in
                uci) echo "id name stub"; echo "uciok" ;;
                isready) echo "readyok" ;;
                go)
                    echo "info depth 1 nodes 10 time 5"
                    echo "info depth 2 nodes 40 time 12"
                    echo "info depth 3 nodes 160 time 50"
                    echo "bestmove e2e4"
                    ;;
                quit) exit 0 ;;
            esac
        done
    "#;

    fn stub(script: &str) -> Config {
        let mut config = Config::new("sh", "unused");
        config.engine_args = vec!["-c".to_string(), script.to_string()];
        config.max_depth = 3;
        config.ready_timeout = 5;
        config
    }

    fn position() -> Position {
        Position::new("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1")
    }

    fn metrics(result: &PositionResult) -> Vec<(u32, u64, u64)> {
        result
            .samples()
            .iter()
            .map(|s| (s.depth, s.nodes, s.time_ms))
            .collect()
    }

    #[test]
    fn complete_search() {
        let result = benchmark(&stub(FULL_SEARCH), &position(), &Interrupt::new()).unwrap();
        assert!(result.is_complete());
        assert_eq!(
            metrics(&result),
            vec![(1, 10, 5), (2, 40, 12), (3, 160, 50)]
        );
    }

    #[test]
    fn commands_reach_the_engine() {
        // Exits unless the option, position and search request arrive
        // verbatim.
        let script = r#"
            while read -r command rest; do
                case "$command" in
                    uci) echo "uciok" ;;
                    setoption) [ "$rest" = "name Hash value 16" ] || exit 1 ;;
                    isready) echo "readyok" ;;
                    position)
                        [ "$rest" = "fen 8/8/8/8/8/8/8/K1k5 w - - 0 1" ] || exit 1
                        ;;
                    go)
                        [ "$rest" = "depth 1" ] || exit 1
                        echo "info depth 1 nodes 1 time 0"
                        echo "bestmove a1a2"
                        ;;
                    quit) exit 0 ;;
                esac
            done
        "#;
        let mut config = stub(script);
        config.max_depth = 1;
        config.options = vec!["Hash=16".parse().unwrap()];
        let result = benchmark(
            &config,
            &Position::new("8/8/8/8/8/8/8/K1k5 w - - 0 1"),
            &Interrupt::new(),
        )
        .unwrap();
        assert_eq!(metrics(&result), vec![(1, 1, 0)]);
    }

    #[test]
    fn malformed_reports_are_skipped() {
        let script = r#"
            while read -r command rest; do
                case "$command" in
                    uci) echo "uciok" ;;
                    isready) echo "readyok" ;;
                    go)
                        echo "info depth 1 currmove e2e4 currmovenumber 1"
                        echo "info depth 1 nodes 10 time 5"
                        echo "info depth 2 nodes 40"
                        echo "info string thinking hard"
                        echo "info depth 2 nodes 40 time 12"
                        echo "info depth 2 nodes 41 time 13"
                        echo "info depth 3 nodes 160 time 50"
                        echo "bestmove e2e4"
                        ;;
                    quit) exit 0 ;;
                esac
            done
        "#;
        let result = benchmark(&stub(script), &position(), &Interrupt::new()).unwrap();
        assert_eq!(
            metrics(&result),
            vec![(1, 10, 5), (2, 40, 12), (3, 160, 50)]
        );
    }

    #[test]
    fn early_exit() {
        let script = r#"
            while read -r command rest; do
                case "$command" in
                    uci) echo "uciok" ;;
                    isready) echo "readyok" ;;
                    go)
                        echo "info depth 1 nodes 10 time 5"
                        echo "info depth 2 nodes 40 time 12"
                        exit 0
                        ;;
                esac
            done
        "#;
        match benchmark(&stub(script), &position(), &Interrupt::new()) {
            Err(BenchError::SessionTerminatedEarly { partial, .. }) => {
                assert_eq!(partial.len(), 2);
                assert_eq!(partial.at(3), None);
                assert_eq!(
                    partial.at(2),
                    Some(&DepthSample {
                        depth: 2,
                        nodes: 40,
                        time_ms: 12
                    })
                );
            },
            other => panic!("expected early termination, got {other:?}"),
        }
    }

    #[test]
    fn exit_during_handshake() {
        match benchmark(&stub("exit 0"), &position(), &Interrupt::new()) {
            Err(BenchError::SessionTerminatedEarly { partial, .. }) => assert!(partial.is_empty()),
            other => panic!("expected early termination, got {other:?}"),
        }
    }

    #[test]
    fn unresponsive_handshake() {
        // Never acknowledges `uci` or `isready` but searches anyway.
        let script = r#"
            while read -r command rest; do
                case "$command" in
                    go) echo "info depth 1 nodes 7 time 1"; echo "bestmove e2e4" ;;
                    quit) exit 0 ;;
                esac
            done
        "#;
        let mut config = stub(script);
        config.max_depth = 1;
        config.ready_timeout = 1;
        let result = benchmark(&config, &position(), &Interrupt::new()).unwrap();
        assert_eq!(metrics(&result), vec![(1, 7, 1)]);
    }

    #[test]
    fn search_timeout() {
        let script = r#"
            while read -r command rest; do
                case "$command" in
                    uci) echo "uciok" ;;
                    isready) echo "readyok" ;;
                    go) echo "info depth 1 nodes 10 time 5" ;;
                esac
            done
        "#;
        let mut config = stub(script);
        config.search_timeout = Some(1);
        let started = Instant::now();
        match benchmark(&config, &position(), &Interrupt::new()) {
            Err(BenchError::SessionTerminatedEarly { partial, reason }) => {
                assert_eq!(partial.len(), 1);
                assert!(reason.contains("1s"), "{reason}");
            },
            other => panic!("expected early termination, got {other:?}"),
        }
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn interrupted_search() {
        let script = r#"
            while read -r command rest; do
                case "$command" in
                    uci) echo "uciok" ;;
                    isready) echo "readyok" ;;
                esac
            done
        "#;
        let interrupt = Interrupt::new();
        let mut session = EngineSession::start(&stub(script), interrupt.clone()).unwrap();
        let raiser = {
            let interrupt = interrupt.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(200));
                interrupt.raise();
            })
        };
        assert!(matches!(
            session.search(&position()),
            Err(BenchError::Interrupted)
        ));
        raiser.join().unwrap();
        session.terminate();
        assert!(session.child.try_wait().unwrap().is_some());
    }

    #[test]
    fn stubborn_engine_is_killed() {
        // Ignores both `quit` and the closed input.
        let script = r#"
            trap '' TERM
            while true; do sleep 1; done
        "#;
        let mut session = EngineSession::start(&stub(script), Interrupt::new()).unwrap();
        session.terminate();
        assert!(session.child.try_wait().unwrap().is_some());
    }

    #[test]
    fn reader_is_joined() {
        let mut session = EngineSession::start(&stub(FULL_SEARCH), Interrupt::new()).unwrap();
        let _ = session.search(&position()).unwrap();
        session.reap();
        assert!(session.join_reader());
        assert!(session.reader.is_none());
    }

    #[test]
    fn reader_is_detached_when_output_stays_open() {
        // The background `sleep` inherits stdout and outlives the engine.
        let script = format!("sleep 3 &\n{FULL_SEARCH}");
        let mut session = EngineSession::start(&stub(&script), Interrupt::new()).unwrap();
        let _ = session.search(&position()).unwrap();
        session.reap();

        let started = Instant::now();
        assert!(!session.join_reader());
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(session.reader.is_none());
        // Nothing left to wait for.
        session.terminate();
    }

    #[test]
    fn missing_engine() {
        let config = Config::new(PathBuf::from("/definitely/not/an/engine"), "unused");
        assert!(matches!(
            EngineSession::start(&config, Interrupt::new()),
            Err(BenchError::SpawnFailed { .. })
        ));
    }
}
