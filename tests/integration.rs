//! Runs the `uci-bench` binary against stub engines written in shell.
#![cfg(unix)]

use std::io::Write;

use assert_cmd::Command;
use predicates::boolean::PredicateBooleanExt;
use predicates::str::contains;
use tempfile::NamedTempFile;

const BINARY_NAME: &str = "uci-bench";

/// Searches every position to depth 3 with the same statistics.
const STUB_ENGINE: &str = r#"
    while read -r command rest; do
        case "$command" in
            uci) echo "id name stub"; echo "id author nobody"; echo "uciok" ;;
            isready) echo "readyok" ;;
            go)
                echo "info depth 1 seldepth 1 score cp 20 nodes 10 time 5 pv e2e4"
                echo "info depth 2 seldepth 2 score cp 15 nodes 40 time 12 pv e2e4 e7e5"
                echo "info depth 3 seldepth 4 score cp 25 nodes 160 time 50 nps 3200 pv e2e4 e7e5 g1f3"
                echo "bestmove e2e4 ponder e7e5"
                ;;
            quit) exit 0 ;;
        esac
    done
"#;

/// Stops after depth 2 without announcing the best move.
const CRASHING_ENGINE: &str = r#"
    while read -r command rest; do
        case "$command" in
            uci) echo "uciok" ;;
            isready) echo "readyok" ;;
            go)
                echo "info depth 1 nodes 10 time 5"
                echo "info depth 2 nodes 40 time 12"
                exit 3
                ;;
        esac
    done
"#;

const POSITIONS: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1\n\
                         r3k3/5p2/2p5/p7/P3r3/2N2n2/1PP2P2/2K2B2 w q - 0 24\n";

fn positions_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temporary files should be available");
    file.write_all(contents.as_bytes())
        .expect("temporary files should be writable");
    file
}

fn bench(engine: &str, positions: &NamedTempFile) -> Command {
    let mut cmd = Command::cargo_bin(BINARY_NAME).expect("Binary should be built");
    drop(
        cmd.env_remove("RUST_LOG")
            .arg("--engine")
            .arg("sh")
            .arg("--engine-arg=-c")
            .arg(format!("--engine-arg={engine}"))
            .arg("--positions")
            .arg(positions.path())
            .arg("--max-depth")
            .arg("3"),
    );
    cmd
}

#[test]
fn identical_positions() {
    let positions = positions_file(POSITIONS);
    let position_rows = "\
nodes explored:                   10.0       40.0      160.0
time used in ms:                   5.0       12.0       50.0
";
    let average_rows = "\
average nodes explored:           10.0       40.0      160.0
average time used (in ms):         5.0       12.0       50.0
";
    drop(
        bench(STUB_ENGINE, &positions)
            .assert()
            .success()
            .stdout(
                contains("depth:                               1          2          3\n")
                    .and(contains(format!("position 1:\n{position_rows}")))
                    .and(contains(format!("position 2:\n{position_rows}")))
                    .and(contains(average_rows))
                    .and(contains("position 3:").not()),
            ),
    );
}

#[test]
fn crashed_engine_degrades_rows() {
    let positions = positions_file(POSITIONS);
    drop(
        bench(CRASHING_ENGINE, &positions)
            .assert()
            .success()
            .stdout(
                contains("position 1:\nnodes explored:                   10.0       40.0\n")
                    .and(contains("position 2:"))
                    .and(contains(
                        "average nodes explored:           10.0       40.0        n/a\n",
                    )),
            )
            .stderr(contains("ended early")),
    );
}

#[test]
fn empty_position_list() {
    let positions = positions_file("");
    drop(
        bench(STUB_ENGINE, &positions)
            .assert()
            .success()
            .stdout(
                contains("average nodes explored:            n/a        n/a        n/a\n")
                    .and(contains("position").not())
                    .and(contains("NaN").not()),
            )
            .stderr(contains("no position reached depth 1")),
    );
}

#[test]
fn missing_position_list() {
    let mut cmd = Command::cargo_bin(BINARY_NAME).expect("Binary should be built");
    drop(
        cmd.args(["--engine", "sh", "--positions", "/definitely/not/here/positions"])
            .assert()
            .failure()
            .stderr(contains("can not read positions from /definitely/not/here/positions")),
    );
}

#[test]
fn missing_engine() {
    let positions = positions_file(POSITIONS);
    let mut cmd = Command::cargo_bin(BINARY_NAME).expect("Binary should be built");
    drop(
        cmd.arg("--engine")
            .arg("/definitely/not/an/engine")
            .arg("--positions")
            .arg(positions.path())
            .assert()
            .failure()
            .stdout(contains("position 1:").not())
            .stderr(contains("failed to launch engine /definitely/not/an/engine")),
    );
}

#[test]
fn engine_is_required() {
    let mut cmd = Command::cargo_bin(BINARY_NAME).expect("Binary should be built");
    drop(
        cmd.env_remove("UCI_BENCH_ENGINE")
            .assert()
            .failure()
            .stderr(contains("--engine")),
    );
}

#[test]
fn long_version_includes_build_info() {
    let mut cmd = Command::cargo_bin(BINARY_NAME).expect("Binary should be built");
    drop(
        cmd.arg("--version").assert().success().stdout(
            contains(env!("CARGO_PKG_VERSION"))
                .and(contains("branch:"))
                .and(contains("commit_hash:")),
        ),
    );
}
