//! Drives real child processes that speak the engine line protocol.
#![cfg(unix)]

use std::time::Duration;

use ponder_engine::{
    AnalysisEngine, AnalysisOptions, EngineCommand, EngineError, EngineWorker, Evaluation,
    Exchange, ProcessEngine, ProcessWorkerFactory, SearchBudget, TransportError, WorkerFactory,
    WorkerPool, parse_analysis,
};
use rstest::{fixture, rstest};

const START: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

const FAKE_ENGINE: &str = r#"
while read -r line; do
  case "$line" in
    uci) echo "id name fake"; echo uciok ;;
    isready) echo readyok ;;
    go*) echo "info depth 3 score cp 35 pv e2e4 e7e5"; echo "bestmove e2e4 ponder e7e5" ;;
    quit) exit 0 ;;
  esac
done
"#;

const CRASHING_ENGINE: &str = r#"
while read -r line; do
  case "$line" in
    isready) echo readyok ;;
    go*) exit 3 ;;
  esac
done
"#;

const SILENT_SEARCH_ENGINE: &str = r#"
while read -r line; do
  case "$line" in
    isready) echo readyok ;;
  esac
done
"#;

fn shell(script: &str) -> EngineCommand {
    EngineCommand::new("sh").with_args(["-c", script])
}

/// Worker 0 runs an engine that dies on its first search; the rest are healthy.
struct FirstEngineCrashes;

impl WorkerFactory for FirstEngineCrashes {
    fn spawn(&self, index: usize) -> Result<Box<dyn EngineWorker>, EngineError> {
        let script = if index == 0 { CRASHING_ENGINE } else { FAKE_ENGINE };
        let engine = ProcessEngine::spawn(index, &shell(script))?;
        Ok(Box::new(engine))
    }
}

#[fixture]
fn engine() -> ProcessEngine {
    ProcessEngine::spawn(0, &shell(FAKE_ENGINE)).expect("fake engine starts")
}

#[rstest]
fn handshake_ends_at_readyok(engine: ProcessEngine) {
    let lines = engine.run_exchange(&Exchange::handshake()).expect("handshake");

    assert_eq!(lines, vec!["id name fake", "uciok", "readyok"]);
}

#[rstest]
fn search_output_parses_into_analysis(engine: ProcessEngine) {
    let lines = engine
        .run_exchange(&Exchange::search(START, SearchBudget::MoveTime(10)))
        .expect("search");
    let analysis = parse_analysis(&lines).expect("analysis");

    assert_eq!(analysis.bestmove(), "e2e4");
    assert_eq!(analysis.principal_variation(), ["e2e4", "e7e5"]);
    assert_eq!(analysis.evaluation(), Some(Evaluation::Centipawns(35)));
}

#[test]
fn crash_mid_search_is_a_process_error() {
    let engine = ProcessEngine::spawn(0, &shell(CRASHING_ENGINE)).expect("engine starts");

    let error = engine
        .run_exchange(&Exchange::search(START, SearchBudget::Depth(1)))
        .expect_err("engine exits");

    assert!(matches!(error, EngineError::ProcessExited), "{error:?}");
    assert!(error.is_process_error());
}

#[test]
fn timed_out_search_leaves_worker_usable() {
    let command = shell(SILENT_SEARCH_ENGINE).with_exchange_timeout(Duration::from_millis(200));
    let engine = ProcessEngine::spawn(0, &command).expect("engine starts");

    let error = engine
        .run_exchange(&Exchange::search(START, SearchBudget::Depth(1)))
        .expect_err("search times out");
    let reset = engine.run_exchange(&Exchange::new_game());

    assert!(
        matches!(error, EngineError::Transport(TransportError::TimedOut { timeout_ms: 200 })),
        "{error:?}"
    );
    assert_eq!(reset.expect("reset after resync"), vec!["readyok"]);
}

#[rstest]
fn terminate_is_idempotent(engine: ProcessEngine) {
    engine.terminate();
    engine.terminate();

    let error = engine.run_exchange(&Exchange::handshake()).expect_err("terminated");

    assert!(matches!(error, EngineError::Terminated), "{error:?}");
}

#[test]
fn pool_of_processes_analyses_a_batch() {
    let factory = ProcessWorkerFactory::new(shell(FAKE_ENGINE));
    let engine = AnalysisEngine::create(&factory, 2).expect("engine starts");

    engine.new_game();
    let outcomes = engine.analyze_positions([START, START, START], AnalysisOptions::default());
    engine.terminate();

    assert_eq!(outcomes.len(), 3);
    for outcome in outcomes {
        assert_eq!(outcome.expect("analysis").bestmove(), "e2e4");
    }
}

#[test]
fn crashed_engine_leaves_the_pool_and_its_jobs_recover() {
    let pool = WorkerPool::initialize_with_limit(&FirstEngineCrashes, 2, 2).expect("pool starts");
    let engine = AnalysisEngine::from_pool(pool);

    let outcomes: Vec<_> = (0..3)
        .map(|_| engine.analyze_fen(START, AnalysisOptions::default()).wait())
        .collect();
    let size = engine.size();
    engine.terminate();

    for outcome in outcomes {
        assert_eq!(outcome.expect("resolves").expect("analysis").bestmove(), "e2e4");
    }
    assert_eq!(size, 1);
}

#[test]
fn engines_that_never_handshake_are_rejected() {
    let factory = ProcessWorkerFactory::new(shell("exit 0"));

    let error = AnalysisEngine::create(&factory, 2).err().expect("no usable workers");

    assert!(matches!(error, EngineError::NoUsableWorkers { .. }), "{error:?}");
}
