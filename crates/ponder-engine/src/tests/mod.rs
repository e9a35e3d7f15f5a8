//! Crate-level tests and shared fixtures.

pub(crate) mod support;


use std::sync::Arc;

use rstest::rstest;

use self::support::{PATIENCE, Script, ScriptedFactory};
use crate::pool::WorkerPool;
use crate::{AnalysisEngine, AnalysisOptions, Evaluation, SearchBudget};

/// Starts an engine over `workers` scripted workers, bypassing the host cap.
pub(crate) fn scripted_engine(script: &Arc<Script>, workers: usize) -> AnalysisEngine {
    let factory = ScriptedFactory::new(script);
    let pool = WorkerPool::initialize_with_limit(&factory, workers, workers).expect("pool starts");
    AnalysisEngine::from_pool(pool)
}

#[rstest]
#[case(1)]
#[case(3)]
fn end_to_end_batch_keeps_input_order(#[case] workers: usize) {
    let script = Script::new();
    let engine = scripted_engine(&script, workers);
    let fens = ["a2a3", "b2b3", "c2c3", "d2d3", "e2e4"];

    engine.new_game();
    let outcomes = engine.analyze_positions(fens, AnalysisOptions::default());

    let moves: Vec<_> = outcomes
        .iter()
        .map(|outcome| outcome.as_ref().map(|analysis| analysis.bestmove().to_owned()))
        .collect();
    assert_eq!(
        moves,
        fens.iter().map(|fen| Some((*fen).to_owned())).collect::<Vec<_>>()
    );
    let first = outcomes.first().cloned().flatten().expect("first analysis");
    assert_eq!(first.evaluation(), Some(Evaluation::Centipawns(31)));
    assert_eq!(script.resets().len(), workers);
}

#[test]
fn ticket_wait_timeout_reports_pending_job() {
    let script = Script::new();
    let engine = scripted_engine(&script, 1);
    script.close_gate();

    let ticket = engine.analyze_fen("a2a3", AnalysisOptions::default());
    assert!(script.wait_for_searches(1));
    let pending = ticket.wait_timeout(std::time::Duration::from_millis(20));
    script.open_gate();

    assert!(pending.is_err());
    let analysis = ticket.wait_timeout(PATIENCE).expect("resolves").expect("analysis");
    assert_eq!(analysis.bestmove(), "a2a3");
}

#[test]
fn options_carry_budget_and_retries() {
    let script = Script::new();
    let engine = scripted_engine(&script, 1);
    script.fail_search("h2h3", 2);
    let options = AnalysisOptions::default()
        .with_budget(SearchBudget::Depth(8))
        .with_retries(3);

    let outcome = engine
        .analyze_fen("h2h3", options)
        .wait_timeout(PATIENCE)
        .expect("resolves");

    assert_eq!(outcome.map(|analysis| analysis.bestmove().to_owned()).as_deref(), Some("h2h3"));
    assert_eq!(script.searches().len(), 3);
}
