//! Unit tests for analysis options and the engine facade.

use ponder_config::Config;
use rstest::rstest;

use super::*;
use crate::tests::scripted_engine;
use crate::tests::support::Script;

#[test]
fn default_options_use_movetime_and_two_attempts() {
    let options = AnalysisOptions::default();

    assert_eq!(options.budget, SearchBudget::MoveTime(2_000));
    assert_eq!(options.retries, 2);
}

#[rstest]
#[case::movetime(None, SearchBudget::MoveTime(750))]
#[case::depth_wins(Some(14), SearchBudget::Depth(14))]
fn options_follow_configuration(#[case] depth: Option<u32>, #[case] expected: SearchBudget) {
    let config = Config {
        movetime_ms: 750,
        depth,
        retries: 4,
        ..Config::default()
    };

    let options = AnalysisOptions::from_config(&config);

    assert_eq!(options, AnalysisOptions { budget: expected, retries: 4 });
}

#[test]
fn engine_reports_size_and_status() {
    let script = Script::new();
    let engine = scripted_engine(&script, 2);

    assert_eq!(engine.size(), 2);
    assert_eq!(engine.status().idle, 2);
    assert_eq!(engine.default_options(), AnalysisOptions::default());

    engine.terminate();

    assert_eq!(engine.size(), 0);
    assert!(script.is_terminated(0) && script.is_terminated(1));
}

#[test]
fn batch_after_termination_yields_nothing() {
    let script = Script::new();
    let engine = scripted_engine(&script, 1);
    engine.terminate();

    let outcomes = engine.analyze_positions(["a2a3", "b2b3"], AnalysisOptions::default());

    assert_eq!(outcomes, vec![None, None]);
    assert!(script.searches().is_empty());
}

#[test]
fn missing_engine_binary_fails_construction() {
    let config = Config {
        engine_path: "/nonexistent/ponder-engine-binary".into(),
        workers: 1,
        ..Config::default()
    };

    let error = AnalysisEngine::from_config(&config).err().expect("construction error");

    assert!(matches!(error, EngineError::BinaryNotFound { .. }));
}
