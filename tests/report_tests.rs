mod common;

use common::{ScriptedEngine, reference, settings, under_test};
use perft_hunt::hunt::{FailureReason, HuntReport, HuntStatus, Locator, run, run_with_observer};
use perft_hunt::position::Position;
use proptest::prelude::*;

const FEN_A: &str = "fen 8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1";
const FEN_B: &str = "fen 4k3/8/8/8/8/8/8/4K2R w K - 0 1";

fn batch() -> Vec<Position> {
    vec![
        Position::startpos(),
        FEN_A.parse().unwrap(),
        FEN_B.parse().unwrap(),
    ]
}

/// startpos agrees, FEN_A misses a move, FEN_B never answers the engine under test.
fn engines() -> (ScriptedEngine, ScriptedEngine) {
    let r = ScriptedEngine::new()
        .divide("startpos", 1, &[("e2e4", 1), ("d2d4", 1)])
        .divide(FEN_A, 1, &[("b4b1", 1), ("a5a4", 1)])
        .divide(FEN_B, 1, &[("e1g1", 1), ("h1h8", 1)]);
    let t = ScriptedEngine::new()
        .divide("startpos", 1, &[("e2e4", 1), ("d2d4", 1)])
        .divide(FEN_A, 1, &[("b4b1", 1)]);
    (r, t)
}

#[test]
fn run_reports_only_unresolved_positions_in_order() {
    let (r, t) = engines();
    let mut r = reference(r);
    let mut t = under_test(t);

    let report = run(&mut r, &mut t, &settings(), &batch(), 1);

    assert_eq!(report.checked, 3);
    assert_eq!(report.resolved, 1);
    assert_eq!(report.failures.len(), 2);
    assert!(report.aborted.is_none());
    assert!(!report.passed());

    assert_eq!(report.failures[0].start, FEN_A.parse::<Position>().unwrap());
    assert!(matches!(
        report.failures[0].reason,
        FailureReason::SetDisagreement { .. }
    ));
    assert!(matches!(
        report.failures[1].reason,
        FailureReason::ProtocolFault { .. }
    ));
    assert_eq!(report.counts_by_kind(), (1, 1, 0));
    assert_eq!(report.status(), HuntStatus::Failed);
}

#[test]
fn observer_sees_every_position() {
    let (r, t) = engines();
    let mut r = reference(r);
    let mut t = under_test(t);
    let mut seen = Vec::new();

    run_with_observer(&mut r, &mut t, &settings(), &batch(), 1, |idx, pos, outcome| {
        seen.push((idx, pos.to_string(), outcome.is_resolved()));
    });

    assert_eq!(
        seen,
        vec![
            (0, "startpos".to_string(), true),
            (1, FEN_A.to_string(), false),
            (2, FEN_B.to_string(), false),
        ]
    );
}

#[test]
fn unreachable_engine_aborts_but_keeps_earlier_results() {
    let r = ScriptedEngine::new()
        .divide(FEN_A, 1, &[("b4b1", 1), ("a5a4", 1)])
        .divide("startpos", 1, &[("e2e4", 1)]);
    let t = ScriptedEngine::new().dies(FEN_A, 1, &[("b4b1", 1)]);
    let mut r = reference(r);
    let mut t = under_test(t);
    let positions = vec![
        FEN_A.parse().unwrap(),
        Position::startpos(),
        Position::startpos(),
    ];

    let report = run(&mut r, &mut t, &settings(), &positions, 1);

    assert_eq!(report.checked, 1);
    assert_eq!(report.failures.len(), 1);
    assert!(matches!(
        report.failures[0].reason,
        FailureReason::ProtocolFault { .. }
    ));
    let aborted = report.aborted.as_deref().expect("batch should stop");
    assert!(aborted.starts_with("startpos"));
    assert_eq!(report.status(), HuntStatus::Aborted);
    assert!(!report.passed());
}

#[test]
fn aborted_batch_without_failures_is_still_aborted() {
    let report = HuntReport {
        checked: 2,
        resolved: 2,
        aborted: Some("startpos: under-test engine closed its input".into()),
        ..HuntReport::new(3)
    };
    assert_eq!(report.status(), HuntStatus::Aborted);
    assert_eq!(HuntReport::new(3).status(), HuntStatus::Passed);
}

#[test]
fn summary_lists_the_pinned_commands() {
    let (r, t) = engines();
    let mut r = reference(r);
    let mut t = under_test(t);

    let text = run(&mut r, &mut t, &settings(), &batch(), 1).to_string();

    assert!(text.starts_with("==== FINAL REPORT ===="));
    assert!(text.contains(&format!("position {FEN_A}\ngo perft 1\n")));
    assert!(text.contains("Moves MISSING: a5a4"));
    assert!(text.contains("no reply: under-test engine"));
}

#[test]
fn report_round_trips_through_json() {
    let (r, t) = engines();
    let mut r = reference(r);
    let mut t = under_test(t);
    let report = run(&mut r, &mut t, &settings(), &batch(), 1);

    let json = report.to_json().unwrap();
    let back: HuntReport = serde_json::from_str(&json).unwrap();
    assert_eq!(back, report);
}

proptest! {
    #[test]
    fn locate_is_idempotent(
        counts in prop::collection::vec((0u64..50, 0u64..50), 1..6),
    ) {
        let moves = ["a2a3", "b2b3", "c2c3", "d2d3", "e2e3", "f2f3"];
        let reference_pairs: Vec<(&str, u64)> =
            counts.iter().zip(moves).map(|((r, _), m)| (m, *r)).collect();
        let test_pairs: Vec<(&str, u64)> =
            counts.iter().zip(moves).map(|((_, t), m)| (m, *t)).collect();

        let locate_once = || {
            let mut r = reference(ScriptedEngine::new().divide("startpos", 2, &reference_pairs));
            let mut t = under_test(ScriptedEngine::new().divide("startpos", 2, &test_pairs));
            let settings = settings();
            Locator::new(&mut r, &mut t, &settings)
                .locate(&Position::startpos(), 2)
                .unwrap()
        };

        let first = locate_once();
        let second = locate_once();
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.is_resolved(), reference_pairs == test_pairs);
    }
}
