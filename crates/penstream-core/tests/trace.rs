use penstream_core::{PenState, Position, PositionTrace, DEFAULT_TRACE_EPSILON};
use proptest::prelude::*;

#[test]
fn test_trace_follows_a_square() {
    let mut trace = PositionTrace::new();
    let corners = [(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0), (0.0, 0.0)];

    for (x, y) in corners {
        // repeated reports while the machine sits on a corner
        for _ in 0..3 {
            trace.record(Position::new(x, y, -1.0), PenState::Down);
        }
    }

    assert_eq!(trace.len(), corners.len());
    let xs: Vec<f64> = trace.points().iter().map(|p| p.position.x).collect();
    assert_eq!(xs, vec![0.0, 10.0, 10.0, 0.0, 0.0]);
}

#[test]
fn test_threshold_is_exclusive() {
    let mut trace = PositionTrace::new();
    trace.record(Position::new(0.0, 0.0, 0.0), PenState::Up);
    assert!(!trace.record(Position::new(DEFAULT_TRACE_EPSILON, 0.0, 0.0), PenState::Up));
    assert!(trace.record(Position::new(0.0, 0.2, 0.0), PenState::Up));
}

#[test]
fn test_clear_then_record() {
    let mut trace = PositionTrace::new();
    trace.record(Position::new(1.0, 1.0, 0.0), PenState::Up);
    trace.clear();
    assert!(trace.is_empty());
    assert!(trace.record(Position::new(1.0, 1.0, 0.0), PenState::Up));
}

#[test]
fn test_custom_epsilon() {
    let mut trace = PositionTrace::with_epsilon(1.0);
    trace.record(Position::new(0.0, 0.0, 0.0), PenState::Up);
    assert!(!trace.record(Position::new(0.5, 0.5, 0.0), PenState::Up));
    assert!(trace.record(Position::new(1.5, 0.0, 0.0), PenState::Up));
}

proptest! {
    #[test]
    fn consecutive_points_are_apart(
        moves in prop::collection::vec((-50.0f64..50.0, -50.0f64..50.0), 1..200)
    ) {
        let mut trace = PositionTrace::new();
        for (x, y) in &moves {
            trace.record(Position::new(*x, *y, 0.0), PenState::Down);
        }

        prop_assert!(!trace.is_empty());
        for pair in trace.points().windows(2) {
            let dx = (pair[0].position.x - pair[1].position.x).abs();
            let dy = (pair[0].position.y - pair[1].position.y).abs();
            prop_assert!(dx > DEFAULT_TRACE_EPSILON || dy > DEFAULT_TRACE_EPSILON);
        }
    }
}
