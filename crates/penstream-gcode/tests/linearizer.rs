//! Arc linearizer behaviour against known geometry

use penstream_gcode::{linearize_arc, ArcLinearizer, ArcLinearizerConfig, ArcTarget, Point2};
use proptest::prelude::*;

fn parse_xy(cmd: &str) -> (f64, f64) {
    let mut x = f64::NAN;
    let mut y = f64::NAN;
    for word in cmd.split_whitespace() {
        if let Some(v) = word.strip_prefix('X') {
            x = v.parse().unwrap();
        } else if let Some(v) = word.strip_prefix('Y') {
            y = v.parse().unwrap();
        }
    }
    (x, y)
}

#[test]
fn test_half_circle_clockwise() {
    let target = ArcTarget {
        x: Some(-10.0),
        y: Some(0.0),
        i: -10.0,
        j: 0.0,
    };
    let cmds = linearize_arc(Point2::new(10.0, 0.0), target, true, 0.5);

    // pi * 10 / 0.5 = 62.8 -> 63 chords
    assert_eq!(cmds.len(), 63);
    assert!(cmds.iter().all(|c| c.as_str().starts_with("G1 X")));

    let (x, y) = parse_xy(cmds.last().unwrap().as_str());
    assert!((x + 10.0).abs() < 1e-3);
    assert!(y.abs() < 1e-3);

    // clockwise from (10, 0) around the origin passes through negative Y
    let (_, mid_y) = parse_xy(cmds[31].as_str());
    assert!(mid_y < -9.0);
}

#[test]
fn test_off_circle_target_sweeps_full_turn() {
    // center (20, 0) puts the start and target on the same ray from the center
    let target = ArcTarget {
        x: Some(0.0),
        y: Some(0.0),
        i: 10.0,
        j: 0.0,
    };
    let cmds = linearize_arc(Point2::new(10.0, 0.0), target, true, 0.5);

    assert_eq!(cmds.len(), 126);
    let (x, y) = parse_xy(cmds.last().unwrap().as_str());
    assert!((x - 10.0).abs() < 1e-3);
    assert!(y.abs() < 1e-3);
}

#[test]
fn test_missing_target_is_full_circle() {
    let target = ArcTarget {
        x: None,
        y: None,
        i: 0.0,
        j: 5.0,
    };
    let linearizer = ArcLinearizer::new(ArcLinearizerConfig { resolution: 1.0 });
    let points = linearizer.arc_points(Point2::new(0.0, 0.0), target, false);

    // 2 * pi * 5 = 31.4 -> 32 chords, ending back at the start
    assert_eq!(points.len(), 32);
    let last = points.last().unwrap();
    assert!(last.distance_to(&Point2::new(0.0, 0.0)) < 1e-3);
}

#[test]
fn test_tight_arc_still_emits_one_segment() {
    let target = ArcTarget {
        x: Some(0.0),
        y: Some(0.02),
        i: 0.0,
        j: 0.01,
    };
    let cmds = linearize_arc(Point2::new(0.0, 0.0), target, false, 0.5);
    assert_eq!(cmds.len(), 1);
}

proptest! {
    #[test]
    fn prop_arc_ends_on_target(
        sx in -100.0f64..100.0,
        sy in -100.0f64..100.0,
        radius in 0.1f64..50.0,
        start_angle in 0.0f64..std::f64::consts::TAU,
        end_angle in 0.0f64..std::f64::consts::TAU,
        resolution in 0.1f64..5.0,
        clockwise in any::<bool>(),
    ) {
        let start = Point2::new(sx, sy);
        let center = Point2::new(
            sx - radius * start_angle.cos(),
            sy - radius * start_angle.sin(),
        );
        let end = Point2::new(
            center.x + radius * end_angle.cos(),
            center.y + radius * end_angle.sin(),
        );
        let target = ArcTarget {
            x: Some(end.x),
            y: Some(end.y),
            i: center.x - sx,
            j: center.y - sy,
        };

        let linearizer = ArcLinearizer::new(ArcLinearizerConfig { resolution });
        let points = linearizer.arc_points(start, target, clockwise);

        prop_assert!(!points.is_empty());
        let last = points.last().unwrap();
        prop_assert!(last.distance_to(&end) < 1e-3);

        // every chord fits the configured resolution, up to rounding
        let mut prev = start;
        for p in &points {
            prop_assert!(prev.distance_to(p) <= resolution + 1e-3);
            prev = *p;
        }
    }
}
