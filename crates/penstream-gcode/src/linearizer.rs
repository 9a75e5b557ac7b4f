//! Arc linearizer
//!
//! Converts G2/G3 arc commands (center-offset form) to linear segments for
//! firmware without arc support. Segment density follows the physical arc
//! length, not the swept angle: `resolution` is the chord length in
//! millimeters, so a tight arc gets few segments and a wide one many.

use penstream_core::Command;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Arcs with a smaller radius are dropped instead of emitting zero-length moves
pub const MIN_ARC_RADIUS: f64 = 1e-3;

/// Upper bound on the segments emitted for one arc
pub const MAX_ARC_SEGMENTS: usize = 100_000;

/// Point in the XY plane
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance_to(&self, other: &Point2) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Target words of an arc command
///
/// Missing X/Y default to the start point, which makes the arc a full circle.
/// I and J are always offsets from the start point to the center.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ArcTarget {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub i: f64,
    pub j: f64,
}

/// Arc linearization configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArcLinearizerConfig {
    /// Maximum chord length per segment (mm)
    pub resolution: f64,
}

impl Default for ArcLinearizerConfig {
    fn default() -> Self {
        Self { resolution: 0.5 }
    }
}

/// Signed sweep from `start_angle` to `end_angle` in the requested direction.
///
/// Clockwise sweeps are always negative and counter-clockwise sweeps always
/// positive; coinciding angles are a full turn in the requested direction.
pub fn sweep_angle(start_angle: f64, end_angle: f64, clockwise: bool) -> f64 {
    let mut end = end_angle;
    if clockwise {
        if end >= start_angle {
            end -= 2.0 * PI;
        }
    } else if end <= start_angle {
        end += 2.0 * PI;
    }
    end - start_angle
}

/// Round to the 4 decimal places emitted on the wire
pub(crate) fn round4(value: f64) -> f64 {
    let rounded = (value * 10_000.0).round() / 10_000.0;
    // avoid emitting "-0.0000"
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Converts arc commands to line segments
#[derive(Debug, Clone, Default)]
pub struct ArcLinearizer {
    config: ArcLinearizerConfig,
}

impl ArcLinearizer {
    /// Create a new arc linearizer.
    ///
    /// A resolution that is not a positive finite number is replaced by the
    /// default.
    pub fn new(config: ArcLinearizerConfig) -> Self {
        if config.resolution > 0.0 && config.resolution.is_finite() {
            return Self { config };
        }

        let fallback = ArcLinearizerConfig::default();
        tracing::warn!(
            "Invalid arc resolution {}, using {} mm",
            config.resolution,
            fallback.resolution
        );
        Self { config: fallback }
    }

    /// Configured chord length
    pub fn resolution(&self) -> f64 {
        self.config.resolution
    }

    /// Segment end points of an arc, rounded to 4 decimals.
    ///
    /// The last returned point is where the tool actually ends up, and is the
    /// start point the caller must use for whatever follows. Returns an empty
    /// list for degenerate arcs (radius below [`MIN_ARC_RADIUS`]).
    pub fn arc_points(&self, start: Point2, target: ArcTarget, clockwise: bool) -> Vec<Point2> {
        let center = Point2::new(start.x + target.i, start.y + target.j);
        let radius = (target.i * target.i + target.j * target.j).sqrt();
        if radius < MIN_ARC_RADIUS {
            return Vec::new();
        }

        let end = Point2::new(target.x.unwrap_or(start.x), target.y.unwrap_or(start.y));

        let start_angle = (start.y - center.y).atan2(start.x - center.x);
        let end_angle = (end.y - center.y).atan2(end.x - center.x);
        let sweep = sweep_angle(start_angle, end_angle, clockwise);

        let arc_length = sweep.abs() * radius;
        let num_segments =
            ((arc_length / self.config.resolution).ceil() as usize).clamp(1, MAX_ARC_SEGMENTS);
        let step = sweep / num_segments as f64;

        (1..=num_segments)
            .map(|k| {
                let theta = start_angle + step * k as f64;
                Point2::new(
                    round4(center.x + radius * theta.cos()),
                    round4(center.y + radius * theta.sin()),
                )
            })
            .collect()
    }

    /// Linear commands approximating an arc, in absolute coordinates
    pub fn linearize(&self, start: Point2, target: ArcTarget, clockwise: bool) -> Vec<Command> {
        self.arc_points(start, target, clockwise)
            .into_iter()
            .map(|p| Command::new(format!("G1 X{:.4} Y{:.4}", p.x, p.y)))
            .collect()
    }
}

/// Generate the linear commands approximating one arc.
///
/// `resolution` is the maximum chord length in millimeters. Degenerate arcs
/// produce no commands.
pub fn linearize_arc(
    start: Point2,
    target: ArcTarget,
    clockwise: bool,
    resolution: f64,
) -> Vec<Command> {
    ArcLinearizer::new(ArcLinearizerConfig { resolution }).linearize(start, target, clockwise)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweep_full_circle() {
        assert_eq!(sweep_angle(0.0, 0.0, true), -2.0 * PI);
        assert_eq!(sweep_angle(0.0, 0.0, false), 2.0 * PI);
    }

    #[test]
    fn test_sweep_keeps_direction() {
        // quarter turn counter-clockwise requested as clockwise goes the long way
        let cw = sweep_angle(0.0, PI / 2.0, true);
        assert!((cw + 1.5 * PI).abs() < 1e-12);
        let ccw = sweep_angle(0.0, PI / 2.0, false);
        assert!((ccw - 0.5 * PI).abs() < 1e-12);
    }

    #[test]
    fn test_round4() {
        assert_eq!(round4(1.23456), 1.2346);
        assert_eq!(round4(-0.00001), 0.0);
        assert!(round4(-0.00001).is_sign_positive());
    }

    #[test]
    fn test_degenerate_arc_is_empty() {
        let target = ArcTarget {
            x: Some(1.0),
            y: Some(0.0),
            i: 0.0005,
            j: 0.0,
        };
        assert!(linearize_arc(Point2::new(0.0, 0.0), target, true, 0.5).is_empty());
    }

    #[test]
    fn test_invalid_resolution_uses_default() {
        let target = ArcTarget {
            x: Some(-10.0),
            y: Some(0.0),
            i: -10.0,
            j: 0.0,
        };
        for resolution in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let linearizer = ArcLinearizer::new(ArcLinearizerConfig { resolution });
            assert_eq!(linearizer.resolution(), 0.5);
            let cmds = linearize_arc(Point2::new(10.0, 0.0), target, true, resolution);
            assert_eq!(cmds.len(), 63);
        }
    }

    #[test]
    fn test_segment_count_is_bounded() {
        let target = ArcTarget {
            x: None,
            y: None,
            i: 1.0e9,
            j: 0.0,
        };
        let points = ArcLinearizer::new(ArcLinearizerConfig { resolution: 0.5 }).arc_points(
            Point2::new(0.0, 0.0),
            target,
            false,
        );
        assert_eq!(points.len(), MAX_ARC_SEGMENTS);
    }

    #[test]
    fn test_command_format() {
        let target = ArcTarget {
            x: Some(0.0),
            y: Some(1.0),
            i: -1.0,
            j: 0.0,
        };
        let cmds = linearize_arc(Point2::new(1.0, 0.0), target, false, 10.0);
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].as_str(), "G1 X0.0000 Y1.0000");
    }
}
