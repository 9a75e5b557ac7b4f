//! Position trace
//!
//! Ordered record of the positions the firmware reported, tagged with the
//! pen estimate at the time of the report. Consecutive reports that barely
//! move are collapsed so the trace stays small on long programs and the
//! renderer is not asked to redraw identical points.

use crate::data::{PenState, Position};
use serde::{Deserialize, Serialize};

/// Minimum XY movement (mm) before a new point is recorded
pub const DEFAULT_TRACE_EPSILON: f64 = 0.1;

/// A single recorded point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TracePoint {
    /// Reported machine position
    pub position: Position,
    /// Pen estimate when the position was reported
    pub pen: PenState,
}

/// Append-only, de-duplicated list of observed positions
#[derive(Debug, Clone, PartialEq)]
pub struct PositionTrace {
    points: Vec<TracePoint>,
    epsilon: f64,
}

impl PositionTrace {
    /// Create an empty trace with the default 0.1 mm threshold
    pub fn new() -> Self {
        Self::with_epsilon(DEFAULT_TRACE_EPSILON)
    }

    /// Create an empty trace with a custom threshold
    pub fn with_epsilon(epsilon: f64) -> Self {
        Self {
            points: Vec::new(),
            epsilon,
        }
    }

    /// Record a reported position.
    ///
    /// The point is appended only if it is the first one or if X or Y moved
    /// more than the threshold since the last recorded point. Returns whether
    /// the point was appended.
    pub fn record(&mut self, position: Position, pen: PenState) -> bool {
        if let Some(last) = self.points.last() {
            let dx = (last.position.x - position.x).abs();
            let dy = (last.position.y - position.y).abs();
            if dx <= self.epsilon && dy <= self.epsilon {
                return false;
            }
        }

        self.points.push(TracePoint { position, pen });
        true
    }

    /// All recorded points, oldest first
    pub fn points(&self) -> &[TracePoint] {
        &self.points
    }

    /// Points recorded at or after `index`, for incremental rendering
    pub fn since(&self, index: usize) -> &[TracePoint] {
        self.points.get(index..).unwrap_or(&[])
    }

    /// Most recent point
    pub fn last(&self) -> Option<&TracePoint> {
        self.points.last()
    }

    /// Number of recorded points
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True if nothing was recorded yet
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Drop every point. Only an explicit user request ("clear view")
    /// resets the trace; new sessions keep appending.
    pub fn clear(&mut self) {
        self.points.clear();
    }
}

impl Default for PositionTrace {
    fn default() -> Self {
        Self::new()
    }
}
