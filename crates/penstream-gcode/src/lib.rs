//! # penstream G-code
//!
//! Turns raw G-code text into the command sequence the streaming engine
//! sends: comments are stripped, blank lines dropped and circular moves
//! (G2/G3) are replaced by short linear moves, since the target firmware has
//! no native arc support.

pub mod linearizer;
pub mod loader;
pub mod pen;
pub mod words;

pub use linearizer::{
    linearize_arc, sweep_angle, ArcLinearizer, ArcLinearizerConfig, ArcTarget, Point2,
    MAX_ARC_SEGMENTS, MIN_ARC_RADIUS,
};
pub use loader::{strip_comments, ProgramLoader};
pub use pen::estimate_pen;
pub use words::GcodeWords;
