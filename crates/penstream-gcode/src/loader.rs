//! Program loader
//!
//! Cleans raw G-code into the ordered command list the engine streams.
//! Tracks just enough modal state to feed the arc linearizer a correct start
//! point: the tool position, the motion mode (G0/G1/G2/G3) and the distance
//! mode (G90/G91). Units (G20/G21) are not converted; the arc resolution is
//! applied in whatever unit the program uses.

use crate::linearizer::{round4, ArcLinearizer, ArcLinearizerConfig, ArcTarget, Point2};
use crate::words::GcodeWords;
use penstream_core::{Command, LoadError};
use std::fmt::Write as _;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Motion {
    Rapid,
    Linear,
    ArcCw,
    ArcCcw,
}

#[derive(Debug, Clone, Copy)]
struct ToolState {
    x: f64,
    y: f64,
    z: f64,
    motion: Option<Motion>,
    incremental: bool,
}

impl Default for ToolState {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            motion: None,
            incremental: false,
        }
    }
}

impl ToolState {
    fn resolve(&self, current: f64, word: Option<f64>) -> f64 {
        match word {
            Some(v) if self.incremental => current + v,
            Some(v) => v,
            None => current,
        }
    }
}

/// Return the command part of a line, or `None` if nothing is left.
///
/// Blank lines and lines starting with `;`, `(` or `%` are dropped entirely;
/// on other lines everything from the first `;` or `(` onwards is removed.
pub fn strip_comments(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with([';', '(', '%']) {
        return None;
    }

    let code = match trimmed.find([';', '(']) {
        Some(idx) => trimmed[..idx].trim_end(),
        None => trimmed,
    };

    (!code.is_empty()).then_some(code)
}

/// Loads and preprocesses G-code programs
#[derive(Debug, Clone, Default)]
pub struct ProgramLoader {
    linearizer: ArcLinearizer,
}

impl ProgramLoader {
    /// Create a loader with the given arc settings
    pub fn new(config: ArcLinearizerConfig) -> Self {
        Self {
            linearizer: ArcLinearizer::new(config),
        }
    }

    /// Turn raw lines into the command list to stream.
    ///
    /// Order is preserved; each arc is expanded in place.
    pub fn load<I, S>(&self, lines: I) -> Vec<Command>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut state = ToolState::default();
        let mut commands = Vec::new();

        for raw in lines {
            if let Some(code) = strip_comments(raw.as_ref()) {
                self.process_line(code, &mut state, &mut commands);
            }
        }

        commands
    }

    /// Read a program file and preprocess it.
    ///
    /// Invalid UTF-8 is replaced rather than rejected. The file handle is
    /// closed before returning.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Vec<Command>, LoadError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| LoadError::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let text = String::from_utf8_lossy(&bytes);

        let commands = self.load(text.lines());
        if commands.is_empty() {
            return Err(LoadError::EmptyProgram);
        }

        tracing::info!(
            "Loaded {} commands from {}",
            commands.len(),
            path.display()
        );
        Ok(commands)
    }

    fn process_line(&self, line: &str, state: &mut ToolState, out: &mut Vec<Command>) {
        let words = GcodeWords::parse(line);

        if words.has_g(90.0) {
            state.incremental = false;
        } else if words.has_g(91.0) {
            state.incremental = true;
        }

        // G92 redefines the current position without moving
        if words.has_g(92.0) {
            state.x = words.x.unwrap_or(state.x);
            state.y = words.y.unwrap_or(state.y);
            state.z = words.z.unwrap_or(state.z);
            out.push(Command::new(line));
            return;
        }

        // Homing and coordinate table writes: the end position is not known here
        if words.has_g(28.0) || words.has_g(30.0) || words.has_g(10.0) {
            out.push(Command::new(line));
            return;
        }

        let explicit = words.motion_code();
        if let Some(code) = explicit {
            state.motion = Some(match code {
                0 => Motion::Rapid,
                1 => Motion::Linear,
                2 => Motion::ArcCw,
                _ => Motion::ArcCcw,
            });
        }

        let has_offsets = words.i.is_some() || words.j.is_some();
        let is_arc = match state.motion {
            Some(Motion::ArcCw | Motion::ArcCcw) => {
                matches!(explicit, Some(2 | 3))
                    || words.has_axis_words()
                    || has_offsets
                    || words.r.is_some()
            }
            _ => false,
        };

        if !is_arc {
            state.x = state.resolve(state.x, words.x);
            state.y = state.resolve(state.y, words.y);
            state.z = state.resolve(state.z, words.z);
            out.push(Command::new(line));
            return;
        }

        if words.r.is_some() && !has_offsets {
            tracing::warn!("Radius-form arc passed through unexpanded: {}", line);
            state.x = state.resolve(state.x, words.x);
            state.y = state.resolve(state.y, words.y);
            state.z = state.resolve(state.z, words.z);
            out.push(Command::new(line));
            return;
        }

        let clockwise = state.motion == Some(Motion::ArcCw);
        self.expand_arc(line, &words, clockwise, state, out);
    }

    fn expand_arc(
        &self,
        line: &str,
        words: &GcodeWords,
        clockwise: bool,
        state: &mut ToolState,
        out: &mut Vec<Command>,
    ) {
        let start = Point2::new(state.x, state.y);
        let target = ArcTarget {
            x: words.x.map(|_| state.resolve(state.x, words.x)),
            y: words.y.map(|_| state.resolve(state.y, words.y)),
            i: words.i.unwrap_or(0.0),
            j: words.j.unwrap_or(0.0),
        };

        let points = self.linearizer.arc_points(start, target, clockwise);
        if points.is_empty() {
            tracing::debug!("Dropping degenerate arc: {}", line);
            return;
        }

        let z_start = state.z;
        let z_end = words.z.map(|_| state.resolve(state.z, words.z));
        let count = points.len();

        for (k, point) in points.iter().enumerate() {
            let mut cmd = String::from("G1");

            if state.incremental {
                let dx = round4(point.x - state.x);
                let dy = round4(point.y - state.y);
                let _ = write!(cmd, " X{:.4} Y{:.4}", dx, dy);
                state.x += dx;
                state.y += dy;
            } else {
                let _ = write!(cmd, " X{:.4} Y{:.4}", point.x, point.y);
                state.x = point.x;
                state.y = point.y;
            }

            if let Some(z_end) = z_end {
                let z = round4(z_start + (z_end - z_start) * (k + 1) as f64 / count as f64);
                if state.incremental {
                    let dz = round4(z - state.z);
                    let _ = write!(cmd, " Z{:.4}", dz);
                    state.z += dz;
                } else {
                    let _ = write!(cmd, " Z{:.4}", z);
                    state.z = z;
                }
            }

            if k == 0 {
                if let Some(feed) = words.f {
                    let _ = write!(cmd, " F{}", feed);
                }
            }

            out.push(Command::new(cmd));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_comments() {
        assert_eq!(strip_comments("G1 X1 ; move"), Some("G1 X1"));
        assert_eq!(strip_comments("  G0 Z5 (lift)"), Some("G0 Z5"));
        assert_eq!(strip_comments("; header"), None);
        assert_eq!(strip_comments("(comment)"), None);
        assert_eq!(strip_comments("%"), None);
        assert_eq!(strip_comments("   "), None);
    }

    #[test]
    fn test_modal_arc_continuation() {
        let loader = ProgramLoader::new(ArcLinearizerConfig { resolution: 100.0 });
        let cmds = loader.load(["G0 X10 Y0", "G2 X0 Y-10 I-10 J0", "X-10 Y0 I0 J10"]);
        // one rapid, then each quarter arc becomes a single chord
        assert_eq!(cmds.len(), 3);
        assert_eq!(cmds[1].as_str(), "G1 X0.0000 Y-10.0000");
        assert_eq!(cmds[2].as_str(), "G1 X-10.0000 Y0.0000");
    }

    #[test]
    fn test_feed_carried_on_first_segment() {
        let loader = ProgramLoader::new(ArcLinearizerConfig { resolution: 1.0 });
        let cmds = loader.load(["G0 X1 Y0", "G3 X-1 Y0 I-1 J0 F300"]);
        assert!(cmds[1].as_str().ends_with(" F300"));
        assert!(!cmds[2].as_str().contains('F'));
    }

    #[test]
    fn test_incremental_arc_emits_relative_moves() {
        let loader = ProgramLoader::new(ArcLinearizerConfig { resolution: 100.0 });
        let cmds = loader.load(["G0 X10 Y0", "G91", "G2 X-10 Y-10 I-10 J0"]);
        assert_eq!(cmds[1].as_str(), "G91");
        assert_eq!(cmds[2].as_str(), "G1 X-10.0000 Y-10.0000");
    }

    #[test]
    fn test_radius_arc_passes_through() {
        let loader = ProgramLoader::default();
        let cmds = loader.load(["G2 X10 Y0 R5"]);
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].as_str(), "G2 X10 Y0 R5");
    }

    #[test]
    fn test_g92_resets_tracked_position() {
        let loader = ProgramLoader::new(ArcLinearizerConfig { resolution: 100.0 });
        let cmds = loader.load(["G0 X50 Y50", "G92 X0 Y0", "G3 X-10 Y10 I-10 J0"]);
        assert_eq!(cmds[2].as_str(), "G1 X-10.0000 Y10.0000");
    }
}
