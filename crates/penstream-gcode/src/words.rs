//! Word extraction for single G-code lines
//!
//! Only the words the loader and the pen estimator care about are kept:
//! G and M codes plus the X, Y, Z, I, J, R and F values.

use once_cell::sync::Lazy;
use regex::Regex;

static WORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([A-Za-z])\s*([-+]?(?:\d+\.?\d*|\.\d+))").expect("static word pattern")
});

/// Words found on one line of G-code
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GcodeWords {
    /// G codes in order of appearance (`G38.2` is kept as `38.2`)
    pub g: Vec<f64>,
    /// M codes in order of appearance
    pub m: Vec<u32>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub i: Option<f64>,
    pub j: Option<f64>,
    pub r: Option<f64>,
    pub f: Option<f64>,
}

impl GcodeWords {
    /// Extract words from a line that has already had its comments removed
    pub fn parse(line: &str) -> Self {
        let mut words = Self::default();

        for caps in WORD_RE.captures_iter(line) {
            let letter = caps[1].to_ascii_uppercase();
            let Ok(value) = caps[2].parse::<f64>() else {
                continue;
            };

            match letter.as_str() {
                "G" => words.g.push(value),
                "M" => {
                    if value >= 0.0 {
                        words.m.push(value as u32);
                    }
                }
                "X" => words.x = Some(value),
                "Y" => words.y = Some(value),
                "Z" => words.z = Some(value),
                "I" => words.i = Some(value),
                "J" => words.j = Some(value),
                "R" => words.r = Some(value),
                "F" => words.f = Some(value),
                _ => {}
            }
        }

        words
    }

    /// True if the line carries the given G code (`G1` and `G01` both match 1)
    pub fn has_g(&self, code: f64) -> bool {
        self.g.iter().any(|g| (g - code).abs() < 1e-9)
    }

    /// True if the line carries the given M code
    pub fn has_m(&self, code: u32) -> bool {
        self.m.contains(&code)
    }

    /// Last motion-group code (G0, G1, G2, G3) on the line
    pub fn motion_code(&self) -> Option<u8> {
        self.g.iter().rev().find_map(|g| match *g {
            c if c == 0.0 => Some(0),
            c if c == 1.0 => Some(1),
            c if c == 2.0 => Some(2),
            c if c == 3.0 => Some(3),
            _ => None,
        })
    }

    /// True if any X, Y or Z word is present
    pub fn has_axis_words(&self) -> bool {
        self.x.is_some() || self.y.is_some() || self.z.is_some()
    }
}
