use serde::Serialize;
use std::fmt;

use crate::config::GradeScale;

/// Letter grade for a commute window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Converts an on-time percentage (0-100) into a letter grade.
///
/// With the default scale:
///
/// | Range   | Grade |
/// |---------|-------|
/// | >= 90   | A     |
/// | >= 80   | B     |
/// | >= 70   | C     |
/// | >= 60   | D     |
/// | < 60    | F     |
pub fn grade(on_time_percent: f64, scale: &GradeScale) -> Grade {
    match on_time_percent {
        p if p >= scale.a => Grade::A,
        p if p >= scale.b => Grade::B,
        p if p >= scale.c => Grade::C,
        p if p >= scale.d => Grade::D,
        _ => Grade::F,
    }
}
