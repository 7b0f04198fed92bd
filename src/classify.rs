use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompletionBucket {
    Excellent,
    Good,
    NeedsImprovement,
}

impl CompletionBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionBucket::Excellent => "excellent",
            CompletionBucket::Good => "good",
            CompletionBucket::NeedsImprovement => "needs-improvement",
        }
    }
}

impl fmt::Display for CompletionBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GradeBucket {
    Ungraded,
    High,
    Medium,
    Low,
}

impl GradeBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            GradeBucket::Ungraded => "ungraded",
            GradeBucket::High => "high",
            GradeBucket::Medium => "medium",
            GradeBucket::Low => "low",
        }
    }
}

impl fmt::Display for GradeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "place")]
pub enum RankGlyph {
    Gold,
    Silver,
    Bronze,
    Badge(i32),
}

impl fmt::Display for RankGlyph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RankGlyph::Gold => f.write_str("[gold]"),
            RankGlyph::Silver => f.write_str("[silver]"),
            RankGlyph::Bronze => f.write_str("[bronze]"),
            RankGlyph::Badge(place) => write!(f, "#{place}"),
        }
    }
}

pub fn completion_bucket(percent: f64) -> CompletionBucket {
    if percent >= 80.0 {
        CompletionBucket::Excellent
    } else if percent >= 60.0 {
        CompletionBucket::Good
    } else {
        CompletionBucket::NeedsImprovement
    }
}

pub fn grade_bucket(grade: Option<f64>) -> GradeBucket {
    match grade {
        None => GradeBucket::Ungraded,
        Some(value) if value >= 8.0 => GradeBucket::High,
        Some(value) if value >= 6.0 => GradeBucket::Medium,
        Some(_) => GradeBucket::Low,
    }
}

/// Medal for the podium, numeric badge for everyone else.
pub fn rank_glyph(place: i32) -> RankGlyph {
    match place {
        1 => RankGlyph::Gold,
        2 => RankGlyph::Silver,
        3 => RankGlyph::Bronze,
        other => RankGlyph::Badge(other),
    }
}
