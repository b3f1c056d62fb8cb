//! Personality Catalog
//!
//! A personality fixes how the system talks for the lifetime of one
//! session: the tone of the lines, how fast the intensity ramps with
//! escalation, and whether harsher vocabulary is allowed. The catalog is
//! a process-wide read-only constant; sessions hold the id and look the
//! record up on demand.

use serde::{Deserialize, Serialize};

/// Voice register of a personality.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Sarcastic,
    Caring,
    Drill,
}

/// Message intensity buckets, derived from the escalation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intensity {
    Low,
    Mid,
    High,
}

/// How quickly the escalation level pushes into harsher buckets.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IntensityCurve {
    Fast,
    Medium,
    Slow,
}

impl IntensityCurve {
    /// Maps an escalation level onto an intensity bucket.
    pub fn bucket(&self, escalation_level: u32) -> Intensity {
        let (mid_at, high_at) = match self {
            IntensityCurve::Fast => (1, 3),
            IntensityCurve::Medium => (2, 5),
            IntensityCurve::Slow => (3, 7),
        };
        if escalation_level >= high_at {
            Intensity::High
        } else if escalation_level >= mid_at {
            Intensity::Mid
        } else {
            Intensity::Low
        }
    }
}

/// Describes how the system should talk. Intentionally small and
/// deterministic so message selection stays predictable and testable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Personality {
    pub id: &'static str,
    pub tone: Tone,
    pub intensity_curve: IntensityCurve,
    pub swear_allowance: bool,
}

pub const DEFAULT_PERSONALITY: Personality = Personality {
    id: "default_savage",
    tone: Tone::Sarcastic,
    intensity_curve: IntensityCurve::Fast,
    swear_allowance: false,
};

const CATALOG: &[Personality] = &[
    DEFAULT_PERSONALITY,
    Personality {
        id: "gentle_guide",
        tone: Tone::Caring,
        intensity_curve: IntensityCurve::Slow,
        swear_allowance: false,
    },
    Personality {
        id: "drill_sergeant",
        tone: Tone::Drill,
        intensity_curve: IntensityCurve::Medium,
        swear_allowance: true,
    },
];

/// Looks a personality up by id in the read-only catalog.
pub fn personality(id: &str) -> Option<&'static Personality> {
    CATALOG.iter().find(|p| p.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_personality_is_in_catalog() {
        let found = personality("default_savage").unwrap();
        assert_eq!(found.tone, Tone::Sarcastic);
        assert_eq!(found.intensity_curve, IntensityCurve::Fast);
    }

    #[test]
    fn test_unknown_personality_lookup() {
        assert!(personality("nonexistent").is_none());
    }

    #[test]
    fn test_fast_curve_ramps_quickly() {
        let curve = IntensityCurve::Fast;
        assert_eq!(curve.bucket(0), Intensity::Low);
        assert_eq!(curve.bucket(1), Intensity::Mid);
        assert_eq!(curve.bucket(2), Intensity::Mid);
        assert_eq!(curve.bucket(3), Intensity::High);
        assert_eq!(curve.bucket(99), Intensity::High);
    }

    #[test]
    fn test_slow_curve_stays_low_longer() {
        let curve = IntensityCurve::Slow;
        assert_eq!(curve.bucket(2), Intensity::Low);
        assert_eq!(curve.bucket(3), Intensity::Mid);
        assert_eq!(curve.bucket(6), Intensity::Mid);
        assert_eq!(curve.bucket(7), Intensity::High);
    }

    #[test]
    fn test_curves_are_monotone_in_level() {
        fn rank(i: Intensity) -> u8 {
            match i {
                Intensity::Low => 0,
                Intensity::Mid => 1,
                Intensity::High => 2,
            }
        }
        for curve in [IntensityCurve::Fast, IntensityCurve::Medium, IntensityCurve::Slow] {
            let mut last = 0;
            for level in 0..10 {
                let r = rank(curve.bucket(level));
                assert!(r >= last, "{:?} regressed at level {}", curve, level);
                last = r;
            }
        }
    }
}
