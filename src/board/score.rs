//! Fixed-point decimal score.
//!
//! Scores are stored as an `i64` count of 1/10,000ths, giving four
//! fractional decimal digits and a total, deterministic ordering that
//! float scores cannot provide. Deltas are bounded to ±1000 by the
//! caller, so repeated updates stay far inside the representable range;
//! arithmetic that would still overflow is a fatal error.

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{Add, Neg};
use std::str::FromStr;

/// Fixed-point units per whole score point.
const SCALE: i64 = 10_000;
/// Fractional decimal digits carried by [`SCALE`].
const FRAC_DIGITS: usize = 4;

/// A signed fixed-point decimal score with four fractional digits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Score(i64);

impl Score {
    pub const ZERO: Score = Score(0);

    /// Score from a whole number of points.
    pub fn from_int(points: i64) -> Score {
        Score(points.checked_mul(SCALE).expect("score overflow"))
    }

    /// Score from raw fixed-point units (1 unit = 10^-4 points).
    pub fn from_raw(units: i64) -> Score {
        Score(units)
    }

    /// Raw fixed-point units.
    pub fn raw(self) -> i64 {
        self.0
    }

    /// A customer participates in the leaderboard iff its score is
    /// strictly positive.
    pub fn is_positive(self) -> bool {
        self.0 > 0
    }
}

impl Add for Score {
    type Output = Score;

    fn add(self, rhs: Score) -> Score {
        // Overflow has no meaningful recovery at this layer.
        Score(self.0.checked_add(rhs.0).expect("score arithmetic overflow"))
    }
}

impl Neg for Score {
    type Output = Score;

    fn neg(self) -> Score {
        Score(self.0.checked_neg().expect("score arithmetic overflow"))
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let units = self.0.unsigned_abs();
        let sign = if self.0 < 0 { "-" } else { "" };
        let int = units / SCALE as u64;
        let frac = units % SCALE as u64;
        if frac == 0 {
            write!(f, "{}{}", sign, int)
        } else {
            let digits = format!("{:04}", frac);
            write!(f, "{}{}.{}", sign, int, digits.trim_end_matches('0'))
        }
    }
}

/// Error parsing a decimal score literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseScoreError {
    input: String,
}

impl fmt::Display for ParseScoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid score literal: {:?}", self.input)
    }
}

impl std::error::Error for ParseScoreError {}

impl FromStr for Score {
    type Err = ParseScoreError;

    /// Parses plain decimal literals: `"12"`, `"-3.5"`, `"+0.0001"`.
    /// More than four fractional digits is an error, not a rounding.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseScoreError {
            input: s.to_string(),
        };

        let (neg, body) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };
        let (int_part, frac_part) = match body.split_once('.') {
            Some((i, f)) => (i, f),
            None => (body, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(err());
        }
        if frac_part.len() > FRAC_DIGITS {
            return Err(err());
        }

        let mut units: i64 = 0;
        if !int_part.is_empty() {
            if !int_part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(err());
            }
            let whole: i64 = int_part.parse().map_err(|_| err())?;
            units = whole.checked_mul(SCALE).ok_or_else(err)?;
        }
        if !frac_part.is_empty() {
            if !frac_part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(err());
            }
            let mut frac: i64 = frac_part.parse().map_err(|_| err())?;
            for _ in frac_part.len()..FRAC_DIGITS {
                frac *= 10;
            }
            units = units.checked_add(frac).ok_or_else(err)?;
        }

        Ok(Score(if neg { -units } else { units }))
    }
}

impl Serialize for Score {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Score {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_int_and_display() {
        assert_eq!(Score::from_int(0).to_string(), "0");
        assert_eq!(Score::from_int(42).to_string(), "42");
        assert_eq!(Score::from_int(-5).to_string(), "-5");
    }

    #[test]
    fn test_parse_round_trip() {
        for literal in ["0", "12", "-3.5", "0.0001", "-1000", "999.99"] {
            let score: Score = literal.parse().unwrap();
            assert_eq!(score.to_string(), literal, "round trip of {}", literal);
        }
    }

    #[test]
    fn test_parse_forms() {
        assert_eq!("+7".parse::<Score>().unwrap(), Score::from_int(7));
        assert_eq!(".5".parse::<Score>().unwrap(), Score::from_raw(5_000));
        assert_eq!("-0.25".parse::<Score>().unwrap(), Score::from_raw(-2_500));
        assert_eq!("2.".parse::<Score>().unwrap(), Score::from_int(2));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for literal in ["", ".", "-", "1.23456", "abc", "1e3", "1.2.3", "--1"] {
            assert!(literal.parse::<Score>().is_err(), "accepted {:?}", literal);
        }
    }

    #[test]
    fn test_ordering_is_total() {
        let a: Score = "10".parse().unwrap();
        let b: Score = "10.0001".parse().unwrap();
        let c: Score = "-10".parse().unwrap();
        assert!(b > a);
        assert!(c < a);
        assert_eq!(a, Score::from_int(10));
    }

    #[test]
    fn test_addition() {
        let total = Score::from_int(10) + "-4.5".parse::<Score>().unwrap();
        assert_eq!(total.to_string(), "5.5");
        assert!(total.is_positive());
        assert!(!(total + Score::from_int(-6)).is_positive());
    }

    #[test]
    #[should_panic(expected = "score arithmetic overflow")]
    fn test_overflow_is_fatal() {
        let _ = Score::from_raw(i64::MAX) + Score::from_raw(1);
    }

    #[test]
    fn test_zero_is_not_participating() {
        assert!(!Score::ZERO.is_positive());
        assert!(!Score::from_int(-1).is_positive());
        assert!(Score::from_raw(1).is_positive());
    }
}
