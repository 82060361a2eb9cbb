//! Rate interval rules mapping a score rate to bucketed points.

use crate::error::{Result, StatError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// One rate interval with its point value. Bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateBucket {
    pub min_rate: f64,
    pub max_rate: f64,
    pub points: f64,
}

impl FromStr for RateBucket {
    type Err = StatError;

    /// Parses the `MIN,MAX,POINTS` form used on the command line.
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 3 {
            return Err(StatError::InvalidRule(format!(
                "expected MIN,MAX,POINTS, got {s:?}"
            )));
        }
        let parse = |part: &str| {
            part.parse::<f64>()
                .map_err(|_| StatError::InvalidRule(format!("not a number: {part:?}")))
        };
        Ok(RateBucket {
            min_rate: parse(parts[0])?,
            max_rate: parse(parts[1])?,
            points: parse(parts[2])?,
        })
    }
}

/// An ordered set of rate intervals. Intervals may overlap; lookup is
/// strictly first-in-list-wins, so callers order them deliberately.
#[derive(Debug, Clone, Default)]
pub struct BucketRules {
    buckets: Vec<RateBucket>,
}

impl BucketRules {
    /// Validates every interval eagerly. Nothing should be computed with a
    /// bad rule set, so this is called before any file is opened.
    pub fn new(buckets: Vec<RateBucket>) -> Result<Self> {
        for (i, b) in buckets.iter().enumerate() {
            if !b.min_rate.is_finite() || !b.max_rate.is_finite() || !b.points.is_finite() {
                return Err(StatError::InvalidRule(format!(
                    "interval {}: values must be finite numbers",
                    i + 1
                )));
            }
            if !(0.0..=1.0).contains(&b.min_rate) || !(0.0..=1.0).contains(&b.max_rate) {
                return Err(StatError::InvalidRule(format!(
                    "interval {}: rates must be within 0 and 1",
                    i + 1
                )));
            }
            if b.min_rate > b.max_rate {
                return Err(StatError::InvalidRule(format!(
                    "interval {}: min rate is greater than max rate",
                    i + 1
                )));
            }
        }
        Ok(BucketRules { buckets })
    }

    /// Maps a rate to its bucketed point value.
    ///
    /// The rate is clamped to `[0, 1]` first; the first interval containing
    /// it (inclusive on both ends) wins. No match returns `0.0`.
    pub fn points_for_rate(&self, rate: f64) -> f64 {
        let rate = rate.clamp(0.0, 1.0);
        self.buckets
            .iter()
            .find(|b| b.min_rate <= rate && rate <= b.max_rate)
            .map(|b| b.points)
            .unwrap_or(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_band_rules() -> BucketRules {
        BucketRules::new(vec![
            RateBucket {
                min_rate: 0.0,
                max_rate: 0.59,
                points: 1.0,
            },
            RateBucket {
                min_rate: 0.6,
                max_rate: 1.0,
                points: 2.0,
            },
        ])
        .unwrap()
    }

    #[test]
    fn test_boundaries_are_inclusive() {
        let rules = two_band_rules();
        assert_eq!(rules.points_for_rate(0.59), 1.0);
        assert_eq!(rules.points_for_rate(0.6), 2.0);
        assert_eq!(rules.points_for_rate(1.0), 2.0);
        assert_eq!(rules.points_for_rate(0.0), 1.0);
    }

    #[test]
    fn test_out_of_range_rates_are_clamped() {
        let rules = two_band_rules();
        assert_eq!(rules.points_for_rate(1.5), 2.0);
        assert_eq!(rules.points_for_rate(-0.2), 1.0);
    }

    #[test]
    fn test_gap_returns_zero() {
        let rules = two_band_rules();
        // 0.595 falls between the two intervals
        assert_eq!(rules.points_for_rate(0.595), 0.0);
    }

    #[test]
    fn test_overlap_first_in_list_wins() {
        let rules = BucketRules::new(vec![
            RateBucket {
                min_rate: 0.0,
                max_rate: 1.0,
                points: 5.0,
            },
            RateBucket {
                min_rate: 0.5,
                max_rate: 1.0,
                points: 9.0,
            },
        ])
        .unwrap();
        assert_eq!(rules.points_for_rate(0.7), 5.0);
    }

    #[test]
    fn test_empty_rule_set_returns_zero() {
        let rules = BucketRules::new(vec![]).unwrap();
        assert_eq!(rules.points_for_rate(0.5), 0.0);
    }

    #[test]
    fn test_inverted_interval_is_rejected() {
        let err = BucketRules::new(vec![RateBucket {
            min_rate: 0.7,
            max_rate: 0.3,
            points: 5.0,
        }])
        .unwrap_err();
        assert!(matches!(err, StatError::InvalidRule(_)));
    }

    #[test]
    fn test_out_of_range_interval_is_rejected() {
        let err = BucketRules::new(vec![RateBucket {
            min_rate: -0.1,
            max_rate: 0.5,
            points: 5.0,
        }])
        .unwrap_err();
        assert!(matches!(err, StatError::InvalidRule(_)));

        let err = BucketRules::new(vec![RateBucket {
            min_rate: 0.0,
            max_rate: 1.2,
            points: 5.0,
        }])
        .unwrap_err();
        assert!(matches!(err, StatError::InvalidRule(_)));
    }

    #[test]
    fn test_nan_interval_is_rejected() {
        let err = BucketRules::new(vec![RateBucket {
            min_rate: f64::NAN,
            max_rate: 0.5,
            points: 5.0,
        }])
        .unwrap_err();
        assert!(matches!(err, StatError::InvalidRule(_)));
    }

    #[test]
    fn test_from_str() {
        let b: RateBucket = "0.6, 1.0, 2".parse().unwrap();
        assert_eq!(b.min_rate, 0.6);
        assert_eq!(b.max_rate, 1.0);
        assert_eq!(b.points, 2.0);

        assert!("0.6,1.0".parse::<RateBucket>().is_err());
        assert!("a,b,c".parse::<RateBucket>().is_err());
    }
}
