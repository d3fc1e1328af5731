use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::error::EvaluationError;

/// Which side of the threshold counts as a breach.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    Above,
    /// Rules that omit `above` alert on low values.
    #[default]
    Below,
}

impl Direction {
    pub fn from_above_flag(above: bool) -> Self {
        if above {
            Direction::Above
        } else {
            Direction::Below
        }
    }

    /// Equality never breaches.
    pub fn breached(&self, value: i64, threshold: i64) -> bool {
        match self {
            Direction::Above => value > threshold,
            Direction::Below => value < threshold,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Above => f.write_str("above"),
            Direction::Below => f.write_str("below"),
        }
    }
}

// Rule files carry the direction as a boolean `above` flag.
impl Serialize for Direction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bool(matches!(self, Direction::Above))
    }
}

impl<'de> Deserialize<'de> for Direction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        bool::deserialize(deserializer).map(Direction::from_above_flag)
    }
}

/// Threshold exactly as written in the rule file. It is parsed when the rule
/// is evaluated and rendered verbatim into notifications.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Threshold(String);

impl Threshold {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn parse(&self) -> Result<i64, EvaluationError> {
        self.0
            .parse::<i64>()
            .map_err(|_| EvaluationError::NonNumericThreshold(self.0.clone()))
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Threshold {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Integer(i64),
            Float(f64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(text) => Threshold(text),
            Raw::Integer(n) => Threshold(n.to_string()),
            Raw::Float(n) => Threshold(n.to_string()),
        })
    }
}

/// Drop the fractional part of a sample before comparing it with the
/// integer threshold, e.g. 80.9 compares as 80.
pub fn truncate_sample(value: f64) -> Result<i64, EvaluationError> {
    if !value.is_finite() {
        return Err(EvaluationError::NonFiniteSample(value));
    }
    Ok(value.trunc() as i64)
}

/// Breach test for one sample.
pub fn is_breach(direction: Direction, threshold: i64, value: f64) -> Result<bool, EvaluationError> {
    Ok(direction.breached(truncate_sample(value)?, threshold))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_above_breaches_on_truncated_value() {
        assert!(is_breach(Direction::Above, 80, 81.7).unwrap());
        assert!(!is_breach(Direction::Above, 80, 80.0).unwrap());
        assert!(!is_breach(Direction::Above, 80, 12.0).unwrap());
    }

    #[test]
    fn test_below_breaches_on_truncated_value() {
        assert!(is_breach(Direction::Below, 10, 9.4).unwrap());
        assert!(!is_breach(Direction::Below, 10, 10.0).unwrap());
        assert!(!is_breach(Direction::Below, 10, 55.0).unwrap());
    }

    // FLAGGED: samples are truncated before comparing, so a fractional excess
    // over the threshold is ignored. Kept for compatibility with existing
    // rule files; these cases pin the behaviour.
    #[test]
    fn test_truncation_hides_fractional_breaches() {
        // 80.9 > 80 numerically, but truncates to 80.
        assert!(!is_breach(Direction::Above, 80, 80.9).unwrap());
        // 9.99 truncates to 9, still below 10.
        assert!(is_breach(Direction::Below, 10, 9.99).unwrap());
        // Truncation is toward zero: -0.5 compares as 0.
        assert!(!is_breach(Direction::Below, 0, -0.5).unwrap());
        assert_eq!(truncate_sample(-3.7).unwrap(), -3);
    }

    #[test]
    fn test_non_finite_samples_are_errors() {
        assert!(matches!(
            truncate_sample(f64::NAN),
            Err(EvaluationError::NonFiniteSample(_))
        ));
        assert!(is_breach(Direction::Above, 1, f64::INFINITY).is_err());
    }

    #[test]
    fn test_threshold_parsing() {
        assert_eq!(Threshold::new("80").parse().unwrap(), 80);
        assert_eq!(Threshold::new("-5").parse().unwrap(), -5);
        assert!(matches!(
            Threshold::new("eighty").parse(),
            Err(EvaluationError::NonNumericThreshold(_))
        ));
        assert!(Threshold::new("80.5").parse().is_err());
    }

    #[test]
    fn test_threshold_accepts_strings_and_numbers() {
        let from_string: Threshold = serde_json::from_str(r#""90""#).unwrap();
        let from_number: Threshold = serde_json::from_str("90").unwrap();
        assert_eq!(from_string, from_number);
        assert_eq!(from_number.as_str(), "90");
    }

    #[test]
    fn test_direction_round_trips_through_above_flag() {
        let above: Direction = serde_json::from_str("true").unwrap();
        let below: Direction = serde_json::from_str("false").unwrap();
        assert_eq!(above, Direction::Above);
        assert_eq!(below, Direction::Below);
        assert_eq!(serde_json::to_string(&Direction::Above).unwrap(), "true");
    }
}
