//! Absolute time ranges and the flexible time decoder from §6.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, CoreError> {
        if end <= start {
            return Err(CoreError::validation(
                "end",
                "time range end must be strictly after start",
            ));
        }
        Ok(Self { start, end })
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant <= self.end
    }
}

/// Decodes a time instant from an ISO-8601 string, or an epoch value whose unit
/// (seconds/milliseconds/microseconds) is inferred from its magnitude, per §6:
/// `>= 1e15` -> microseconds, `>= 1e12` -> milliseconds, `>= 1e9` -> seconds, else seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlexibleTime(pub DateTime<Utc>);

impl FlexibleTime {
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Ok(FlexibleTime(dt.with_timezone(&Utc)));
        }
        if let Ok(n) = raw.parse::<f64>() {
            return Self::from_epoch_number(n);
        }
        Err(CoreError::validation(
            "time",
            format!("could not parse `{raw}` as ISO-8601 or epoch time"),
        ))
    }

    pub fn from_epoch_number(n: f64) -> Result<Self, CoreError> {
        let magnitude = n.abs();
        let (secs, nanos) = if magnitude >= 1e15 {
            let micros = n as i64;
            (micros.div_euclid(1_000_000), (micros.rem_euclid(1_000_000) * 1_000) as u32)
        } else if magnitude >= 1e12 {
            let millis = n as i64;
            (millis.div_euclid(1_000), (millis.rem_euclid(1_000) * 1_000_000) as u32)
        } else if magnitude >= 1e9 {
            (n as i64, ((n.fract().abs()) * 1e9) as u32)
        } else {
            (n as i64, ((n.fract().abs()) * 1e9) as u32)
        };
        Utc.timestamp_opt(secs, nanos)
            .single()
            .map(FlexibleTime)
            .ok_or_else(|| CoreError::validation("time", "epoch value out of range"))
    }
}

impl<'de> Deserialize<'de> for FlexibleTime {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Str(String),
            Num(f64),
        }
        let raw = Raw::deserialize(deserializer)?;
        match raw {
            Raw::Str(s) => FlexibleTime::parse(&s).map_err(serde::de::Error::custom),
            Raw::Num(n) => FlexibleTime::from_epoch_number(n).map_err(serde::de::Error::custom),
        }
    }
}

impl Serialize for FlexibleTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_range_rejects_non_positive_span() {
        let t = Utc.timestamp_opt(1_000, 0).single().unwrap();
        assert!(TimeRange::new(t, t).is_err());
        assert!(TimeRange::new(t, t - chrono::Duration::seconds(1)).is_err());
    }

    #[test]
    fn flexible_time_infers_seconds() {
        let ft = FlexibleTime::from_epoch_number(1_700_000_000.0).unwrap();
        assert_eq!(ft.0.timestamp(), 1_700_000_000);
    }

    #[test]
    fn flexible_time_infers_milliseconds() {
        let ft = FlexibleTime::from_epoch_number(1_700_000_000_000.0).unwrap();
        assert_eq!(ft.0.timestamp(), 1_700_000_000);
    }

    #[test]
    fn flexible_time_infers_microseconds() {
        let ft = FlexibleTime::from_epoch_number(1_700_000_000_000_000.0).unwrap();
        assert_eq!(ft.0.timestamp(), 1_700_000_000);
    }

    #[test]
    fn flexible_time_parses_rfc3339() {
        let ft = FlexibleTime::parse("2024-01-01T00:00:00Z").unwrap();
        assert_eq!(ft.0.timestamp(), 1_704_067_200);
    }

    #[test]
    fn flexible_time_round_trips_at_input_resolution() {
        let original = FlexibleTime::from_epoch_number(1_700_000_000_000.0).unwrap();
        let json = serde_json::to_string(&original).unwrap();
        let back: FlexibleTime = serde_json::from_str(&json).unwrap();
        assert_eq!(original.0.timestamp(), back.0.timestamp());
    }
}
