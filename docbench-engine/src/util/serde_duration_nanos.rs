//! A Serde serializer/deserializer for std [Duration] instances as integer nanosecond values.
//!
//! Engine durations come from a monotonic nanosecond clock, so the integer form is lossless and
//! trivially consumable by reporters.

use serde::{self, Deserialize, Deserializer, Serializer};
use std::time::Duration;

/// Converts [Duration] instances to nanosecond numeric values, for use in JSON. Durations past
/// `u64::MAX` nanoseconds (over five centuries) saturate.
///
/// Parameters:
/// * `duration`: the [Duration] instance to be serialized
/// * `serializer`: the Serde [Serializer] to use
///
/// Returns the [Serializer] result.
pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
    serializer.serialize_u64(nanos)
}

/// Converts serialized JSON nanoseconds back to [Duration] instances.
///
/// Parameters:
/// * `deserializer`: the Serde [Deserializer] to use
///
/// Returns the deserialized [Duration].
pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let nanos = u64::deserialize(deserializer)?;
    Ok(Duration::from_nanos(nanos))
}

/// Unit tests for the [Duration] serializer & deserializer.
#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use std::time::Duration;

    /// Just used to test Serde against.
    #[derive(Deserialize, Serialize)]
    struct DurationStruct {
        #[serde(with = "super")]
        duration: Duration,
    }

    /// Verifies that [Duration] values serialize as expected.
    #[test]
    fn serialize() {
        let expected = json!({
            "duration": 1_000_000_234u64,
        });
        let expected = serde_json::to_string(&expected).unwrap();
        let actual = DurationStruct {
            duration: Duration::from_nanos(1_000_000_234),
        };
        let actual = serde_json::to_string(&actual).unwrap();
        assert_eq!(expected, actual);
    }

    /// Verifies that [Duration] values deserialize as expected.
    #[test]
    fn deserialize() {
        let expected = DurationStruct {
            duration: Duration::from_nanos(1_000_000_234),
        };
        let actual = json!({
            "duration": 1_000_000_234u64,
        });
        let actual = serde_json::to_string(&actual).unwrap();
        let actual: DurationStruct = serde_json::from_str(&actual).unwrap();
        assert_eq!(expected.duration, actual.duration);
    }
}
