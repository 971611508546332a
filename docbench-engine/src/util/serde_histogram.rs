//! A Serde serializer/deserializer for [Histogram] instances that uses the histogram library's
//! compressed binary serialization format, Base64-encoded for JSON transport.
//!
//! Shipping the whole histogram (rather than just pre-derived statistics) lets downstream
//! consumers recompute any percentile they care about.

use hdrhistogram::serialization::{
    Deserializer as HistogramDeserializer, Serializer as HistogramSerializer, V2DeflateSerializer,
};
use hdrhistogram::Histogram;
use serde::{self, Deserialize, Deserializer, Serializer};

/// Converts [Histogram] instances to a Base64 string of the compressed binary format, for use
/// in JSON.
///
/// Parameters:
/// * `histogram`: the [Histogram] instance to be serialized
/// * `serializer`: the Serde [Serializer] to use
///
/// Returns the [Serializer] result.
pub fn serialize<S>(histogram: &Histogram<u64>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut bytes = Vec::new();
    V2DeflateSerializer::new()
        .serialize(histogram, &mut bytes)
        .map_err(|err| serde::ser::Error::custom(format!("{}", err)))?;
    serializer.serialize_str(&base64::encode(bytes))
}

/// Converts serialized histogram strings back to [Histogram] instances.
///
/// Parameters:
/// * `deserializer`: the Serde [Deserializer] to use
///
/// Returns the deserialized [Histogram].
pub fn deserialize<'de, D>(deserializer: D) -> Result<Histogram<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let encoded = String::deserialize(deserializer)?;
    let bytes = base64::decode(encoded).map_err(serde::de::Error::custom)?;
    let mut reader = std::io::Cursor::new(&bytes);
    HistogramDeserializer::new()
        .deserialize(&mut reader)
        .map_err(|err| serde::de::Error::custom(format!("{}", err)))
}
