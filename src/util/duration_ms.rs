//! Serde helper that (de)serializes `std::time::Duration` as whole milliseconds.
//!
//! Every duration-shaped configuration knob in `PoolConfig` is expressed in
//! `_ms` fields in the spec's configuration table; this keeps the wire/JSON
//! representation consistent with that naming when the config itself is
//! serialized (e.g. into `WORKER_CONFIG`).

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    (duration.as_millis() as u64).serialize(serializer)
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let millis = u64::deserialize(deserializer)?;
    Ok(Duration::from_millis(millis))
}

pub mod option {
    use super::*;

    pub fn serialize<S: Serializer>(
        duration: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        duration.map(|d| d.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        let millis: Option<u64> = Option::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[derive(Serialize, Deserialize)]
    struct Wrapper(#[serde(with = "super")] Duration);

    #[test]
    fn round_trips_as_millis() {
        let original = Wrapper(Duration::from_millis(1500));
        let json = serde_json::to_string(&original).unwrap();
        assert_eq!(json, "1500");
        let back: Wrapper = serde_json::from_str(&json).unwrap();
        assert_eq!(back.0, Duration::from_millis(1500));
    }
}
