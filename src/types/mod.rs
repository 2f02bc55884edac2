pub mod command;

pub use command::*;

use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

pub const NANOS_PER_SECOND: i32 = 1_000_000_000;

/// Wall-clock instant split into Unix epoch seconds and a sub-second remainder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: i32,
}

impl Timestamp {
    pub fn new(seconds: i64, nanos: i32) -> Self {
        Self { seconds, nanos }
    }

    pub fn is_valid(&self) -> bool {
        (0..NANOS_PER_SECOND).contains(&self.nanos)
    }

    /// Nanoseconds since the Unix epoch, as fed to the position equation.
    pub fn as_nanos_f64(&self) -> f64 {
        self.seconds as f64 * 1e9 + self.nanos as f64
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: Timestamp,
}

/// One positional report. `location` is only empty on the handshake sample.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl TelemetrySample {
    pub fn handshake(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            location: None,
        }
    }

    pub fn with_location(user_id: &str, latitude: f64, longitude: f64, timestamp: Timestamp) -> Self {
        Self {
            user_id: user_id.to_string(),
            location: Some(Location {
                latitude,
                longitude,
                timestamp,
            }),
        }
    }

    pub fn is_handshake(&self) -> bool {
        self.location.is_none()
    }

    /// Check the sample against the wire invariants. `first_in_call` allows
    /// the empty-location handshake.
    pub fn validate(&self, first_in_call: bool) -> Result<(), ChannelError> {
        match &self.location {
            None if first_in_call => Ok(()),
            None => Err(ChannelError::InvalidMessage(format!(
                "sample from user {} has no location outside of a handshake",
                self.user_id
            ))),
            Some(location) if !location.timestamp.is_valid() => {
                Err(ChannelError::InvalidMessage(format!(
                    "sample from user {} has nanos {} outside [0, 1e9)",
                    self.user_id, location.timestamp.nanos
                )))
            }
            Some(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_omits_location_on_the_wire() {
        let json = serde_json::to_string(&TelemetrySample::handshake("abc")).unwrap();
        assert_eq!(json, r#"{"user_id":"abc"}"#);

        let parsed: TelemetrySample = serde_json::from_str(r#"{"user_id":"abc","location":null}"#).unwrap();
        assert!(parsed.is_handshake());
    }

    #[test]
    fn test_sample_wire_shape() {
        let sample = TelemetrySample::with_location("u1", 1.5, -2.0, Timestamp::new(10, 500));
        let value = serde_json::to_value(&sample).unwrap();
        assert_eq!(value["location"]["timestamp"]["seconds"], 10);
        assert_eq!(value["location"]["timestamp"]["nanos"], 500);
        assert_eq!(value["location"]["latitude"], 1.5);
    }

    #[test]
    fn test_validate_rejects_bad_nanos() {
        let sample = TelemetrySample::with_location("u1", 0.0, 0.0, Timestamp::new(1, NANOS_PER_SECOND));
        assert!(sample.validate(false).is_err());

        let sample = TelemetrySample::with_location("u1", 0.0, 0.0, Timestamp::new(1, -1));
        assert!(sample.validate(true).is_err());

        let sample = TelemetrySample::with_location("u1", 0.0, 0.0, Timestamp::new(1, 999_999_999));
        assert!(sample.validate(false).is_ok());
    }

    #[test]
    fn test_validate_handshake_only_first() {
        let handshake = TelemetrySample::handshake("u1");
        assert!(handshake.validate(true).is_ok());
        assert!(handshake.validate(false).is_err());
    }

    #[test]
    fn test_timestamp_as_nanos() {
        let ts = Timestamp::new(2, 250_000_000);
        assert_eq!(ts.as_nanos_f64(), 2_250_000_000.0);
    }
}
