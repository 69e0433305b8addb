//! Channel configuration.
//!
//! [`ChannelConfig`] is a plain serde struct so it can be embedded in a
//! larger application config or loaded on its own from JSON. Missing fields
//! take their defaults.
//!
//! # Example
//!
//! ```
//! use card_protocol_core::ChannelConfig;
//!
//! let config = ChannelConfig::from_json(r#"{ "default_class": 128 }"#).unwrap();
//! assert_eq!(config.default_class, 0x80);
//! assert!(config.reconnect_on_connection_lost);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Settings for an [`ApduChannel`](crate::card::ApduChannel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Reconnect and replay the frame once when the connection is lost.
    pub reconnect_on_connection_lost: bool,

    /// Class byte sent before single-byte instructions.
    pub default_class: u8,
}

impl ChannelConfig {
    /// Parses a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if the JSON is
    /// malformed or a field has the wrong type.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the configuration to JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            reconnect_on_connection_lost: true,
            default_class: 0x00,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn empty_object_uses_defaults() {
        let config = ChannelConfig::from_json("{}").unwrap();
        assert_eq!(config, ChannelConfig::default());
    }

    #[test]
    fn disable_reconnect() {
        let config =
            ChannelConfig::from_json(r#"{ "reconnect_on_connection_lost": false }"#).unwrap();
        assert!(!config.reconnect_on_connection_lost);
        assert_eq!(config.default_class, 0x00);
    }

    #[test]
    fn wrong_type_is_config_error() {
        let err = ChannelConfig::from_json(r#"{ "default_class": 300 }"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn json_round_trip() {
        let config = ChannelConfig {
            reconnect_on_connection_lost: false,
            default_class: 0x80,
        };
        let json = config.to_json().unwrap();
        assert_eq!(ChannelConfig::from_json(&json).unwrap(), config);
    }
}
