use crate::transport::errors::TransportError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MumbleConfig {
    pub server: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_release")]
    pub release: String,
    /// Skip certificate verification; Mumble servers commonly run self-signed.
    #[serde(default)]
    pub accept_invalid_certs: bool,
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_interval_secs: u64,
    #[serde(default = "default_celt_versions")]
    pub celt_versions: Vec<u32>,
}

pub const DEFAULT_PORT: u16 = 64738;

pub const SAMPLE_RATE: u32 = 48_000;
pub const FRAME_SIZE: usize = SAMPLE_RATE as usize / 100;

/// Protocol version 1.2.3 packed into the low 24 bits.
pub const PROTOCOL_VERSION: u32 = (1 << 16) | (2 << 8) | 3;

/// CELT 0.7.0 bitstream identifier.
pub const CELT_VERSION: u32 = 0x8000_000b;

pub const DEFAULT_KEEPALIVE_SECS: u64 = 5;

pub const PLUGIN_CONTEXT: &[u8] = b"Manual placement\0test";

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_release() -> String {
    format!("babble-core {}", env!("CARGO_PKG_VERSION"))
}

fn default_keepalive_secs() -> u64 {
    DEFAULT_KEEPALIVE_SECS
}

fn default_celt_versions() -> Vec<u32> {
    vec![CELT_VERSION]
}

impl MumbleConfig {
    pub fn new(server: String, port: u16, username: String) -> Self {
        Self {
            server,
            port,
            username,
            password: None,
            release: default_release(),
            accept_invalid_certs: false,
            keepalive_interval_secs: DEFAULT_KEEPALIVE_SECS,
            celt_versions: default_celt_versions(),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, TransportError> {
        serde_json::from_str(raw)
            .map_err(|err| TransportError::InvalidConfig(format!("malformed config: {err}")))
    }

    pub fn validate(&self) -> Result<(), TransportError> {
        if self.server.trim().is_empty() {
            return Err(TransportError::InvalidConfig(
                "server is required".to_string(),
            ));
        }
        if self.username.trim().is_empty() {
            return Err(TransportError::InvalidConfig(
                "username is required".to_string(),
            ));
        }
        if self.keepalive_interval_secs == 0 {
            return Err(TransportError::InvalidConfig(
                "keepalive interval must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }

    /// True when an existing connection made with `other` can be reused for `self`.
    pub fn is_same_server(&self, other: &MumbleConfig) -> bool {
        self.server == other.server
            && self.port == other.port
            && self.username == other.username
            && self.password == other.password
    }
}

#[cfg(test)]
mod tests {
    use super::{MumbleConfig, CELT_VERSION, DEFAULT_KEEPALIVE_SECS, DEFAULT_PORT, FRAME_SIZE};
    use crate::transport::errors::TransportError;

    /// `new` populates required fields and leaves optional values empty.
    #[test]
    fn new_sets_defaults() {
        // Arrange
        // Act
        let config = MumbleConfig::new("example.org".to_string(), 64738, "alice".to_string());
        // Assert
        assert_eq!(config.server, "example.org");
        assert_eq!(config.port, 64738);
        assert_eq!(config.username, "alice");
        assert!(config.password.is_none());
        assert!(!config.accept_invalid_certs);
        assert_eq!(config.keepalive_interval_secs, DEFAULT_KEEPALIVE_SECS);
        assert_eq!(config.celt_versions, vec![CELT_VERSION]);
        assert!(config.release.starts_with("babble-core "));
    }

    /// One frame holds ten milliseconds of audio.
    #[test]
    fn frame_size_is_ten_milliseconds() {
        assert_eq!(FRAME_SIZE, 480);
    }

    /// JSON config fills unspecified fields from defaults.
    #[test]
    fn from_json_applies_defaults() {
        // Arrange
        let raw = r#"{ "server": "voice.example", "username": "bob", "password": "pw" }"#;
        // Act
        let config = MumbleConfig::from_json(raw).expect("config should parse");
        // Assert
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.password.as_deref(), Some("pw"));
        assert_eq!(config.keepalive_interval().as_secs(), DEFAULT_KEEPALIVE_SECS);
    }

    /// Malformed JSON is reported as a config error.
    #[test]
    fn from_json_rejects_malformed_input() {
        // Act
        let err = MumbleConfig::from_json("{ server").expect_err("expected parse failure");
        // Assert
        assert!(matches!(err, TransportError::InvalidConfig(_)));
    }

    /// Blank server or username values fail validation.
    #[test]
    fn validate_rejects_blank_fields() {
        // Arrange
        let no_server = MumbleConfig::new(" ".to_string(), DEFAULT_PORT, "alice".to_string());
        let no_user = MumbleConfig::new("host".to_string(), DEFAULT_PORT, "".to_string());
        let mut no_keepalive =
            MumbleConfig::new("host".to_string(), DEFAULT_PORT, "alice".to_string());
        no_keepalive.keepalive_interval_secs = 0;

        // Act / Assert
        assert!(matches!(
            no_server.validate(),
            Err(TransportError::InvalidConfig(_))
        ));
        assert!(matches!(
            no_user.validate(),
            Err(TransportError::InvalidConfig(_))
        ));
        assert!(matches!(
            no_keepalive.validate(),
            Err(TransportError::InvalidConfig(_))
        ));
    }

    /// Server identity covers host, port and credentials but not tuning knobs.
    #[test]
    fn is_same_server_compares_identity_fields() {
        // Arrange
        let base = MumbleConfig::new("host".to_string(), DEFAULT_PORT, "alice".to_string());
        let mut tuned = base.clone();
        tuned.keepalive_interval_secs = 30;
        let mut other_password = base.clone();
        other_password.password = Some("secret".to_string());

        // Act / Assert
        assert!(base.is_same_server(&tuned));
        assert!(!base.is_same_server(&other_password));
        assert!(!base.is_same_server(&MumbleConfig::new(
            "host".to_string(),
            1234,
            "alice".to_string()
        )));
    }
}
