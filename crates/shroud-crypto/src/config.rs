//! Cipher and replay-filter configuration.
//!
//! Deserializes from any serde format; the process embedding this crate
//! usually nests [`CryptoConfig`] under its own TOML config file.

use crate::CryptoError;
use crate::crypto::CipherMethod;
use crate::replay::{MAX_STAGE_BITS, first_stage_bits};
use serde::{Deserialize, Serialize};

/// Which end of the tunnel this process is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Client side; sessions are opened locally
    #[default]
    Local,
    /// Server side; accepts sessions and keeps a replay filter
    Remote,
}

/// Cipher configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct CryptoConfig {
    /// Method name, e.g. `aes-256-gcm`
    #[serde(default = "default_method")]
    pub method: Option<String>,

    /// Shared password the master key is derived from
    #[serde(default)]
    pub password: String,

    /// Replay filter sizing
    #[serde(default)]
    pub replay: ReplayConfig,

    /// Local or remote end
    #[serde(default)]
    pub role: Role,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            method: default_method(),
            password: String::new(),
            replay: ReplayConfig::default(),
            role: Role::default(),
        }
    }
}

impl CryptoConfig {
    /// Check the method name, password and replay sizing.
    ///
    /// # Errors
    ///
    /// Returns the same error construction would fail with.
    pub fn validate(&self) -> Result<(), CryptoError> {
        let method = self
            .method
            .as_deref()
            .ok_or_else(|| CryptoError::UnsupportedMethod("<none>".into()))?;

        if CipherMethod::from_name(method).is_none() {
            return Err(CryptoError::UnsupportedMethod(method.to_string()));
        }

        if self.password.is_empty() {
            return Err(CryptoError::InvalidParameter(
                "password must not be empty".into(),
            ));
        }

        if self.role == Role::Remote {
            self.replay.validate()?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for CryptoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoConfig")
            .field("method", &self.method)
            .field("password", &"<redacted>")
            .field("replay", &self.replay)
            .field("role", &self.role)
            .finish()
    }
}

/// Replay filter sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Salts expected before the filter has to grow
    #[serde(default = "default_expected_entries")]
    pub expected_entries: usize,

    /// Target false-positive rate, strictly between 0 and 1
    #[serde(default = "default_false_positive_rate")]
    pub false_positive_rate: f64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            expected_entries: default_expected_entries(),
            false_positive_rate: default_false_positive_rate(),
        }
    }
}

impl ReplayConfig {
    /// Check the filter can be built from these parameters.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::ReplayFilterInit`] for zero entries, a rate
    /// outside `(0, 1)`, or sizing whose first stage would not fit in
    /// [`MAX_STAGE_BITS`](crate::replay::MAX_STAGE_BITS).
    pub fn validate(&self) -> Result<(), CryptoError> {
        if self.expected_entries == 0 {
            return Err(CryptoError::ReplayFilterInit(
                "expected entries must be non-zero".into(),
            ));
        }

        let rate = self.false_positive_rate;
        if !(rate > 0.0 && rate < 1.0) {
            return Err(CryptoError::ReplayFilterInit(format!(
                "false positive rate {rate} outside (0, 1)"
            )));
        }

        if first_stage_bits(self.expected_entries, rate).is_none() {
            return Err(CryptoError::ReplayFilterInit(format!(
                "{} entries at rate {rate} need more than {MAX_STAGE_BITS} bits",
                self.expected_entries
            )));
        }
        Ok(())
    }
}

#[allow(clippy::unnecessary_wraps)]
fn default_method() -> Option<String> {
    Some("aes-256-gcm".to_string())
}

fn default_expected_entries() -> usize {
    1_000_000
}

fn default_false_positive_rate() -> f64 {
    1e-6
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CryptoConfig::default();
        assert_eq!(config.method.as_deref(), Some("aes-256-gcm"));
        assert_eq!(config.role, Role::Local);
        assert_eq!(config.replay.expected_entries, 1_000_000);
        assert!((config.replay.false_positive_rate - 1e-6).abs() < f64::EPSILON);
    }

    #[test]
    fn test_config_validation() {
        let mut config = CryptoConfig {
            password: "hunter2".into(),
            ..CryptoConfig::default()
        };
        assert!(config.validate().is_ok());

        config.method = Some("AES-256-GCM".into());
        assert!(matches!(
            config.validate(),
            Err(CryptoError::UnsupportedMethod(_))
        ));

        config.method = None;
        assert!(matches!(
            config.validate(),
            Err(CryptoError::UnsupportedMethod(_))
        ));

        config.method = Some("salsa20".into());
        config.password.clear();
        assert!(matches!(
            config.validate(),
            Err(CryptoError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_replay_validation_only_for_remote() {
        let mut config = CryptoConfig {
            password: "pw".into(),
            ..CryptoConfig::default()
        };
        config.replay.expected_entries = 0;
        assert!(config.validate().is_ok());

        config.role = Role::Remote;
        assert!(matches!(
            config.validate(),
            Err(CryptoError::ReplayFilterInit(_))
        ));
    }

    #[test]
    fn test_replay_rate_bounds() {
        for rate in [0.0, 1.0, -0.5, 2.0, f64::NAN] {
            let replay = ReplayConfig {
                false_positive_rate: rate,
                ..ReplayConfig::default()
            };
            assert!(replay.validate().is_err(), "rate {rate}");
        }
    }

    #[test]
    fn test_replay_entries_upper_bound() {
        let replay = ReplayConfig {
            expected_entries: 10_000_000,
            ..ReplayConfig::default()
        };
        assert!(replay.validate().is_ok());

        for expected_entries in [usize::MAX, 1 << 40] {
            let replay = ReplayConfig {
                expected_entries,
                ..ReplayConfig::default()
            };
            assert!(matches!(
                replay.validate(),
                Err(CryptoError::ReplayFilterInit(_))
            ));
        }
    }

    #[test]
    fn test_toml_parsing() {
        let config: CryptoConfig = toml::from_str(
            r#"
            method = "chacha20-ietf-poly1305"
            password = "correct horse"
            role = "remote"

            [replay]
            expected_entries = 4096
            "#,
        )
        .unwrap();

        assert_eq!(config.method.as_deref(), Some("chacha20-ietf-poly1305"));
        assert_eq!(config.role, Role::Remote);
        assert_eq!(config.replay.expected_entries, 4096);
        assert!((config.replay.false_positive_rate - 1e-6).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_defaults() {
        let config: CryptoConfig = toml::from_str(r#"password = "pw""#).unwrap();
        assert_eq!(config.method.as_deref(), Some("aes-256-gcm"));
        assert_eq!(config.role, Role::Local);
    }

    #[test]
    fn test_toml_serialization() {
        let config = CryptoConfig {
            password: "pw".into(),
            role: Role::Remote,
            ..CryptoConfig::default()
        };
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: CryptoConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.method, deserialized.method);
        assert_eq!(config.role, deserialized.role);
        assert_eq!(
            config.replay.expected_entries,
            deserialized.replay.expected_entries
        );
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = CryptoConfig {
            password: "super-secret".into(),
            ..CryptoConfig::default()
        };
        assert!(!format!("{config:?}").contains("super-secret"));
    }
}
