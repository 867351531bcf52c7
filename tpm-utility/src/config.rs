// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Utility configuration

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure to load a [`UtilityConfig`]
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Handles, passwords and key defaults used by the utility layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UtilityConfig {
    /// Password installed on the platform hierarchy during initialization
    pub platform_password: String,

    /// Persistent handle of the RSA storage root key
    pub storage_root_key: u32,

    /// Persistent handle of the ECC storage root key
    pub ecc_storage_root_key: u32,

    /// Persistent handle of the session salting key
    pub salting_key: u32,

    /// Modulus size for keys created with default parameters
    pub default_key_bits: u16,

    /// Public exponent for keys created with default parameters
    pub default_public_exponent: u32,
}

impl Default for UtilityConfig {
    fn default() -> Self {
        Self {
            platform_password: "cros-platform".into(),
            storage_root_key: 0x8100_0000,
            ecc_storage_root_key: 0x8100_0001,
            salting_key: 0x8100_0002,
            default_key_bits: 2048,
            default_public_exponent: 0x10001,
        }
    }
}

impl UtilityConfig {
    /// Load a JSON config file. Missing fields keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = UtilityConfig::from_json(r#"{"platform_password": "pw", "default_key_bits": 1024}"#)
            .unwrap();
        assert_eq!(config.platform_password, "pw");
        assert_eq!(config.default_key_bits, 1024);
        assert_eq!(config.storage_root_key, 0x8100_0000);
        assert_eq!(config.default_public_exponent, 0x10001);
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            UtilityConfig::from_json("{\"salting_key\": \"nope\"}"),
            Err(ConfigError::Parse(_))
        ));
    }
}
