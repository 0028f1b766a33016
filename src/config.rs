use std::path::PathBuf;
use std::str::FromStr;

use bon::Builder;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CertVaultError, Result};
use crate::key::DEFAULT_KEY_BITS;
use crate::keystore::Protection;

pub const DEFAULT_STORE_PATH: &str = "store.ks";
pub const DEFAULT_VALIDITY_DAYS: i64 = 365;

/// Password of development stores. Only handed out by
/// [`development_password`].
const DEVELOPMENT_PASSWORD: &str = "keytool";

pub const STORE_PATH_VAR: &str = "CERTVAULT_STORE";
pub const KEY_BITS_VAR: &str = "CERTVAULT_KEY_BITS";
pub const VALIDITY_DAYS_VAR: &str = "CERTVAULT_VALIDITY_DAYS";
pub const PASSWORD_VAR: &str = "CERTVAULT_PASSWORD";

/// Where a store lives and how new material in it is produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[serde(default)]
pub struct StoreConfig {
    #[builder(into, default = PathBuf::from(DEFAULT_STORE_PATH))]
    pub path: PathBuf,
    /// RSA modulus length for generated keys.
    #[builder(default = DEFAULT_KEY_BITS)]
    pub key_bits: usize,
    /// Lifetime of generated certificates, starting at generation time.
    #[builder(default = DEFAULT_VALIDITY_DAYS)]
    pub validity_days: i64,
    #[builder(default)]
    pub protection: Protection,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl StoreConfig {
    /// `store.ks` in the working directory, 1024 bit keys valid for a year.
    pub fn development() -> Self {
        Self::default()
    }

    /// Development defaults overridden by `CERTVAULT_STORE`,
    /// `CERTVAULT_KEY_BITS` and `CERTVAULT_VALIDITY_DAYS` when set.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::development();
        if let Some(path) = env_var(STORE_PATH_VAR)? {
            config.path = PathBuf::from(path);
        }
        if let Some(bits) = parse_env_var(KEY_BITS_VAR)? {
            config.key_bits = bits;
        }
        if let Some(days) = parse_env_var(VALIDITY_DAYS_VAR)? {
            config.validity_days = days;
        }
        Ok(config)
    }
}

fn env_var(name: &str) -> Result<Option<String>> {
    match std::env::var(name) {
        Ok(value) => Ok(Some(value)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(CertVaultError::ConfigError(format!("{name}: {e}"))),
    }
}

fn parse_env_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_var(name)?
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|e| CertVaultError::ConfigError(format!("{name}='{value}': {e}")))
        })
        .transpose()
}

/// The fixed password of development stores.
///
/// Anyone can open a store protected by it.
pub fn development_password() -> SecretString {
    warn!("using the built-in development keystore password");
    SecretString::new(DEVELOPMENT_PASSWORD.to_string())
}

/// Reads the store password from `CERTVAULT_PASSWORD`.
pub fn password_from_env() -> Result<SecretString> {
    env_var(PASSWORD_VAR)?
        .map(SecretString::new)
        .ok_or_else(|| CertVaultError::ConfigError(format!("{PASSWORD_VAR} is not set")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn development_defaults() {
        let config = StoreConfig::development();
        assert_eq!(config.path, PathBuf::from("store.ks"));
        assert_eq!(config.key_bits, 1024);
        assert_eq!(config.validity_days, 365);
        assert_eq!(config.protection, Protection::default());
        assert_eq!(development_password().expose_secret(), "keytool");
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = StoreConfig::builder()
            .path("/tmp/other.ks")
            .key_bits(2048)
            .protection(Protection::fast())
            .build();
        assert_eq!(config.path, PathBuf::from("/tmp/other.ks"));
        assert_eq!(config.key_bits, 2048);
        assert_eq!(config.validity_days, DEFAULT_VALIDITY_DAYS);
        assert_eq!(config.protection, Protection::fast());
    }

    #[test]
    fn config_round_trips_through_serde() {
        let config = StoreConfig::builder().validity_days(30).build();
        let bytes = bincode::serialize(&config).unwrap();
        let decoded: StoreConfig = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, config);
    }
}
