//! Capability Service Configuration

use crate::cache::DEFAULT_STORAGE_KEY;
use std::path::PathBuf;

/// Environment variable overriding the profile directory
pub const ENV_PROFILE: &str = "FOS_WEBP_PROFILE";
/// Environment variable overriding the storage origin
pub const ENV_ORIGIN: &str = "FOS_WEBP_ORIGIN";
/// Environment variable overriding the storage key
pub const ENV_STORAGE_KEY: &str = "FOS_WEBP_STORAGE_KEY";

/// Capability service configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityConfig {
    /// Origin the capability record is scoped to
    pub origin: String,

    /// Storage key holding the JSON record
    pub storage_key: String,

    /// Profile directory for on-disk storage; `None` keeps results in memory
    pub profile_dir: Option<PathBuf>,
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost".to_string(),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            profile_dir: None,
        }
    }
}

impl CapabilityConfig {
    /// Defaults overridden by `FOS_WEBP_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(origin) = lookup(ENV_ORIGIN).filter(|v| !v.is_empty()) {
            config.origin = origin;
        }
        if let Some(key) = lookup(ENV_STORAGE_KEY).filter(|v| !v.is_empty()) {
            config.storage_key = key;
        }
        if let Some(dir) = lookup(ENV_PROFILE).filter(|v| !v.is_empty()) {
            config.profile_dir = Some(PathBuf::from(dir));
        }

        config
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    pub fn with_profile_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.profile_dir = Some(dir.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CapabilityConfig::default();
        assert_eq!(config.storage_key, DEFAULT_STORAGE_KEY);
        assert!(config.profile_dir.is_none());
    }

    #[test]
    fn test_lookup_overrides() {
        let config = CapabilityConfig::from_lookup(|name| match name {
            ENV_PROFILE => Some("/tmp/profile".to_string()),
            ENV_ORIGIN => Some("https://example.com".to_string()),
            ENV_STORAGE_KEY => Some(String::new()),
            _ => None,
        });

        assert_eq!(config.profile_dir, Some(PathBuf::from("/tmp/profile")));
        assert_eq!(config.origin, "https://example.com");
        assert_eq!(config.storage_key, DEFAULT_STORAGE_KEY);
    }
}
