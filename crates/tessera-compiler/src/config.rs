// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for the tessera compiler.

use std::path::PathBuf;

use crate::native::DEFAULT_SCATTER_CHUNK_SIZE;

/// Compiler configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Root of the directory-backed platform
    pub platform_dir: PathBuf,
    /// User every platform call is made as
    pub user: String,
    /// Batch size for scatters of unknown length
    pub scatter_chunk_size: usize,
    /// Runtime asset attached to every applet
    pub runtime_asset: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let platform_dir =
            PathBuf::from(var("TESSERA_PLATFORM_DIR").unwrap_or_else(|| ".data/platform".to_string()));

        let user = var("TESSERA_USER")
            .or_else(|| var("USER"))
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| "anonymous".to_string());

        let scatter_chunk_size = match var("TESSERA_SCATTER_CHUNK_SIZE") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidNumber("TESSERA_SCATTER_CHUNK_SIZE", raw))?,
            None => DEFAULT_SCATTER_CHUNK_SIZE,
        };

        let runtime_asset = var("TESSERA_RUNTIME_ASSET").filter(|a| !a.is_empty());

        Ok(Self {
            platform_dir,
            user,
            scatter_chunk_size,
            runtime_asset,
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A numeric variable does not parse.
    #[error("Invalid number in {0}: '{1}'")]
    InvalidNumber(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.platform_dir, PathBuf::from(".data/platform"));
        assert_eq!(config.user, "anonymous");
        assert_eq!(config.scatter_chunk_size, DEFAULT_SCATTER_CHUNK_SIZE);
        assert_eq!(config.runtime_asset, None);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("USER", "carol"),
            ("TESSERA_SCATTER_CHUNK_SIZE", "25"),
            ("TESSERA_RUNTIME_ASSET", "record-123"),
        ]))
        .unwrap();
        assert_eq!(config.user, "carol");
        assert_eq!(config.scatter_chunk_size, 25);
        assert_eq!(config.runtime_asset.as_deref(), Some("record-123"));

        let config = Config::from_lookup(lookup(&[("USER", "carol"), ("TESSERA_USER", "dave")])).unwrap();
        assert_eq!(config.user, "dave");
    }

    #[test]
    fn test_invalid_chunk_size() {
        let err = Config::from_lookup(lookup(&[("TESSERA_SCATTER_CHUNK_SIZE", "many")])).unwrap_err();
        assert!(err.to_string().contains("TESSERA_SCATTER_CHUNK_SIZE"));
    }
}
