use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::protocol::{ConnectConfig, Endpoint, PoolOptions};

/// One named connection target in config.toml.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub endpoint: Endpoint,
    /// Pool shape for this profile; if missing, the global `[pool]` applies.
    #[serde(default)]
    pub pool: Option<PoolOptions>,
}

/// Global configuration loaded from `~/.config/rfp/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RfpConfig {
    /// Profile used when the CLI is not given `--profile`.
    #[serde(default)]
    pub default_profile: Option<String>,
    /// Pool shape for profiles that do not set their own.
    #[serde(default)]
    pub pool: PoolOptions,
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl RfpConfig {
    /// Resolves `name` (or the default profile) to a connect configuration.
    pub fn profile(&self, name: Option<&str>) -> Result<ConnectConfig> {
        let name = name
            .or(self.default_profile.as_deref())
            .ok_or_else(|| anyhow!("no profile given and no default_profile in config"))?;
        let profile = self.profiles.get(name).ok_or_else(|| {
            let known: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
            anyhow!("unknown profile '{}' (known: {})", name, known.join(", "))
        })?;
        Ok(ConnectConfig {
            endpoint: profile.endpoint.clone(),
            pool: profile.pool.unwrap_or(self.pool),
        })
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("rfp")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<RfpConfig> {
    load_or_init_at(&config_path()?)
}

pub fn load_or_init_at(path: &Path) -> Result<RfpConfig> {
    if !path.exists() {
        let default_cfg = RfpConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path)?;
    let cfg: RfpConfig = toml::from_str(&data)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = RfpConfig::default();
        assert!(cfg.default_profile.is_none());
        assert_eq!(cfg.pool.size, 2);
        assert!(cfg.pool.pooled_transfers);
        assert!(cfg.profiles.is_empty());
    }

    #[test]
    fn config_toml_profiles() {
        let toml = r#"
            default_profile = "mirror"

            [pool]
            size = 3

            [profiles.mirror.endpoint]
            protocol = "local"
            root = "/srv/mirror"

            [profiles.upstream.endpoint]
            protocol = "ftp"
            host = "ftp.example.org"

            [profiles.upstream.pool]
            size = 1
            pooled_transfers = false
        "#;
        let cfg: RfpConfig = toml::from_str(toml).unwrap();

        let mirror = cfg.profile(None).unwrap();
        assert_eq!(mirror.endpoint.protocol(), "local");
        assert_eq!(mirror.pool.size, 3);
        assert!(mirror.pool.pooled_transfers);

        let upstream = cfg.profile(Some("upstream")).unwrap();
        assert_eq!(upstream.endpoint.protocol(), "ftp");
        assert_eq!(upstream.pool.size, 1);
        assert!(!upstream.pool.pooled_transfers);
    }

    #[test]
    fn unknown_or_missing_profile_is_an_error() {
        let cfg = RfpConfig::default();
        assert!(cfg.profile(None).is_err());
        let err = cfg.profile(Some("nope")).unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn load_or_init_writes_defaults_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rfp").join("config.toml");
        let created = load_or_init_at(&path).unwrap();
        assert!(path.exists());
        let loaded = load_or_init_at(&path).unwrap();
        assert_eq!(created, loaded);
    }
}
