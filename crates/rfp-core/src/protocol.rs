//! Connect configuration and the protocol registry.
//!
//! An [`Endpoint`] names its protocol; the client looks that name up in its
//! [`ProtocolRegistry`] at connect time and calls the factory once per pooled
//! connection.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::bail;
use serde::{Deserialize, Serialize};

use crate::connection::{Connection, ConnectionContext, LocalConnection};

fn default_ftp_port() -> u16 {
    21
}

fn default_sftp_port() -> u16 {
    22
}

/// Where to connect. Serialized with a `protocol` tag, e.g.
/// `{ protocol = "local", root = "/srv/files" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum Endpoint {
    Ftp {
        host: String,
        #[serde(default = "default_ftp_port")]
        port: u16,
        #[serde(default)]
        user: Option<String>,
        #[serde(default)]
        password: Option<String>,
        #[serde(default)]
        secure: bool,
    },
    Sftp {
        host: String,
        #[serde(default = "default_sftp_port")]
        port: u16,
        #[serde(default)]
        user: Option<String>,
        #[serde(default)]
        password: Option<String>,
        #[serde(default)]
        key_path: Option<PathBuf>,
    },
    Local {
        root: PathBuf,
    },
    /// Any protocol registered by the embedding application.
    Custom {
        name: String,
        #[serde(default)]
        options: BTreeMap<String, String>,
    },
}

impl Endpoint {
    /// Registry key for this endpoint.
    pub fn protocol(&self) -> &str {
        match self {
            Endpoint::Ftp { .. } => "ftp",
            Endpoint::Sftp { .. } => "sftp",
            Endpoint::Local { .. } => "local",
            Endpoint::Custom { name, .. } => name.as_str(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Ftp { host, port, .. } => write!(f, "ftp://{}:{}", host, port),
            Endpoint::Sftp { host, port, .. } => write!(f, "sftp://{}:{}", host, port),
            Endpoint::Local { root } => write!(f, "local:{}", root.display()),
            Endpoint::Custom { name, .. } => write!(f, "{}:", name),
        }
    }
}

fn default_pool_size() -> usize {
    2
}

fn default_pooled_transfers() -> bool {
    true
}

/// Pool shape: how many connections, and whether transfers get their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolOptions {
    #[serde(default = "default_pool_size")]
    pub size: usize,
    #[serde(default = "default_pooled_transfers")]
    pub pooled_transfers: bool,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            size: default_pool_size(),
            pooled_transfers: default_pooled_transfers(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectConfig {
    pub endpoint: Endpoint,
    #[serde(default)]
    pub pool: PoolOptions,
}

impl ConnectConfig {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            pool: PoolOptions::default(),
        }
    }

    pub fn with_pool(mut self, size: usize, pooled_transfers: bool) -> Self {
        self.pool = PoolOptions {
            size,
            pooled_transfers,
        };
        self
    }
}

/// Builds one connection for the pool.
pub type ProtocolFactory =
    Arc<dyn Fn(&ConnectConfig, ConnectionContext) -> anyhow::Result<Arc<dyn Connection>> + Send + Sync>;

/// Protocol name -> connection factory. Owned by one client.
#[derive(Clone, Default)]
pub struct ProtocolRegistry {
    factories: HashMap<String, ProtocolFactory>,
}

impl fmt::Debug for ProtocolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolRegistry")
            .field("protocols", &self.names())
            .finish()
    }
}

impl ProtocolRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in `local` strategy.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("local", local_factory);
        registry
    }

    /// Adds or replaces the factory for `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&ConnectConfig, ConnectionContext) -> anyhow::Result<Arc<dyn Connection>>
            + Send
            + Sync
            + 'static,
    {
        let name = name.into();
        if self.factories.insert(name.clone(), Arc::new(factory)).is_some() {
            tracing::debug!(protocol = %name, "protocol factory replaced");
        }
    }

    pub fn get(&self, name: &str) -> Option<ProtocolFactory> {
        self.factories.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered protocol names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Factory for [`Endpoint::Local`].
pub fn local_factory(
    config: &ConnectConfig,
    ctx: ConnectionContext,
) -> anyhow::Result<Arc<dyn Connection>> {
    match &config.endpoint {
        Endpoint::Local { root } => Ok(Arc::new(LocalConnection::new(root.clone(), ctx))),
        other => bail!("local protocol cannot serve endpoint {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::Group;
    use crate::pool::ConnectionEvents;

    fn ctx() -> ConnectionContext {
        ConnectionContext {
            index: 0,
            group: Group::All,
            events: ConnectionEvents::detached(0),
        }
    }

    #[test]
    fn endpoint_toml_uses_protocol_tag() {
        let toml = r#"
            [endpoint]
            protocol = "sftp"
            host = "files.example.org"
            user = "deploy"

            [pool]
            size = 4
        "#;
        let cfg: ConnectConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.endpoint.protocol(), "sftp");
        assert_eq!(cfg.pool.size, 4);
        assert!(cfg.pool.pooled_transfers);
        match cfg.endpoint {
            Endpoint::Sftp { port, user, .. } => {
                assert_eq!(port, 22);
                assert_eq!(user.as_deref(), Some("deploy"));
            }
            other => panic!("expected sftp endpoint, got {:?}", other),
        }
    }

    #[test]
    fn custom_endpoint_reports_its_name() {
        let toml = r#"
            [endpoint]
            protocol = "custom"
            name = "webdav"
            options = { url = "https://dav.example.org" }
        "#;
        let cfg: ConnectConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.endpoint.protocol(), "webdav");
        assert_eq!(cfg.pool, PoolOptions::default());
    }

    #[test]
    fn registry_register_replace_and_lookup() {
        let mut registry = ProtocolRegistry::new();
        assert!(registry.get("local").is_none());
        registry.register("local", local_factory);
        registry.register("local", local_factory);
        assert_eq!(registry.names(), vec!["local".to_string()]);
        assert!(ProtocolRegistry::with_builtin().contains("local"));
    }

    #[test]
    fn local_factory_rejects_other_endpoints() {
        let cfg = ConnectConfig::new(Endpoint::Ftp {
            host: "h".into(),
            port: 21,
            user: None,
            password: None,
            secure: false,
        });
        assert!(local_factory(&cfg, ctx()).is_err());
        let cfg = ConnectConfig::new(Endpoint::Local { root: "/tmp".into() });
        assert_eq!(local_factory(&cfg, ctx()).unwrap().protocol(), "local");
    }
}
