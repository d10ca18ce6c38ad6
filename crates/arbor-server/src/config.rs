use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use arbor_branch::EngineConfig;

use crate::error::{ServerError, ServerResult};

/// Server configuration, usually read from a TOML file.
///
/// ```toml
/// bind_addr = "0.0.0.0:7480"
/// data_dir = "/var/lib/arbor"
///
/// [engine]
/// watch_channel_capacity = 4096
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Root for blobs, patch logs and the branch directory. Everything is
    /// kept in memory when unset.
    pub data_dir: Option<PathBuf>,
    /// Answer cross-origin requests from any origin.
    pub cors: bool,
    pub engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 7480)),
            data_dir: None,
            cors: false,
            engine: EngineConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(text: &str) -> ServerResult<Self> {
        toml::from_str(text).map_err(|e| ServerError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> ServerResult<String> {
        toml::to_string_pretty(self).map_err(|e| ServerError::Config(e.to_string()))
    }
}
