//! caseai-server configuration
//!
//! Assembled from the TOML file plus command-line/environment overrides.

use caseai_common::config::{
    database_path, resolve_root_folder, DatabaseSection, FeedSection, ProviderSection,
    ResponderSection, TomlConfig, ROOT_FOLDER_ENV,
};
use caseai_common::{Error, Result};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub root_folder: PathBuf,
    pub db_path: PathBuf,
    pub database: DatabaseSection,
    pub feed: FeedSection,
    pub providers: ProviderSection,
    pub responder: ResponderSection,
}

impl Config {
    /// Merge TOML settings with overrides (CLI/env win over the file)
    pub fn resolve(
        toml: TomlConfig,
        port_override: Option<u16>,
        root_override: Option<&Path>,
    ) -> Result<Self> {
        let root_folder = resolve_root_folder(root_override, ROOT_FOLDER_ENV, &toml);
        let port = port_override.unwrap_or(toml.server.port);
        let bind_addr: SocketAddr = format!("{}:{}", toml.server.host, port)
            .parse()
            .map_err(|e| Error::Config(format!("invalid bind address: {}", e)))?;

        Ok(Self {
            bind_addr,
            db_path: database_path(&root_folder),
            root_folder,
            database: toml.database,
            feed: toml.feed,
            providers: toml.providers,
            responder: toml.responder,
        })
    }

    /// Defaults rooted at `root_folder`, used by tests and embedding
    pub fn for_root(root_folder: &Path) -> Self {
        let toml = TomlConfig::default();
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], toml.server.port)),
            root_folder: root_folder.to_path_buf(),
            db_path: database_path(root_folder),
            database: toml.database,
            feed: toml.feed,
            providers: toml.providers,
            responder: toml.responder,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_apply() {
        let config = Config::resolve(
            TomlConfig::default(),
            Some(6123),
            Some(Path::new("/tmp/caseai-test-root")),
        )
        .unwrap();
        assert_eq!(config.bind_addr.port(), 6123);
        assert_eq!(config.db_path, PathBuf::from("/tmp/caseai-test-root/caseai.db"));
    }

    #[test]
    fn test_bad_host_is_config_error() {
        let mut toml = TomlConfig::default();
        toml.server.host = "not a host".to_string();
        let err = Config::resolve(toml, None, Some(Path::new("/tmp"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
