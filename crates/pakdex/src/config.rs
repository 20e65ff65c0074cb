//! Application configuration
//!
//! Persisted as TOML under the Pakdex home directory. Every field has a
//! default so configs written by older versions keep loading.

use anyhow::{Context, Result};
use pakdex_index::FormatConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One persisted watch root declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedRoot {
    pub path: String,
    #[serde(default)]
    pub recursive: bool,
}

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PakdexConfig {
    /// Directories kept synchronized with the index.
    #[serde(default)]
    pub watched_directories: Vec<WatchedRoot>,

    /// Remote device addresses, most recently used first.
    #[serde(default = "default_remote_hosts")]
    pub remote_hosts: Vec<String>,

    /// Remote FTP ports, most recently used first.
    #[serde(default = "default_remote_ports")]
    pub remote_ports: Vec<u16>,

    /// User-provided release group tags.
    #[serde(default)]
    pub release_groups: Vec<String>,

    /// User-provided release tags.
    #[serde(default)]
    pub releases: Vec<String>,

    /// Where the metadata store lives.
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
}

fn default_remote_hosts() -> Vec<String> {
    vec!["127.0.0.1".to_string()]
}

fn default_remote_ports() -> Vec<u16> {
    vec![1337, 2121]
}

fn default_store_path() -> PathBuf {
    pakdex_logging::pakdex_home().join("metadata.jsonl")
}

impl Default for PakdexConfig {
    fn default() -> Self {
        Self {
            watched_directories: Vec::new(),
            remote_hosts: default_remote_hosts(),
            remote_ports: default_remote_ports(),
            release_groups: Vec::new(),
            releases: Vec::new(),
            store_path: default_store_path(),
        }
    }
}

impl PakdexConfig {
    /// Default on-disk location: ~/.pakdex/config.toml
    pub fn default_path() -> PathBuf {
        pakdex_logging::pakdex_home().join("config.toml")
    }

    /// Load configuration from a TOML file; a missing file is the default
    /// configuration.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to render config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config {}", path.display()))?;
        Ok(())
    }

    /// The formatter snapshot derived from this configuration.
    pub fn format_config(&self) -> FormatConfig {
        FormatConfig::with_user_tags(&self.release_groups, &self.releases)
    }

    /// Declare (or update) a watched directory.
    pub fn add_watched_directory(&mut self, path: String, recursive: bool) {
        if let Some(existing) = self
            .watched_directories
            .iter_mut()
            .find(|root| root.path == path)
        {
            existing.recursive = recursive;
            return;
        }
        self.watched_directories.push(WatchedRoot { path, recursive });
    }

    /// Remove a watched directory. Returns whether one was removed.
    pub fn remove_watched_directory(&mut self, path: &str) -> bool {
        let before = self.watched_directories.len();
        self.watched_directories.retain(|root| root.path != path);
        self.watched_directories.len() != before
    }

    /// Make a host the new default by swapping it to the front of the list.
    pub fn promote_host(&mut self, host: &str) {
        promote(&mut self.remote_hosts, &host.to_string());
    }

    /// Make a port the new default by swapping it to the front of the list.
    pub fn promote_port(&mut self, port: u16) {
        promote(&mut self.remote_ports, &port);
    }
}

fn promote<T: PartialEq + Clone>(items: &mut [T], chosen: &T) {
    if let Some(position) = items.iter().position(|item| item == chosen) {
        items.swap(0, position);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PakdexConfig::default();
        assert_eq!(config.remote_hosts, ["127.0.0.1"]);
        assert_eq!(config.remote_ports, [1337, 2121]);
        assert!(config.watched_directories.is_empty());
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = PakdexConfig::default();
        config.add_watched_directory("/data/pkgs".to_string(), true);
        config.release_groups.push("NEWGROUP".to_string());
        config.save(&path).unwrap();

        let loaded = PakdexConfig::load(&path).unwrap();
        assert_eq!(loaded.watched_directories.len(), 1);
        assert!(loaded.watched_directories[0].recursive);
        assert_eq!(loaded.release_groups, ["NEWGROUP"]);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = PakdexConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.remote_hosts, ["127.0.0.1"]);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "release_groups = [\"X\"]\n").unwrap();

        let config = PakdexConfig::load(&path).unwrap();
        assert_eq!(config.release_groups, ["X"]);
        assert_eq!(config.remote_hosts, ["127.0.0.1"]);
        assert_eq!(config.remote_ports, [1337, 2121]);
    }

    #[test]
    fn test_add_watched_directory_updates_in_place() {
        let mut config = PakdexConfig::default();
        config.add_watched_directory("/data".to_string(), false);
        config.add_watched_directory("/data".to_string(), true);
        assert_eq!(config.watched_directories.len(), 1);
        assert!(config.watched_directories[0].recursive);

        assert!(config.remove_watched_directory("/data"));
        assert!(!config.remove_watched_directory("/data"));
    }

    #[test]
    fn test_promote_host_swaps_to_front() {
        let mut config = PakdexConfig::default();
        config.remote_hosts = vec!["a".into(), "b".into(), "c".into()];
        config.promote_host("c");
        assert_eq!(config.remote_hosts, ["c", "b", "a"]);

        config.promote_port(2121);
        assert_eq!(config.remote_ports, [2121, 1337]);
    }
}
