//! Persistent storage for the tunnel list.
//!
//! Tunnels are stored as an ordered array of `[[tunnel]]` tables in a TOML
//! file. Saving always replaces the whole file atomically (write to a sibling
//! temp file, then rename), so a partially written list is never observed.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::record::ConnectionRecord;

/// On-disk layout of the tunnels file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default, rename = "tunnel")]
    tunnels: Vec<ConnectionRecord>,
}

/// Loads and saves the ordered tunnel list.
#[derive(Debug, Clone)]
pub struct TunnelStore {
    path: PathBuf,
}

impl TunnelStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Default location: `<platform config dir>/burrow/tunnels.toml`.
    pub fn default_path() -> Result<PathBuf> {
        let base = dirs::config_dir().context("could not determine the user config directory")?;
        Ok(base.join("burrow").join("tunnels.toml"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the tunnel list in stored order. A missing file is an empty list.
    pub fn load(&self) -> Result<Vec<ConnectionRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let file: StoreFile = toml::from_str(&raw)
            .with_context(|| format!("failed to parse {}", self.path.display()))?;
        Ok(file.tunnels)
    }

    /// Replaces the stored list with `records`, preserving their order.
    pub fn save(&self, records: &[ConnectionRecord]) -> Result<()> {
        let file = StoreFile {
            tunnels: records.to_vec(),
        };
        let raw = toml::to_string_pretty(&file).context("failed to serialize tunnel list")?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let tmp = self.path.with_extension("toml.tmp");
        fs::write(&tmp, raw).with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    static TEST_DIR_SEQ: AtomicUsize = AtomicUsize::new(0);

    struct TempDir(PathBuf);

    impl TempDir {
        fn new() -> Self {
            let path = std::env::temp_dir().join(format!(
                "burrow-store-test-{}-{}",
                std::process::id(),
                TEST_DIR_SEQ.fetch_add(1, Ordering::SeqCst)
            ));
            fs::create_dir_all(&path).unwrap();
            TempDir(path)
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    fn records() -> Vec<ConnectionRecord> {
        vec![
            ConnectionRecord {
                name: "db".to_string(),
                local_port: 5432,
                remote_port: 5432,
                remote_address: "127.0.0.1".to_string(),
                server: "user@bastion".to_string(),
                url_template: "postgres://localhost:%p".to_string(),
            },
            ConnectionRecord {
                name: "web".to_string(),
                local_port: 8443,
                remote_port: 443,
                remote_address: "intranet".to_string(),
                server: "bastion".to_string(),
                url_template: "https://localhost:%p".to_string(),
            },
        ]
    }

    #[test]
    fn missing_file_loads_as_empty_list() {
        let dir = TempDir::new();
        let store = TunnelStore::new(dir.0.join("tunnels.toml"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn save_then_load_preserves_order_and_fields() {
        let dir = TempDir::new();
        let store = TunnelStore::new(dir.0.join("tunnels.toml"));
        let records = records();
        store.save(&records).unwrap();
        assert_eq!(store.load().unwrap(), records);
    }

    #[test]
    fn save_of_loaded_list_is_a_fixed_point() {
        let dir = TempDir::new();
        let store = TunnelStore::new(dir.0.join("tunnels.toml"));
        store.save(&records()).unwrap();
        let first = fs::read_to_string(store.path()).unwrap();
        store.save(&store.load().unwrap()).unwrap();
        let second = fs::read_to_string(store.path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn save_replaces_previous_contents() {
        let dir = TempDir::new();
        let store = TunnelStore::new(dir.0.join("tunnels.toml"));
        store.save(&records()).unwrap();
        store.save(&records()[..1]).unwrap();
        assert_eq!(store.load().unwrap().len(), 1);
    }

    #[test]
    fn parses_url_template_default() {
        let raw = r#"
[[tunnel]]
name = "db"
local_port = 5432
remote_port = 5432
remote_address = "127.0.0.1"
server = "bastion"
"#;
        let file: StoreFile = toml::from_str(raw).unwrap();
        assert_eq!(file.tunnels[0].url_template, "https://localhost:%p");
    }
}
