//! Persistent sync configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.worklog/
//!   config.yaml   (mode 0600, directory mode 0700)
//! ```
//!
//! # API pattern
//!
//! Every entry point has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Tests must NEVER call the no-arg wrappers; always use `_at`.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::types::{ConfigPatch, SyncConfig};

pub const CONFIG_FILE: &str = "config.yaml";

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.worklog/`: pure, no I/O.
pub fn worklog_root(home: &Path) -> PathBuf {
    home.join(".worklog")
}

/// `<home>/.worklog/config.yaml`: pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    worklog_root(home).join(CONFIG_FILE)
}

// ---------------------------------------------------------------------------
// 2. Store
// ---------------------------------------------------------------------------

/// In-memory view of the persisted [`SyncConfig`].
///
/// The store never rejects an invalid config: validation only decides
/// whether a schedule gets armed.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    current: SyncConfig,
}

impl ConfigStore {
    /// Load `<home>/.worklog/config.yaml`, falling back to defaults when absent.
    ///
    /// Returns `ConfigError::Parse` (with path + line context) if malformed YAML.
    pub fn load_at(home: &Path) -> Result<Self, ConfigError> {
        let path = config_path_at(home);
        let current = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?
        } else {
            SyncConfig::default()
        };
        Ok(Self { path, current })
    }

    /// `load_at` convenience wrapper.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_at(&home()?)
    }

    pub fn get(&self) -> SyncConfig {
        self.current.clone()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Merge `patch` over the current config, persist it, and return the new value.
    pub fn update(&mut self, patch: ConfigPatch) -> Result<SyncConfig, ConfigError> {
        let mut next = self.current.clone();
        next.apply(patch);
        save_at(&self.path, &next)?;
        self.current = next;
        Ok(self.current.clone())
    }
}

// ---------------------------------------------------------------------------
// 3. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically write `config` to `path`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
fn save_at(path: &Path, config: &SyncConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        if !dir.exists() {
            std::fs::create_dir_all(dir)?;
            set_dir_permissions(dir)?;
        }
    }
    let tmp_path = path.with_extension("yaml.tmp");

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
