// ABOUTME: Configuration types and parsing for shipwright.yml.
// ABOUTME: Selects the store backend and the paths used by stores and migration.

use crate::error::{Error, Result};
use crate::store::StoreKind;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONFIG_FILENAME: &str = "shipwright.yml";
pub const CONFIG_FILENAME_ALT: &str = "shipwright.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".shipwright/config.yml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Which backend to use and where each backend keeps its data.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub kind: StoreKind,

    /// Directory for the file backend, and the migration source.
    #[serde(default = "default_directory")]
    pub directory: PathBuf,

    /// Database file for the database backend, and the migration target.
    #[serde(default = "default_database")]
    pub database: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::default(),
            directory: default_directory(),
            database: default_database(),
        }
    }
}

fn default_directory() -> PathBuf {
    PathBuf::from(".shipwright/deployments")
}

fn default_database() -> PathBuf {
    PathBuf::from(".shipwright/deployments.db")
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MigrationConfig {
    /// Default for `migrate` when `--dry-run` is not given.
    #[serde(default)]
    pub dry_run: bool,
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // An empty document means "all defaults".
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).map_err(Error::from)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&content)?;
        if let Some(base) = config_root(path) {
            config.resolve_paths(&base);
        }
        Ok(config)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    /// Make relative store paths relative to `base` instead of the process cwd.
    pub fn resolve_paths(&mut self, base: &Path) {
        if self.store.directory.is_relative() {
            self.store.directory = base.join(&self.store.directory);
        }
        if self.store.database.is_relative() {
            self.store.database = base.join(&self.store.database);
        }
    }
}

/// Directory relative paths in a config file are resolved against. For
/// `.shipwright/config.yml` that is the project root, not `.shipwright/`.
fn config_root(path: &Path) -> Option<PathBuf> {
    let parent = path.parent()?;
    if parent.file_name().is_some_and(|name| name == ".shipwright") {
        parent.parent().map(Path::to_path_buf)
    } else {
        Some(parent.to_path_buf())
    }
}

pub fn init_config(dir: &Path, force: bool) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    std::fs::write(&config_path, template_yaml(&StoreConfig::default()))?;
    Ok(())
}

fn template_yaml(store: &StoreConfig) -> String {
    format!(
        r#"store:
  # file | database
  kind: {}
  directory: {}
  database: {}
migration:
  dry_run: false
"#,
        store.kind,
        store.directory.display(),
        store.database.display()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_round_trips() {
        let yaml = template_yaml(&StoreConfig::default());
        let config = Config::from_yaml(&yaml).unwrap();
        assert_eq!(config.store.kind, StoreKind::File);
        assert_eq!(config.store.directory, default_directory());
        assert!(!config.migration.dry_run);
    }

    #[test]
    fn dot_dir_config_resolves_against_project_root() {
        assert_eq!(
            config_root(Path::new("/srv/app/.shipwright/config.yml")),
            Some(PathBuf::from("/srv/app"))
        );
        assert_eq!(
            config_root(Path::new("/srv/app/shipwright.yml")),
            Some(PathBuf::from("/srv/app"))
        );
    }
}
