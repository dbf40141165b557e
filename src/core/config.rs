//! Configuration management with layered hierarchy
//!
//! Layers, lowest priority first: built-in defaults, the global user config
//! (`<config dir>/prjindex/config.yaml`), the library-local config
//! (`<library>/.pm_system/config.yaml`) and environment variables.

use std::fs;
use std::path::{Path, PathBuf};

use miette::{IntoDiagnostic, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::catalog::ResourceKind;
use crate::core::error::LibraryError;
use crate::core::layout::SYSTEM_DIR;

/// Current on-disk config document version
pub const CONFIG_VERSION: u32 = 2;

pub const DEFAULT_SEARCH_LIMIT: usize = 200;
pub const DEFAULT_REBUILD_BATCH_SIZE: usize = 10;

/// Effective configuration after all layers are merged
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Library root holding the `YYYY-MM` month directories
    pub library_root: Option<PathBuf>,

    /// Roots scanned for inspection report folders
    pub inspection_roots: Vec<PathBuf>,

    /// Roots scanned for generic shared-drive folders
    pub shared_drive_roots: Vec<PathBuf>,

    /// Tags offered when tagging projects
    pub preset_tags: Vec<String>,

    /// Default maximum number of search results
    pub search_limit: usize,

    /// Projects per commit during a rebuild
    pub rebuild_batch_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            library_root: None,
            inspection_roots: Vec::new(),
            shared_drive_roots: Vec::new(),
            preset_tags: Vec::new(),
            search_limit: DEFAULT_SEARCH_LIMIT,
            rebuild_batch_size: DEFAULT_REBUILD_BATCH_SIZE,
        }
    }
}

/// One configuration layer as stored in YAML. Every field is optional so a
/// layer only overrides what it sets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub version: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub library_root: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub inspection_roots: Option<Vec<PathBuf>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared_drive_roots: Option<Vec<PathBuf>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset_tags: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_limit: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rebuild_batch_size: Option<usize>,

    /// Version 1 single-root field, migrated into `inspection_roots`
    #[serde(skip_serializing)]
    inspection_root: Option<String>,

    /// Version 1 single-root field, migrated into `shared_drive_roots`
    #[serde(skip_serializing)]
    shared_drive_root: Option<String>,
}

impl ConfigFile {
    /// Read and migrate a layer. A missing file is an empty layer.
    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path).into_diagnostic()?;
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let file: ConfigFile = serde_yml::from_str(&contents).into_diagnostic()?;
        Ok(file.migrate())
    }

    /// Write the layer at the current version, creating parent directories
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).into_diagnostic()?;
        }
        let mut doc = self.clone().migrate();
        doc.version = Some(CONFIG_VERSION);
        let yaml = serde_yml::to_string(&doc).into_diagnostic()?;
        fs::write(path, yaml).into_diagnostic()?;
        Ok(())
    }

    /// Fold version 1 single-root strings into the list fields
    pub fn migrate(mut self) -> Self {
        if self.version.unwrap_or(1) >= CONFIG_VERSION {
            self.inspection_root = None;
            self.shared_drive_root = None;
            return self;
        }

        if let Some(root) = self.inspection_root.take().filter(|s| !s.trim().is_empty()) {
            let roots = self.inspection_roots.get_or_insert_with(Vec::new);
            let root = PathBuf::from(root.trim());
            if !roots.contains(&root) {
                debug!("migrating inspection_root {:?} into inspection_roots", root);
                roots.insert(0, root);
            }
        }
        if let Some(root) = self.shared_drive_root.take().filter(|s| !s.trim().is_empty()) {
            let roots = self.shared_drive_roots.get_or_insert_with(Vec::new);
            let root = PathBuf::from(root.trim());
            if !roots.contains(&root) {
                debug!("migrating shared_drive_root {:?} into shared_drive_roots", root);
                roots.insert(0, root);
            }
        }
        self.version = Some(CONFIG_VERSION);
        self
    }
}

impl Config {
    /// Load configuration from all sources, merging in priority order.
    ///
    /// `library_override` (the `--library` flag) wins over every layer.
    pub fn load(library_override: Option<&Path>) -> Self {
        let env_library = std::env::var("PRJINDEX_LIBRARY")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);
        Self::load_layers(
            Self::global_config_path().as_deref(),
            env_library,
            library_override,
        )
    }

    /// Layer merge with explicit sources
    pub fn load_layers(
        global_path: Option<&Path>,
        env_library: Option<PathBuf>,
        library_override: Option<&Path>,
    ) -> Self {
        // 1. Built-in defaults
        let mut config = Config::default();

        // 2. Global user config
        if let Some(path) = global_path {
            config.merge(read_layer(path));
        }

        // The library root decides where the library-local layer lives
        let library_root = library_override
            .map(Path::to_path_buf)
            .or_else(|| env_library.clone())
            .or_else(|| config.library_root.clone());

        // 3. Library-local config
        if let Some(root) = &library_root {
            config.merge(read_layer(&root.join(SYSTEM_DIR).join("config.yaml")));
        }

        // 4. Environment variables
        if let Some(root) = env_library {
            config.library_root = Some(root);
        }

        if let Some(root) = library_override {
            config.library_root = Some(root.to_path_buf());
        }

        config
    }

    /// Path of the global config file. `PRJINDEX_CONFIG_DIR` relocates it.
    pub fn global_config_path() -> Option<PathBuf> {
        if let Ok(dir) = std::env::var("PRJINDEX_CONFIG_DIR") {
            if !dir.trim().is_empty() {
                return Some(PathBuf::from(dir).join("config.yaml"));
            }
        }
        directories::ProjectDirs::from("", "", "prjindex")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Merge another layer into this one (other takes precedence)
    fn merge(&mut self, other: ConfigFile) {
        if other.library_root.is_some() {
            self.library_root = other.library_root;
        }
        if let Some(roots) = other.inspection_roots {
            self.inspection_roots = roots;
        }
        if let Some(roots) = other.shared_drive_roots {
            self.shared_drive_roots = roots;
        }
        if let Some(tags) = other.preset_tags {
            self.preset_tags = tags;
        }
        if let Some(limit) = other.search_limit {
            self.search_limit = limit.max(1);
        }
        if let Some(size) = other.rebuild_batch_size {
            self.rebuild_batch_size = size.max(1);
        }
    }

    /// Scan roots configured for a resource family
    pub fn roots_for(&self, kind: ResourceKind) -> &[PathBuf] {
        match kind {
            ResourceKind::Inspection => &self.inspection_roots,
            ResourceKind::SharedFolder => &self.shared_drive_roots,
        }
    }

    /// The configured library root, or an error explaining how to set one
    pub fn library_root(&self) -> Result<PathBuf> {
        match &self.library_root {
            Some(root) if root.is_dir() => Ok(root.clone()),
            Some(root) => Err(LibraryError::LibraryRootMissing(root.clone()).into()),
            None => Err(LibraryError::LibraryRootMissing(PathBuf::new()).into()),
        }
    }
}

fn read_layer(path: &Path) -> ConfigFile {
    match ConfigFile::read(path) {
        Ok(layer) => layer,
        Err(e) => {
            warn!("ignoring unreadable config {}: {}", path.display(), e);
            ConfigFile::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_without_layers() {
        let config = Config::load_layers(None, None, None);
        assert_eq!(config, Config::default());
        assert_eq!(config.rebuild_batch_size, 10);
    }

    #[test]
    fn test_version_one_migration() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("config.yaml");
        fs::write(
            &path,
            "inspection_root: /mnt/reports\nshared_drive_root: /mnt/share\npreset_tags: [urgent]\n",
        )
        .unwrap();

        let layer = ConfigFile::read(&path).unwrap();
        assert_eq!(layer.version, Some(CONFIG_VERSION));
        assert_eq!(
            layer.inspection_roots,
            Some(vec![PathBuf::from("/mnt/reports")])
        );
        assert_eq!(
            layer.shared_drive_roots,
            Some(vec![PathBuf::from("/mnt/share")])
        );

        layer.write(&path).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("inspection_roots"));
        assert!(!written.contains("inspection_root:"));
        assert!(written.contains("version: 2"));
    }

    #[test]
    fn test_migration_does_not_duplicate_roots() {
        let layer: ConfigFile = serde_yml::from_str(
            "inspection_root: /a\ninspection_roots: [/a, /b]\n",
        )
        .unwrap();
        let layer = layer.migrate();
        assert_eq!(
            layer.inspection_roots,
            Some(vec![PathBuf::from("/a"), PathBuf::from("/b")])
        );
    }

    #[test]
    fn test_layer_precedence() {
        let tmp = tempdir().unwrap();
        let library = tmp.path().join("lib");
        fs::create_dir_all(library.join(SYSTEM_DIR)).unwrap();

        let global = tmp.path().join("global.yaml");
        ConfigFile {
            library_root: Some(library.clone()),
            inspection_roots: Some(vec![PathBuf::from("/global")]),
            search_limit: Some(50),
            ..Default::default()
        }
        .write(&global)
        .unwrap();

        ConfigFile {
            inspection_roots: Some(vec![PathBuf::from("/local")]),
            ..Default::default()
        }
        .write(&library.join(SYSTEM_DIR).join("config.yaml"))
        .unwrap();

        let config = Config::load_layers(Some(&global), None, None);
        assert_eq!(config.library_root, Some(library.clone()));
        assert_eq!(config.inspection_roots, vec![PathBuf::from("/local")]);
        assert_eq!(config.search_limit, 50);

        let other = tmp.path().join("other");
        let config = Config::load_layers(Some(&global), Some(other.clone()), None);
        assert_eq!(config.library_root, Some(other));
        assert_eq!(config.inspection_roots, vec![PathBuf::from("/global")]);
    }

    #[test]
    fn test_missing_library_root_is_error() {
        let config = Config::default();
        let err = config.library_root().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LibraryError>(),
            Some(LibraryError::LibraryRootMissing(_))
        ));
    }
}
