//! Tree configuration
//!
//! A tree's shape is fixed at construction: its height, the value of an
//! empty leaf and the hash function. The configuration is kept as JSON next
//! to the store it describes.

use crate::hasher::{Blake3Hasher, Sha256Hasher, TreeHasher};
use crate::model::LeafValue;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Smallest supported height: a root with two leaves
pub const MIN_HEIGHT: usize = 2;
/// Largest supported height: 2^256 leaves
pub const MAX_HEIGHT: usize = 257;

/// Which hash function a tree uses
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HasherKind {
    #[default]
    Blake3,
    Sha256,
}

impl HasherKind {
    /// Instantiate the hasher
    pub fn build(&self) -> Box<dyn TreeHasher> {
        match self {
            HasherKind::Blake3 => Box::new(Blake3Hasher),
            HasherKind::Sha256 => Box::new(Sha256Hasher),
        }
    }
}

impl std::str::FromStr for HasherKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "blake3" => Ok(HasherKind::Blake3),
            "sha256" => Ok(HasherKind::Sha256),
            other => Err(Error::Config(format!("Unknown hasher: {}", other))),
        }
    }
}

/// Shape of a tree
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Number of levels, root and leaves included
    pub height: usize,
    /// Value of a leaf that was never written
    #[serde(with = "hex::serde", default = "default_empty_leaf")]
    pub empty_leaf: LeafValue,
    /// Hash function
    #[serde(default)]
    pub hasher: HasherKind,
}

fn default_empty_leaf() -> LeafValue {
    [0u8; 32]
}

impl TreeConfig {
    /// Config with the given height, a zero empty leaf and BLAKE3
    pub fn new(height: usize) -> Self {
        TreeConfig {
            height,
            empty_leaf: default_empty_leaf(),
            hasher: HasherKind::default(),
        }
    }

    pub fn with_empty_leaf(mut self, empty_leaf: LeafValue) -> Self {
        self.empty_leaf = empty_leaf;
        self
    }

    pub fn with_hasher(mut self, hasher: HasherKind) -> Self {
        self.hasher = hasher;
        self
    }

    /// Check that the height is in range
    pub fn validate(&self) -> Result<()> {
        if !(MIN_HEIGHT..=MAX_HEIGHT).contains(&self.height) {
            return Err(Error::InvalidHeight(self.height));
        }
        Ok(())
    }

    /// Load the config stored next to `store_path`
    pub fn load(store_path: &Path) -> Result<Self> {
        let config_path = Self::config_path(store_path);
        if !config_path.exists() {
            return Err(Error::Config(format!(
                "No tree config at {}",
                config_path.display()
            )));
        }
        let content = std::fs::read_to_string(&config_path)?;
        let config: TreeConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save the config next to `store_path`
    pub fn save(&self, store_path: &Path) -> Result<()> {
        self.validate()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(Self::config_path(store_path), content)?;
        Ok(())
    }

    /// Get the config file path for a store
    pub fn config_path(store_path: &Path) -> PathBuf {
        let mut config_path = store_path.to_path_buf();
        let file_name = store_path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "tree.smt".to_string());
        config_path.set_file_name(format!("{}.config", file_name));
        config_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_validate_height() {
        assert!(TreeConfig::new(1).validate().is_err());
        assert!(TreeConfig::new(2).validate().is_ok());
        assert!(TreeConfig::new(257).validate().is_ok());
        assert!(matches!(
            TreeConfig::new(258).validate(),
            Err(Error::InvalidHeight(258))
        ));
    }

    #[test]
    fn test_save_load() {
        let dir = tempdir().unwrap();
        let store_path = dir.path().join("tree.smt");

        let config = TreeConfig::new(33)
            .with_empty_leaf([0xEEu8; 32])
            .with_hasher(HasherKind::Sha256);
        config.save(&store_path).unwrap();
        assert!(dir.path().join("tree.smt.config").exists());

        let loaded = TreeConfig::load(&store_path).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_json_defaults() {
        let config: TreeConfig = serde_json::from_str(r#"{"height": 5}"#).unwrap();
        assert_eq!(config, TreeConfig::new(5));

        let json = serde_json::to_value(TreeConfig::new(5)).unwrap();
        assert_eq!(json["hasher"], "blake3");
        assert_eq!(json["empty_leaf"], "0".repeat(64));
    }

    #[test]
    fn test_hasher_kind_parse() {
        assert_eq!("SHA256".parse::<HasherKind>().unwrap(), HasherKind::Sha256);
        assert_eq!(HasherKind::Blake3.build().name(), "blake3");
        assert!("md5".parse::<HasherKind>().is_err());
    }
}
