// Asset source - named binary blobs
//
// The engine only ever asks for two blobs (the compiled vertex and fragment
// shaders), by name, while building the pipeline.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Where the engine fetches shader bytecode from.
pub trait AssetSource: Send + Sync {
    /// Load the named asset fully into memory.
    fn load_binary_asset(&self, name: &str) -> Result<Vec<u8>>;
}

/// Assets laid out under a directory on disk, names are relative paths.
#[derive(Debug, Clone)]
pub struct AssetDir {
    root: PathBuf,
}

impl AssetDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl AssetSource for AssetDir {
    fn load_binary_asset(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.root.join(name);
        let bytes = std::fs::read(&path)
            .with_context(|| format!("Failed to load asset '{}' from {:?}", name, path))?;

        log::debug!("Loaded asset '{}' ({} bytes)", name, bytes.len());
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_nested_asset_by_relative_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("shaders")).unwrap();
        std::fs::write(dir.path().join("shaders/shader.vert.spv"), [3u8, 2, 35, 7]).unwrap();

        let assets = AssetDir::new(dir.path());
        let bytes = assets.load_binary_asset("shaders/shader.vert.spv").unwrap();

        assert_eq!(bytes, vec![3, 2, 35, 7]);
    }

    #[test]
    fn missing_asset_reports_its_name() {
        let dir = tempfile::tempdir().unwrap();
        let assets = AssetDir::new(dir.path());

        let err = assets.load_binary_asset("shaders/missing.frag.spv").unwrap_err();

        assert!(format!("{:#}", err).contains("shaders/missing.frag.spv"));
    }
}
