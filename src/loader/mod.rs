//! Module discovery for bootstrap dynamic loading.
//!
//! The decoder and CPU never touch the file system; a [`ModuleLoader`]
//! resolves an ordinal index to the raw bytes of a module.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no module with ordinal {ordinal} ({available} available)")]
    OrdinalOutOfRange { ordinal: usize, available: usize },
    #[error("failed to read {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

/// Resolves an ordinal index to a concrete module's raw bytes.
pub trait ModuleLoader {
    fn resolve(&self, ordinal: usize) -> Result<Vec<u8>, LoadError>;
}

/// Loader over the `*.wasm` files of one directory, ordered by file name.
pub struct DirLoader {
    paths: Vec<PathBuf>,
}

impl DirLoader {
    /// Scan a directory for `.wasm` files.
    pub fn new(dir: &Path) -> Result<Self, LoadError> {
        let entries = std::fs::read_dir(dir).map_err(|source| LoadError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "wasm"))
            .collect();
        paths.sort();
        debug!(count = paths.len(), dir = %dir.display(), "module search path");
        Ok(DirLoader { paths })
    }
}

impl ModuleLoader for DirLoader {
    fn resolve(&self, ordinal: usize) -> Result<Vec<u8>, LoadError> {
        let path = self
            .paths
            .get(ordinal)
            .ok_or(LoadError::OrdinalOutOfRange {
                ordinal,
                available: self.paths.len(),
            })?;
        debug!(ordinal, path = %path.display(), "resolved module");
        std::fs::read(path).map_err(|source| LoadError::Io {
            path: path.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_by_sorted_ordinal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.wasm"), b"second").unwrap();
        std::fs::write(dir.path().join("a.wasm"), b"first").unwrap();
        std::fs::write(dir.path().join("ignored.txt"), b"no").unwrap();

        let loader = DirLoader::new(dir.path()).unwrap();
        assert_eq!(loader.resolve(0).unwrap(), b"first");
        assert_eq!(loader.resolve(1).unwrap(), b"second");
        assert!(matches!(
            loader.resolve(2),
            Err(LoadError::OrdinalOutOfRange {
                ordinal: 2,
                available: 2
            })
        ));
    }
}
