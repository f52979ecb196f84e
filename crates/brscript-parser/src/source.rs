//! Reading script files.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors reported by a [`SourceLoader`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("cannot read {path}: {reason}")]
    Io { path: String, reason: String },
}

/// Access to script files by resource path.
pub trait SourceLoader: Send + Sync {
    fn exists(&self, path: &str) -> bool;

    fn read_source(&self, path: &str) -> Result<String, LoadError>;

    fn read_binary(&self, path: &str) -> Result<Vec<u8>, LoadError>;
}

/// Loads `res://` paths from a directory on disk.
#[derive(Debug, Clone)]
pub struct FileSystemLoader {
    root: PathBuf,
}

impl FileSystemLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map a resource path onto the file system.
    pub fn resolve(&self, path: &str) -> PathBuf {
        match path.strip_prefix("res://") {
            Some(relative) => self.root.join(relative),
            None => Path::new(path).to_path_buf(),
        }
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, LoadError> {
        let file = self.resolve(path);
        if !file.exists() {
            return Err(LoadError::NotFound(path.to_string()));
        }
        std::fs::read(&file).map_err(|err| LoadError::Io {
            path: path.to_string(),
            reason: err.to_string(),
        })
    }
}

impl SourceLoader for FileSystemLoader {
    fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_file()
    }

    #[cfg_attr(feature = "profiling", profiling::function)]
    fn read_source(&self, path: &str) -> Result<String, LoadError> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes).map_err(|err| LoadError::Io {
            path: path.to_string(),
            reason: err.to_string(),
        })
    }

    #[cfg_attr(feature = "profiling", profiling::function)]
    fn read_binary(&self, path: &str) -> Result<Vec<u8>, LoadError> {
        self.read(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_resource_paths() {
        let loader = FileSystemLoader::new("/project");
        assert_eq!(loader.resolve("res://a/b.br"), PathBuf::from("/project/a/b.br"));
        assert_eq!(loader.resolve("/abs.br"), PathBuf::from("/abs.br"));
    }

    #[test]
    fn missing_file_is_not_found() {
        let loader = FileSystemLoader::new(std::env::temp_dir());
        assert_eq!(
            loader.read_source("res://definitely_missing_script_4821.br"),
            Err(LoadError::NotFound(
                "res://definitely_missing_script_4821.br".to_string()
            ))
        );
    }
}
