//! Script source lookup

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::error::{BridgeError, BridgeResult};

/// Supplies script source by module name
pub trait ModuleSource: Send + Sync {
    /// Source text of `module`
    fn read(&self, module: &str) -> BridgeResult<String>;
}

/// Ordered list of directories; the first one containing the file wins
#[derive(Debug, Clone)]
pub struct SearchPath {
    dirs: Vec<PathBuf>,
}

impl SearchPath {
    /// Search path over `dirs`; at least one directory is required
    pub fn new<I, P>(dirs: I) -> BridgeResult<Self>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let dirs: Vec<PathBuf> = dirs.into_iter().map(Into::into).collect();
        if dirs.is_empty() {
            return Err(BridgeError::Config(
                "at least one search directory is required".to_string(),
            ));
        }
        Ok(Self { dirs })
    }

    /// Directories, in search order
    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Path of the first existing `file`
    pub fn find(&self, file: &str) -> Option<PathBuf> {
        self.dirs
            .iter()
            .map(|dir| dir.join(file))
            .find(|path| path.is_file())
    }

    fn not_found(&self, file: &str) -> BridgeError {
        BridgeError::ModuleNotFound {
            file: file.to_string(),
            dirs: self.dirs.iter().map(|d| d.display().to_string()).collect(),
        }
    }
}

impl ModuleSource for SearchPath {
    fn read(&self, module: &str) -> BridgeResult<String> {
        for dir in &self.dirs {
            let path = dir.join(module);
            match fs::read_to_string(&path) {
                Ok(source) => {
                    trace!(path = %path.display(), "read script");
                    return Ok(source);
                }
                Err(e) if is_missing(&e, &path) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(self.not_found(module))
    }
}

fn is_missing(err: &io::Error, path: &Path) -> bool {
    err.kind() == io::ErrorKind::NotFound || path.is_dir()
}
