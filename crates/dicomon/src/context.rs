//! Launch context resolution.
//!
//! The launcher must behave the same no matter where it is invoked
//! from, so the install directory is resolved once into an explicit
//! `LaunchContext` and threaded into everything downstream instead of
//! relying on ambient shell state.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors from resolving or entering the launch context.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Failed to resolve the running executable's path: {0}")]
    ExePath(#[source] std::io::Error),

    #[error("Executable path {0} has no parent directory")]
    NoParent(PathBuf),

    #[error("Install directory {0} does not exist or is not a directory")]
    NotADirectory(PathBuf),

    #[error("Failed to canonicalize {path}: {source}")]
    Canonicalize {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to change working directory to {path}: {source}")]
    Chdir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ContextError>;

/// Explicit launch context: the directory the launcher (and the monitor
/// deployment alongside it) is installed in.
#[derive(Debug, Clone)]
pub struct LaunchContext {
    pub install_dir: PathBuf,
}

impl LaunchContext {
    /// Resolve the context from the running executable's own location.
    ///
    /// There is no fallback: if the OS cannot report the executable
    /// path, the launch is aborted.
    pub fn resolve() -> Result<Self> {
        let exe = std::env::current_exe().map_err(ContextError::ExePath)?;
        let exe = canonicalize(&exe)?;
        let install_dir = exe
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| ContextError::NoParent(exe.clone()))?;
        debug!("Resolved install dir from executable: {}", install_dir.display());
        Ok(Self { install_dir })
    }

    /// Build the context from an explicit directory (`--install-dir`).
    pub fn from_dir(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(ContextError::NotADirectory(dir.to_path_buf()));
        }
        let install_dir = canonicalize(dir)?;
        Ok(Self { install_dir })
    }

    /// Make the install directory the process working directory.
    ///
    /// Every relative path used afterward (venv discovery, default
    /// settings/log locations, the monitor's own relative paths)
    /// resolves against it.
    pub fn enter(&self) -> Result<()> {
        std::env::set_current_dir(&self.install_dir).map_err(|source| ContextError::Chdir {
            path: self.install_dir.clone(),
            source,
        })
    }
}

fn canonicalize(path: &Path) -> Result<PathBuf> {
    path.canonicalize().map_err(|source| ContextError::Canonicalize {
        path: path.to_path_buf(),
        source,
    })
}
