//! Project-local Python environment discovery and activation.
//!
//! The monitor must run against the dependency set provisioned for the
//! install directory, never a global interpreter. Discovery therefore
//! fails hard when no environment is present; provisioning itself is
//! out of band (`python -m venv .venv` or `uv venv`).

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::debug;

/// Venv directory names probed under the install dir, in order.
const VENV_DIR_NAMES: &[&str] = &[".venv", "venv"];

/// Errors from environment discovery.
#[derive(Debug, Error)]
pub enum VenvError {
    #[error(
        "No virtual environment found in {0} (looked for .venv, venv). \
         Provision one: python -m venv .venv && .venv/bin/pip install -r requirements.txt"
    )]
    NotFound(PathBuf),

    #[error("Virtual environment {venv_dir} has no interpreter at {expected}")]
    MissingInterpreter { venv_dir: PathBuf, expected: PathBuf },
}

pub type Result<T> = std::result::Result<T, VenvError>;

/// Resolved environment handle: the venv directory and its interpreter.
#[derive(Debug, Clone)]
pub struct PythonEnv {
    pub venv_dir: PathBuf,
    pub interpreter: PathBuf,
}

impl PythonEnv {
    /// The venv's executable directory (`bin` on Unix, `Scripts` on Windows).
    pub fn bin_dir(&self) -> PathBuf {
        if cfg!(windows) {
            self.venv_dir.join("Scripts")
        } else {
            self.venv_dir.join("bin")
        }
    }

    /// Apply the activation environment to a command, equivalent to
    /// sourcing the venv's activate script: VIRTUAL_ENV set, the venv
    /// bin directory prepended to PATH, PYTHONHOME cleared.
    pub fn apply_to(&self, cmd: &mut Command) {
        cmd.env("VIRTUAL_ENV", &self.venv_dir);
        cmd.env("PATH", self.activation_path());
        cmd.env_remove("PYTHONHOME");
    }

    fn activation_path(&self) -> OsString {
        let mut path = self.bin_dir().into_os_string();
        if let Some(existing) = std::env::var_os("PATH") {
            path.push(if cfg!(windows) { ";" } else { ":" });
            path.push(existing);
        }
        path
    }
}

/// Locate the pre-provisioned virtual environment under `install_dir`.
///
/// This never creates an environment and never falls back to a system
/// interpreter; a deployment without a venv is a hard error.
pub fn discover(install_dir: &Path) -> Result<PythonEnv> {
    for name in VENV_DIR_NAMES {
        let venv_dir = install_dir.join(name);
        if !venv_dir.is_dir() {
            continue;
        }
        let env = PythonEnv {
            interpreter: interpreter_path(&venv_dir),
            venv_dir,
        };
        if !env.interpreter.is_file() {
            return Err(VenvError::MissingInterpreter {
                expected: env.interpreter,
                venv_dir: env.venv_dir,
            });
        }
        debug!("Using virtual environment: {}", env.venv_dir.display());
        return Ok(env);
    }
    Err(VenvError::NotFound(install_dir.to_path_buf()))
}

/// Interpreter path for a venv directory.
pub fn interpreter_path(venv_dir: &Path) -> PathBuf {
    if cfg!(windows) {
        venv_dir.join("Scripts/python.exe")
    } else {
        venv_dir.join("bin/python")
    }
}

/// Locate a system Python, for diagnostics only. The launcher never
/// runs the monitor with it.
pub fn system_python_hint() -> Option<PathBuf> {
    which::which("python3")
        .or_else(|_| which::which("python"))
        .ok()
}
