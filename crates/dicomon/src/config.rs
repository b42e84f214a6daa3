//! Monitor invocation configuration.
//!
//! The original deployment hard-coded the settings and log paths into
//! the launcher; here they are externally supplied. Precedence:
//! CLI flag / env var > `dicomon.toml` in the install dir > defaults
//! relative to the install dir. The defaults mirror what the monitor
//! itself assumes when run from its own directory.

use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Companion config file name, looked up in the install directory.
pub const CONFIG_FILE_NAME: &str = "dicomon.toml";

const DEFAULT_SCRIPT: &str = "dicom_monitor.py";
const DEFAULT_SETTINGS: &str = "custom/settings.json";
const DEFAULT_LOGDIR: &str = "logs";

/// Error type for config operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Monitor script not found: {0}")]
    ScriptNotFound(PathBuf),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// `[monitor]` section of dicomon.toml.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct MonitorConfigRaw {
    /// Monitor script path (default: dicom_monitor.py in the install dir)
    #[serde(default)]
    script: Option<PathBuf>,

    /// Settings file passed as --settings
    #[serde(default)]
    settings: Option<PathBuf>,

    /// Log directory passed as --logdir
    #[serde(default)]
    logdir: Option<PathBuf>,

    /// Extra arguments forwarded to the monitor after the fixed pairs
    #[serde(default)]
    extra_args: Vec<String>,
}

/// Root config structure that may contain a [monitor] section
#[derive(Debug, Clone, Default, Deserialize)]
struct RootConfig {
    #[serde(default)]
    monitor: Option<MonitorConfigRaw>,
}

/// Overrides supplied on the command line or via environment variables.
#[derive(Debug, Clone, Default)]
pub struct MonitorOverrides {
    pub script: Option<PathBuf>,
    pub settings: Option<PathBuf>,
    pub logdir: Option<PathBuf>,
    pub extra_args: Vec<String>,
}

/// The fully resolved child invocation contract.
///
/// The argument list always begins `<script> --settings <path>
/// --logdir <path>`, in that order; `extra_args` follow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorInvocation {
    pub script: PathBuf,
    pub settings: PathBuf,
    pub logdir: PathBuf,
    pub extra_args: Vec<String>,
}

impl MonitorInvocation {
    /// Merge overrides, the optional config file, and defaults into the
    /// final invocation. Relative paths resolve against `install_dir`.
    pub fn resolve(install_dir: &Path, overrides: &MonitorOverrides) -> Result<Self> {
        let file = load_config_file(&install_dir.join(CONFIG_FILE_NAME))?;

        let script = overrides
            .script
            .clone()
            .or(file.script)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SCRIPT));
        let settings = overrides
            .settings
            .clone()
            .or(file.settings)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS));
        let logdir = overrides
            .logdir
            .clone()
            .or(file.logdir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOGDIR));
        let extra_args = if overrides.extra_args.is_empty() {
            file.extra_args
        } else {
            overrides.extra_args.clone()
        };

        Ok(Self {
            script: resolve_against(install_dir, script),
            settings: resolve_against(install_dir, settings),
            logdir: resolve_against(install_dir, logdir),
            extra_args,
        })
    }

    /// Fail fast if the monitor script itself is missing. The settings
    /// file and log directory are the monitor's to interpret.
    pub fn validate(&self) -> Result<()> {
        if !self.script.is_file() {
            return Err(ConfigError::ScriptNotFound(self.script.clone()));
        }
        Ok(())
    }

    /// The literal argument list handed to the interpreter.
    pub fn argv(&self) -> Vec<OsString> {
        let mut argv: Vec<OsString> = vec![
            self.script.clone().into(),
            "--settings".into(),
            self.settings.clone().into(),
            "--logdir".into(),
            self.logdir.clone().into(),
        ];
        argv.extend(self.extra_args.iter().map(OsString::from));
        argv
    }
}

fn resolve_against(install_dir: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        install_dir.join(path)
    }
}

fn load_config_file(path: &Path) -> Result<MonitorConfigRaw> {
    if !path.exists() {
        return Ok(MonitorConfigRaw::default());
    }
    let content = std::fs::read_to_string(path)?;
    let root: RootConfig = toml::from_str(&content)?;
    Ok(root.monitor.unwrap_or_default())
}
