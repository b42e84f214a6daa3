//! dicomon: launcher for the external DICOM monitor script.
//!
//! The launcher prepares an explicit launch context (install directory,
//! project-local Python environment), builds the monitor invocation from
//! configuration, and spawns the monitor as a detached background
//! process. It never supervises the child.

pub mod config;
pub mod context;
pub mod launch;
pub mod venv;

pub use config::{ConfigError, MonitorInvocation, MonitorOverrides};
pub use context::{ContextError, LaunchContext};
pub use launch::{spawn_monitor, DetachedChild, LaunchHistory, LaunchRecord};
pub use venv::{PythonEnv, VenvError};
