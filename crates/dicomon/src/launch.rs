//! Detached monitor spawn and launch history.
//!
//! The spawn is fire-and-forget: the launcher creates the child,
//! records its pid, and releases ownership of its lifecycle. There is
//! no join point, no cancellation, and no liveness assumption; the
//! child must survive the launcher's exit.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{info, warn};

use crate::config::MonitorInvocation;
use crate::venv::PythonEnv;

/// Maximum number of launch records kept in the history file.
const MAX_HISTORY_ENTRIES: usize = 50;

#[cfg(windows)]
const DETACHED_PROCESS: u32 = 0x0000_0008;
#[cfg(windows)]
const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

/// Handle-less result of a detached spawn.
///
/// Holds the pid for reporting only. Dropping it does nothing to the
/// child; there is deliberately no way to wait on or kill the process
/// from here.
#[derive(Debug, Clone, Copy)]
pub struct DetachedChild {
    pub pid: u32,
}

/// Spawn the monitor as a detached background process.
///
/// The child runs the venv interpreter on the monitor script with the
/// fixed argument list, inherits `cwd` as its working directory and the
/// activation environment, and is placed in its own process group so it
/// outlives the launcher and ignores its terminal signals. Success
/// means the OS accepted the process creation; nothing beyond that is
/// checked.
pub fn spawn_monitor(
    env: &PythonEnv,
    invocation: &MonitorInvocation,
    cwd: &Path,
) -> Result<DetachedChild> {
    let mut cmd = Command::new(&env.interpreter);
    cmd.args(invocation.argv())
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    env.apply_to(&mut cmd);

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        cmd.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
    }

    let child = cmd.spawn().with_context(|| {
        format!(
            "Failed to spawn monitor. Interpreter: {}, Script: {}",
            env.interpreter.display(),
            invocation.script.display()
        )
    })?;

    let pid = child.id();
    // Dropping the handle releases ownership without killing the child.
    drop(child);

    info!(
        "Spawned monitor (pid={}) using interpreter {}",
        pid,
        env.interpreter.display()
    );

    Ok(DetachedChild { pid })
}

/// One recorded spawn event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchRecord {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub interpreter: PathBuf,
    pub script: PathBuf,
    pub settings: PathBuf,
    pub logdir: PathBuf,
}

impl LaunchRecord {
    pub fn new(child: DetachedChild, env: &PythonEnv, invocation: &MonitorInvocation) -> Self {
        Self {
            pid: child.pid,
            started_at: Utc::now(),
            interpreter: env.interpreter.clone(),
            script: invocation.script.clone(),
            settings: invocation.settings.clone(),
            logdir: invocation.logdir.clone(),
        }
    }
}

/// Bounded append-only record of spawns. This is bookkeeping for
/// operators, not supervision: entries are never checked against live
/// processes.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LaunchHistory {
    pub entries: Vec<LaunchRecord>,
}

impl LaunchHistory {
    /// Append a record, pruning the oldest entries beyond the cap.
    pub fn push(&mut self, record: LaunchRecord) {
        self.entries.push(record);
        if self.entries.len() > MAX_HISTORY_ENTRIES {
            let excess = self.entries.len() - MAX_HISTORY_ENTRIES;
            self.entries.drain(..excess);
        }
    }

    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("Failed to parse launch history: {}", e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save atomically: write to a temp file, then rename over the
    /// destination, so a crash never leaves a half-written history.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, &json)
            .with_context(|| format!("Failed to write {}", temp_path.display()))?;
        std::fs::rename(&temp_path, path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }
}

/// Default history location: ~/.dicomon/launches.json
pub fn default_history_path() -> PathBuf {
    dicomon_logging::dicomon_home().join("launches.json")
}

/// Best-effort history update after a successful spawn. A history
/// failure must never fail a launch whose child is already running.
pub fn record_launch(path: &Path, record: LaunchRecord) {
    let mut history = LaunchHistory::load(path);
    history.push(record);
    if let Err(e) = history.save(path) {
        warn!("Failed to record launch in {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record_with_pid(pid: u32) -> LaunchRecord {
        LaunchRecord {
            pid,
            started_at: Utc::now(),
            interpreter: PathBuf::from(".venv/bin/python"),
            script: PathBuf::from("dicom_monitor.py"),
            settings: PathBuf::from("custom/settings.json"),
            logdir: PathBuf::from("logs"),
        }
    }

    #[test]
    fn test_history_prunes_oldest() {
        let mut history = LaunchHistory::default();
        for pid in 0..(MAX_HISTORY_ENTRIES as u32 + 5) {
            history.push(record_with_pid(pid));
        }
        assert_eq!(history.entries.len(), MAX_HISTORY_ENTRIES);
        assert_eq!(history.entries.first().unwrap().pid, 5);
        assert_eq!(
            history.entries.last().unwrap().pid,
            MAX_HISTORY_ENTRIES as u32 + 4
        );
    }

    #[test]
    fn test_history_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("launches.json");

        let mut history = LaunchHistory::default();
        history.push(record_with_pid(4242));
        history.save(&path).unwrap();

        let loaded = LaunchHistory::load(&path);
        assert_eq!(loaded.entries.len(), 1);
        assert_eq!(loaded.entries[0].pid, 4242);
        // No temp file left behind after the atomic replace.
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_history_load_tolerates_garbage() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("launches.json");
        std::fs::write(&path, "not json").unwrap();
        let loaded = LaunchHistory::load(&path);
        assert!(loaded.entries.is_empty());
    }

    #[test]
    fn test_spawn_missing_interpreter_fails() {
        let temp = TempDir::new().unwrap();
        let env = PythonEnv {
            venv_dir: temp.path().join(".venv"),
            interpreter: temp.path().join(".venv/bin/python"),
        };
        let invocation = MonitorInvocation {
            script: temp.path().join("dicom_monitor.py"),
            settings: temp.path().join("custom/settings.json"),
            logdir: temp.path().join("logs"),
            extra_args: vec![],
        };

        let err = spawn_monitor(&env, &invocation, temp.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to spawn monitor"));
    }

    /// The launcher must return before the child exits, and the child
    /// must receive the fixed argument list.
    #[cfg(unix)]
    #[test]
    fn test_spawn_is_detached_and_argv_ordered() {
        use std::os::unix::fs::PermissionsExt;
        use std::time::{Duration, Instant};

        let temp = TempDir::new().unwrap();
        let argv_out = temp.path().join("argv.txt");

        // Stub interpreter: record argv, then outlive the spawn call.
        let stub = temp.path().join(".venv/bin/python");
        std::fs::create_dir_all(stub.parent().unwrap()).unwrap();
        std::fs::write(
            &stub,
            format!("#!/bin/sh\necho \"$@\" > '{}'\nsleep 2\n", argv_out.display()),
        )
        .unwrap();
        std::fs::set_permissions(&stub, std::fs::Permissions::from_mode(0o755)).unwrap();

        let env = PythonEnv {
            venv_dir: temp.path().join(".venv"),
            interpreter: stub,
        };
        let invocation = MonitorInvocation {
            script: temp.path().join("dicom_monitor.py"),
            settings: temp.path().join("custom/settings.json"),
            logdir: temp.path().join("logs"),
            extra_args: vec![],
        };

        let start = Instant::now();
        let child = spawn_monitor(&env, &invocation, temp.path()).unwrap();
        assert!(
            start.elapsed() < Duration::from_secs(1),
            "spawn must not wait for the child"
        );
        assert!(child.pid > 0);

        // The child is still running; poll for its argv dump.
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Ok(content) = std::fs::read_to_string(&argv_out) {
                if !content.is_empty() {
                    let expected = format!(
                        "{} --settings {} --logdir {}",
                        invocation.script.display(),
                        invocation.settings.display(),
                        invocation.logdir.display()
                    );
                    assert_eq!(content.trim_end(), expected);
                    break;
                }
            }
            assert!(Instant::now() < deadline, "child never wrote its argv");
            std::thread::sleep(Duration::from_millis(50));
        }
    }
}
