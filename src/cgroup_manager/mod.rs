//! Launching and reaping bot processes.
//!
//! On Linux a process can be placed in its own cgroup (v2) with a hard memory limit. Everywhere
//! else, or when no limit is requested, processes run uncontained.

#[cfg(target_os = "linux")]
mod cgroup_manager_linux;

#[cfg(target_os = "linux")]
pub use cgroup_manager_linux::*;

#[cfg(not(target_os = "linux"))]
mod cgroup_manager_stub;

#[cfg(not(target_os = "linux"))]
pub use cgroup_manager_stub::*;

use std::{
    path::Path,
    process::{Child, ExitStatus, Stdio},
    time::{Duration, Instant},
};

use anyhow::Context;

/// Spawn `command` in `cwd` with both output pipes captured and no stdin.
fn create_process(command: &str, args: &[String], cwd: &Path) -> anyhow::Result<Child> {
    std::process::Command::new(command)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("command '{command}' could not be started"))
}

/// Poll `child` until it exits or `max_duration` elapses.
fn wait_for_exit(child: &mut Child, max_duration: Duration) -> Option<ExitStatus> {
    let deadline = Instant::now() + max_duration;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Some(status),
            Ok(None) if Instant::now() < deadline => {
                std::thread::sleep(Duration::from_millis(10).min(max_duration / 10));
            }
            _ => return None,
        }
    }
}
