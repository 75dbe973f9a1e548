use std::{
    path::Path,
    process::{Child, ExitStatus},
    time::{Duration, Instant},
};

use anyhow::{self, Context};
use cgroups_rs::Cgroup;
use tracing::warn;

use super::{create_process, wait_for_exit};

fn get_current_user_id() -> anyhow::Result<String> {
    let output = std::process::Command::new("id")
        .arg("-u")
        .output()
        .context("Could not launch 'id -u'")?;
    let stdout = output.stdout;
    let untrimed_id = std::str::from_utf8(&stdout).context("id is not a valid string")?;
    Ok(untrimed_id.trim().to_string())
}

fn get_cgroup_path(user_id: &str, group_name: &str) -> String {
    format!("user.slice/user-{user_id}.slice/user@{user_id}.service/{group_name}")
}

/// Create a cgroup at `path` with a hard memory limit (bytes) and a cap on the number of pids.
fn create_cgroup(path: &str, max_memory: i64, max_pids: i64) -> anyhow::Result<Cgroup> {
    let mut builder = cgroups_rs::cgroup_builder::CgroupBuilder::new(path);
    if max_memory > 0 {
        builder = builder.memory().memory_hard_limit(max_memory).done();
    }
    if max_pids > 0 {
        builder = builder
            .pid()
            .maximum_number_of_processes(cgroups_rs::MaxValue::Value(max_pids))
            .done();
    }
    builder
        .build(cgroups_rs::hierarchies::auto())
        .context("could not create cgroup")
}

fn wait_for_process_cleanup(cgroup: &Cgroup, pid: u64, max_duration: Duration) -> bool {
    let deadline = Instant::now() + max_duration;
    while cgroup.tasks().iter().any(|cpid| cpid.pid == pid) {
        if Instant::now() > deadline {
            return false;
        }
        std::thread::sleep(std::cmp::min(Duration::from_millis(10), max_duration / 10));
    }
    true
}

/// A child process, optionally confined to its own cgroup.
///
/// The process is killed and reaped on drop if it was not before.
#[derive(Debug)]
pub struct LimitedProcess {
    pub child: Child,
    cgroup: Option<Cgroup>,
    cleaned_up: bool,
}

impl LimitedProcess {
    /// Launch `command` inside a fresh cgroup limited to `max_memory` bytes.
    pub fn launch(
        command: &str,
        args: &[String],
        cwd: &Path,
        max_memory: i64,
    ) -> anyhow::Result<LimitedProcess> {
        static COUNTER: std::sync::atomic::AtomicU32 = std::sync::atomic::AtomicU32::new(1);
        let user_id = get_current_user_id().context("could not get user id")?;
        let group_name = format!(
            "BOT_ARENA_{}_{}",
            std::process::id(),
            COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
        );
        let path = get_cgroup_path(&user_id, &group_name);
        let group = create_cgroup(&path, max_memory, 100)?;

        let mut child = match create_process(command, args, cwd) {
            Ok(child) => child,
            Err(e) => {
                let _ = group.delete();
                return Err(e);
            }
        };
        let pid = child.id() as u64;
        if let Err(e) = group.add_task_by_tgid(cgroups_rs::CgroupPid { pid }) {
            let _ = child.kill();
            let _ = child.wait();
            let _ = group.delete();
            return Err(e).context("could not add process to cgroup");
        }

        Ok(LimitedProcess {
            child,
            cgroup: Some(group),
            cleaned_up: false,
        })
    }

    pub fn launch_without_container(
        command: &str,
        args: &[String],
        cwd: &Path,
    ) -> anyhow::Result<LimitedProcess> {
        let child = create_process(command, args, cwd)?;
        Ok(LimitedProcess {
            child,
            cgroup: None,
            cleaned_up: false,
        })
    }

    pub fn is_contained(&self) -> bool {
        self.cgroup.is_some()
    }

    /// Wait up to `max_duration` for the process to exit on its own.
    pub fn wait(&mut self, max_duration: Duration) -> Option<ExitStatus> {
        let status = wait_for_exit(&mut self.child, max_duration)?;
        self.release_cgroup();
        self.cleaned_up = true;
        Some(status)
    }

    /// Kill the process (and everything in its cgroup) and reap it.
    pub fn try_kill(&mut self, max_duration: Duration) -> anyhow::Result<()> {
        match &self.cgroup {
            Some(cgroup) => {
                cgroup.kill().context("could not kill process")?;
                if !wait_for_process_cleanup(cgroup, self.child.id() as u64, max_duration) {
                    anyhow::bail!("process cleanup timed out");
                }
            }
            None => {
                // already exited is fine
                let _ = self.child.kill();
            }
        }
        self.child.wait().context("could not reap process")?;
        self.release_cgroup();
        self.cleaned_up = true;
        Ok(())
    }

    fn release_cgroup(&mut self) {
        if let Some(cgroup) = self.cgroup.take() {
            if let Err(e) = cgroup.delete() {
                warn!("Failed to remove cgroup. If this happens a lot, it may slow down the computer. {e}");
            }
        }
    }
}

impl Drop for LimitedProcess {
    fn drop(&mut self) {
        static CLEANUP_DURATION: Duration = Duration::from_secs(1);
        if !self.cleaned_up {
            if let Err(e) = self.try_kill(CLEANUP_DURATION) {
                warn!("could not kill process {} on drop: {e:#}", self.child.id());
            }
        }
    }
}
