use std::{
    path::Path,
    process::{Child, ExitStatus},
    time::Duration,
};

use anyhow::{self, bail, Context};
use tracing::warn;

use super::{create_process, wait_for_exit};

#[derive(Debug)]
pub struct LimitedProcess {
    pub child: Child,
    cleaned_up: bool,
}

impl LimitedProcess {
    pub fn launch(
        _command: &str,
        _args: &[String],
        _cwd: &Path,
        _max_memory: i64,
    ) -> anyhow::Result<LimitedProcess> {
        bail!("cgroups only available on linux")
    }

    pub fn launch_without_container(
        command: &str,
        args: &[String],
        cwd: &Path,
    ) -> anyhow::Result<LimitedProcess> {
        let child = create_process(command, args, cwd)?;
        Ok(LimitedProcess {
            child,
            cleaned_up: false,
        })
    }

    pub fn is_contained(&self) -> bool {
        false
    }

    pub fn wait(&mut self, max_duration: Duration) -> Option<ExitStatus> {
        let status = wait_for_exit(&mut self.child, max_duration)?;
        self.cleaned_up = true;
        Some(status)
    }

    pub fn try_kill(&mut self, _max_duration: Duration) -> anyhow::Result<()> {
        let _ = self.child.kill();
        self.child.wait().context("could not reap process")?;
        self.cleaned_up = true;
        Ok(())
    }
}

impl Drop for LimitedProcess {
    fn drop(&mut self) {
        if !self.cleaned_up {
            if let Err(e) = self.try_kill(Duration::from_secs(1)) {
                warn!("could not kill process {} on drop: {e:#}", self.child.id());
            }
        }
    }
}
