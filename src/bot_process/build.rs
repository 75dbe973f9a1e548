use std::{path::Path, time::Duration};

use anyhow::{bail, Context};
use serde::Deserialize;
use tracing::{error, instrument, warn};

use super::output::{join_within, spawn_drain, SharedOutput};
use crate::cgroup_manager::LimitedProcess;

/// File describing how to build and run a bot, at the root of its directory.
pub const COMMANDS_FILE: &str = "commands.json";

/// Content of [`COMMANDS_FILE`]: `{"build": [...], "run": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BotCommands {
    pub build: Vec<String>,
    pub run: Vec<String>,
}

pub fn load_commands(dir: &Path) -> anyhow::Result<BotCommands> {
    let path = dir.join(COMMANDS_FILE);
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("{COMMANDS_FILE} not found in '{}'", dir.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{COMMANDS_FILE} misformatted"))
}

/// Run `build` in `dir`, capturing its output, killing it after `timeout`.
///
/// A build that exits with an error is only reported: the bot may still run.
#[instrument(skip(output))]
pub fn run_build(
    dir: &Path,
    build: &[String],
    timeout: Duration,
    output: &SharedOutput,
) -> anyhow::Result<()> {
    let Some((program, args)) = build.split_first() else {
        return Ok(());
    };

    let mut process = LimitedProcess::launch_without_container(program, args, dir)
        .context("build failed - check \"build\" in commands.json")?;
    let drains = [
        process
            .child
            .stdout
            .take()
            .and_then(|out| spawn_drain(out, output.clone(), "build-stdout")),
        process
            .child
            .stderr
            .take()
            .and_then(|err| spawn_drain(err, output.clone(), "build-stderr")),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>();

    match process.wait(timeout) {
        Some(status) => {
            join_within(drains, Duration::from_secs(1));
            if !status.success() {
                warn!("build exited with {status}");
            }
            Ok(())
        }
        None => {
            if let Err(e) = process.try_kill(Duration::from_secs(1)) {
                error!("could not kill build: {e:#}");
            }
            join_within(drains, Duration::from_millis(100));
            bail!("Timed out after {timeout:?} waiting for build")
        }
    }
}
