use std::{
    fmt::Debug,
    fs,
    path::{Path, PathBuf},
    time::SystemTime,
};

use anyhow::{bail, Context};
use tracing::{info, instrument, warn};

use crate::{bot_process::COMMANDS_FILE, configuration::Configuration};

/// A bot directory taking part in a tournament.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bot {
    pub name: String,
    pub path: PathBuf,
}

impl Bot {
    /// Modification time of the most recently changed file of the bot, if it has any.
    pub fn newest_modification(&self) -> Option<SystemTime> {
        newest_file_mtime(&self.path)
    }
}

fn newest_file_mtime(dir: &Path) -> Option<SystemTime> {
    let entries = fs::read_dir(dir).ok()?;
    entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let metadata = entry.metadata().ok()?;
            if metadata.is_dir() {
                newest_file_mtime(&entry.path())
            } else {
                metadata.modified().ok()
            }
        })
        .max()
}

/// Every subdirectory of `directory` is a bot named after it. Sorted by name.
#[instrument(skip(config))]
pub fn collect_bots(
    directory: impl AsRef<Path> + Debug,
    config: Configuration,
) -> anyhow::Result<Vec<Bot>> {
    const RED: &str = "\x1b[31m";
    const GREEN: &str = "\x1b[32m";
    const YELLOW: &str = "\x1b[33m";
    const RESET: &str = "\x1b[0m";

    let directory = directory.as_ref();
    if !directory.is_dir() {
        bail!("'{}' is not a valid directory", directory.display());
    }

    let mut bots = Vec::new();
    let entries = fs::read_dir(directory)
        .with_context(|| format!("could not read '{}'", directory.display()))?;
    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        let Ok(name) = entry.file_name().into_string() else {
            warn!("name error: {:?}", entry.file_name());
            continue;
        };
        if !path.is_dir() {
            continue;
        }
        if name.contains('.') {
            // dots separate the parts of output file names
            warn!("Bot name contains a dot: '{name}'");
            if config.verbose {
                println!("{RED}Skipping '{name}': bot names cannot contain dots{RESET}");
            }
            continue;
        }
        if !path.join(COMMANDS_FILE).is_file() {
            warn!("'{name}' has no {COMMANDS_FILE}, it will not be able to play");
            if config.verbose {
                println!("{YELLOW}'{name}' has no {COMMANDS_FILE}{RESET}");
            }
        }
        bots.push(Bot { name, path });
    }
    bots.sort_by(|a, b| a.name.cmp(&b.name));

    info!(bots = ?bots.iter().map(|b| &b.name).collect::<Vec<_>>());
    if config.verbose {
        println!("{GREEN}Collected {} bots{RESET}", bots.len());
    }
    Ok(bots)
}
