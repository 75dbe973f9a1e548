use std::{fs::File, path::Path};

use anyhow::Context;
use time::{
    format_description::{self, parse},
    OffsetDateTime,
};
use tracing::{subscriber::set_global_default, Level};
use tracing_subscriber::{fmt::writer::BoxMakeWriter, FmtSubscriber};

/// Send every trace event to a timestamped file in `directory`.
///
/// Fails if a global subscriber is already installed.
pub fn init_logger(directory: &Path) -> anyhow::Result<()> {
    let file_name = directory.join(get_log_file_name()?);
    let file = File::create(&file_name)
        .with_context(|| format!("could not create log file {}", file_name.display()))?;
    let writer = BoxMakeWriter::new(file);
    let local_offset = time::UtcOffset::current_local_offset().unwrap_or(time::UtcOffset::UTC);
    let timer = tracing_subscriber::fmt::time::OffsetTime::new(
        local_offset,
        format_description::parse("[year]-[month]-[day] [hour]:[minute]:[second]")?,
    );

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::TRACE)
        .with_ansi(false)
        .with_timer(timer)
        .with_writer(writer)
        .finish();

    set_global_default(subscriber).context(
        "Could not set global default tracing subscriber. Consider disabling logs if you are already setting a subscriber.",
    )
}

fn get_log_file_name() -> anyhow::Result<String> {
    let format = parse("[year]-[month]-[day]_[hour]-[minute]-[second]_engine_log.txt")?;
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    Ok(now.format(&format)?)
}
