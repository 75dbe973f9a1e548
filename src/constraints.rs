//! Time, size and memory limits applied to bots.
//!
//! # Overview
//!
//! The main entry point is the [`ConstraintsBuilder`] struct, which uses a builder pattern
//! to configure limits:
//!
//! - **Game clock**: total response time a bot may spend over a whole match
//! - **Setup timeouts**: how long a build may run, how long a bot has to connect, and how long it
//!   has to exit once told goodbye
//! - **Output cap**: bytes of build and runtime output kept per bot
//! - **Memory**: optional hard RAM limit per bot, applied through Linux cgroups v2
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use bot_arena::constraints::ConstraintsBuilder;
//!
//! let constraints = ConstraintsBuilder::new()
//!     .with_game_clock(Duration::from_secs(60))
//!     .with_connect_timeout(Duration::from_secs(5))
//!     .with_ram_per_bot(500)
//!     .build()
//!     .unwrap();
//! ```
//!
//! You may also construct constraints from environment variables using
//! [`ConstraintsBuilder::from_env()`].

use std::{env, time::Duration};

use anyhow::bail;

/// A builder for the limits applied to every bot of a match.
///
/// Every limit has a default; see [`ConstraintsBuilder::build`].
#[derive(Debug, Default)]
pub struct ConstraintsBuilder {
    game_clock: Option<Duration>,
    build_timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    disconnect_timeout: Option<Duration>,
    output_limit: Option<usize>,
    ram_per_bot: Option<usize>,
}

impl ConstraintsBuilder {
    /// Creates a new `ConstraintsBuilder` with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new `ConstraintsBuilder` configured from environment variables.
    ///
    /// Read environment variables are:
    /// - `GAME_CLOCK_SECS` (f64): starting game clock of each bot
    /// - `BUILD_TIMEOUT_SECS` (u64): maximum duration of a build
    /// - `CONNECT_TIMEOUT_SECS` (u64): time a bot has to connect back
    /// - `DISCONNECT_TIMEOUT_SECS` (u64): time a bot has to exit after goodbye
    /// - `BOT_OUTPUT_LIMIT` (usize): bytes of output kept per bot
    /// - `RAM_PER_BOT` (usize): maximum RAM per bot in MB
    #[must_use]
    pub fn from_env() -> Self {
        fn parse_usize(var: &str) -> Option<usize> {
            env::var(var).ok()?.parse().ok()
        }

        fn parse_duration_secs(var: &str) -> Option<Duration> {
            env::var(var)
                .ok()?
                .parse::<u64>()
                .ok()
                .map(Duration::from_secs)
        }

        let game_clock = env::var("GAME_CLOCK_SECS")
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok());

        ConstraintsBuilder {
            game_clock,
            build_timeout: parse_duration_secs("BUILD_TIMEOUT_SECS"),
            connect_timeout: parse_duration_secs("CONNECT_TIMEOUT_SECS"),
            disconnect_timeout: parse_duration_secs("DISCONNECT_TIMEOUT_SECS"),
            output_limit: parse_usize("BOT_OUTPUT_LIMIT"),
            ram_per_bot: parse_usize("RAM_PER_BOT"),
        }
    }

    /// Sets the total response time allowed to a bot across a match.
    ///
    /// Once exceeded, the bot is considered out of time for the rest of the match.
    #[must_use]
    pub fn with_game_clock(self, duration: Duration) -> Self {
        Self {
            game_clock: Some(duration),
            ..self
        }
    }

    /// Sets the maximum duration of a bot build.
    #[must_use]
    pub fn with_build_timeout(self, duration: Duration) -> Self {
        Self {
            build_timeout: Some(duration),
            ..self
        }
    }

    /// Sets how long a launched bot has to connect to the engine.
    #[must_use]
    pub fn with_connect_timeout(self, duration: Duration) -> Self {
        Self {
            connect_timeout: Some(duration),
            ..self
        }
    }

    /// Sets how long a bot has to exit after goodbye before it is killed.
    #[must_use]
    pub fn with_disconnect_timeout(self, duration: Duration) -> Self {
        Self {
            disconnect_timeout: Some(duration),
            ..self
        }
    }

    /// Sets how many bytes of output are kept per bot.
    #[must_use]
    pub fn with_output_limit(self, bytes: usize) -> Self {
        Self {
            output_limit: Some(bytes),
            ..self
        }
    }

    /// Sets the maximum RAM available per bot (in MB).
    #[must_use]
    pub fn with_ram_per_bot(self, max: usize) -> Self {
        Self {
            ram_per_bot: Some(max),
            ..self
        }
    }

    /// Consumes the builder and returns the constructed `Constraints`.
    ///
    /// Defaults: 30s game clock, 10s build and connect timeouts, 5s disconnect timeout,
    /// 512KiB of output per bot, no memory limit.
    ///
    /// # Errors
    ///
    /// Returns an error when constraints are impossible, e.g. a zero game clock or a RAM limit
    /// larger than the memory of the machine.
    pub fn build(self) -> anyhow::Result<Constraints> {
        let game_clock = self.game_clock.unwrap_or(Duration::from_secs(30));
        if game_clock.is_zero() {
            bail!("game clock must be positive");
        }

        let ram_per_bot = self.ram_per_bot.map(|mb| mb * 1_000_000);
        if let Some(ram) = ram_per_bot {
            let mut sys = sysinfo::System::new();
            sys.refresh_memory();
            let total = sys.total_memory() as usize;
            if ram > total {
                bail!(
                    "Bot RAM size ({}MB) is greater than total RAM ({}MB)",
                    ram / 1_000_000,
                    total / 1_000_000
                );
            }
        }

        Ok(Constraints {
            game_clock,
            build_timeout: self.build_timeout.unwrap_or(Duration::from_secs(10)),
            connect_timeout: self.connect_timeout.unwrap_or(Duration::from_secs(10)),
            disconnect_timeout: self.disconnect_timeout.unwrap_or(Duration::from_secs(5)),
            output_limit: self.output_limit.unwrap_or(512 * 1024),
            ram_per_bot,
        })
    }
}

/// Obtained using `ConstraintsBuilder`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Constraints {
    pub(crate) game_clock: Duration,
    pub(crate) build_timeout: Duration,
    pub(crate) connect_timeout: Duration,
    pub(crate) disconnect_timeout: Duration,
    pub(crate) output_limit: usize,
    pub(crate) ram_per_bot: Option<usize>,
}

impl Constraints {
    /// create a ConstraintsBuilder
    pub fn builder() -> ConstraintsBuilder {
        ConstraintsBuilder::new()
    }

    pub fn game_clock(&self) -> Duration {
        self.game_clock
    }
}

impl Default for Constraints {
    fn default() -> Self {
        Constraints {
            game_clock: Duration::from_secs(30),
            build_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
            disconnect_timeout: Duration::from_secs(5),
            output_limit: 512 * 1024,
            ram_per_bot: None,
        }
    }
}
