//! Config for the engine behaviors
//!
//! Configuration can be created programmatically using [`Configuration::new()`] or by reading
//! environment variables using [`Configuration::from_env()`].
//!
//! # Environment Variables
//!
//! The following environment variables can be used to override configuration values. All
//! values are optional. Flags are case-insensitive: set them to `"true"` to enable.
//!
//! - `ENGINE_VERBOSE`: Print match progress to stdout (default: `true`)
//! - `ENGINE_LOG`: Enable logging to a file (default: `false`)
//! - `ENGINE_ENFORCE_GAME_CLOCK`: Charge response time against the bots' clocks (default: `true`)
//! - `ENGINE_SWITCH_SEATS`: Swap seats after every round (default: `true`)
//! - `ENGINE_ALLOW_UNCONTAINED`: Run bots without a cgroup when one cannot be created (default: `false`)
//! - `ENGINE_NUM_ROUNDS`: Number of rounds per match (default: `1000`)
//! - `ENGINE_SEED`: Seed of the shuffles, for reproducible deals (default: random)

/// Configuration for engine behaviors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Configuration {
    pub(crate) verbose: bool,
    pub(crate) log: bool,
    pub(crate) enforce_game_clock: bool,
    pub(crate) switch_seats: bool,
    pub(crate) allow_uncontained: bool,
    pub(crate) num_rounds: u32,
    pub(crate) seed: Option<u64>,
}

impl Configuration {
    /// Create a new configuration with default parameters.
    ///
    /// By default:
    /// - Match progress is printed to stdout.
    /// - Logging to file is disabled.
    /// - The game clock is enforced.
    /// - Seats are swapped after every round.
    /// - Bots that should be contained but cannot be are not run.
    /// - A match lasts 1000 rounds.
    /// - Shuffles are seeded randomly.
    pub fn new() -> Self {
        Self {
            verbose: true,
            log: false,
            enforce_game_clock: true,
            switch_seats: true,
            allow_uncontained: false,
            num_rounds: 1000,
            seed: None,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Any unset or unparsable variable keeps its default value.
    pub fn from_env() -> Self {
        fn get_env_flag(var: &str, default: bool) -> bool {
            match std::env::var(var) {
                Ok(val) => val.eq_ignore_ascii_case("true"),
                Err(_) => default,
            }
        }

        fn get_env_number<T: std::str::FromStr>(var: &str) -> Option<T> {
            std::env::var(var).ok()?.trim().parse().ok()
        }

        let defaults = Self::new();
        Self {
            verbose: get_env_flag("ENGINE_VERBOSE", defaults.verbose),
            log: get_env_flag("ENGINE_LOG", defaults.log),
            enforce_game_clock: get_env_flag(
                "ENGINE_ENFORCE_GAME_CLOCK",
                defaults.enforce_game_clock,
            ),
            switch_seats: get_env_flag("ENGINE_SWITCH_SEATS", defaults.switch_seats),
            allow_uncontained: get_env_flag("ENGINE_ALLOW_UNCONTAINED", defaults.allow_uncontained),
            num_rounds: get_env_number("ENGINE_NUM_ROUNDS").unwrap_or(defaults.num_rounds),
            seed: get_env_number("ENGINE_SEED"),
        }
    }

    /// Enable or disable progress output.
    pub fn with_verbose(mut self, value: bool) -> Self {
        self.verbose = value;
        self
    }

    /// Enable or disable logging to file.
    pub fn with_log(mut self, value: bool) -> Self {
        self.log = value;
        self
    }

    /// Enable or disable game clock enforcement. Disabling it is meant for debugging bots.
    pub fn with_enforce_game_clock(mut self, value: bool) -> Self {
        self.enforce_game_clock = value;
        self
    }

    /// Enable or disable seat swapping between rounds.
    ///
    /// Swapping cancels the advantage of acting first or last. Duplicate-mode tournaments turn it
    /// off so both orders are played as separate matches on the same deals.
    pub fn with_switch_seats(mut self, value: bool) -> Self {
        self.switch_seats = value;
        self
    }

    /// Enable or disable running bots uncontained when a memory limit cannot be applied.
    pub fn with_allow_uncontained(mut self, value: bool) -> Self {
        self.allow_uncontained = value;
        self
    }

    /// Set the number of rounds per match.
    pub fn with_num_rounds(mut self, value: u32) -> Self {
        self.num_rounds = value;
        self
    }

    /// Seed the shuffles.
    pub fn with_seed(mut self, value: u64) -> Self {
        self.seed = Some(value);
        self
    }

    pub fn num_rounds(&self) -> u32 {
        self.num_rounds
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn log(&self) -> bool {
        self.log
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}
