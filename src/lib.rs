//! # Bot Arena
//!
//! A match engine adjudicating small imperfect-information games between two untrusted bot
//! processes.
//!
//! It provides:
//! - Game rules for Kuhn poker and rock-paper-scissors behind the
//!   [`GameRules`](crate::game_rules::GameRules) trait
//! - Bot lifecycle management (`build`, `run`, `stop`) with game clocks and fallbacks
//!   ([`bot_process`])
//! - Match execution and persisted transcripts ([`match_runner`])
//! - Duplicate-deck replay so pairings can be compared on identical deals ([`deck`])
//! - Round-robin tournaments and score aggregation ([`tournament`])
//!
//! Every bot runs as a separate OS process, optionally inside a Linux cgroup v2 with a memory
//! limit, and talks to the engine over a local TCP connection.
//!
//! # Documentation Overview
//!
//! - For engine behavior and limits, see
//!   [`Configuration`](crate::configuration::Configuration) and [`constraints`].
//! - For the wire format spoken with bots, see [`protocol`].
//! - For adding a game, implement [`GameRules`](crate::game_rules::GameRules).
//!
//! # Usage Example
//!
//! ```no_run
//! use std::path::PathBuf;
//! use bot_arena::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let constraints = ConstraintsBuilder::new()
//!         .with_ram_per_bot(500) // in MB
//!         .build()?;
//!     let config = Configuration::new().with_num_rounds(100).with_allow_uncontained(true);
//!
//!     let runner = MatchRunner::new(
//!         "kuhn".parse::<GameVariant>()?,
//!         config,
//!         constraints,
//!         Dealer::shuffled(None),
//!     );
//!     let record = runner.run([
//!         ("alice".to_string(), PathBuf::from("bots/alice")),
//!         ("bob".to_string(), PathBuf::from("bots/bob")),
//!     ])?;
//!     record.write(&record.layout("results"))?;
//!     Ok(())
//! }
//! ```
//!
//! # Bot Requirements
//!
//! - The bot directory holds a `commands.json`: `{"build": [...], "run": [...]}`
//! - The run command receives the engine port as its last argument and must connect to
//!   `127.0.0.1:<port>`
//! - The bot answers every line it receives with exactly one line, within its game clock

pub mod actions;
pub mod bot_collector;
pub mod bot_process;
mod cgroup_manager;
pub mod configuration;
pub mod constraints;
pub mod deck;
pub mod game_rules;
pub mod logger;
pub mod match_runner;
pub mod protocol;
pub mod round_state;
pub mod tournament;

pub use anyhow;

/// Commonly used types and traits for quick access.
///
/// ```rust
/// use bot_arena::prelude::*;
/// ```
pub mod prelude {
    pub use crate::actions::{Action, ActionSet};
    pub use crate::bot_process::BotProcess;
    pub use crate::configuration::Configuration;
    pub use crate::constraints::{Constraints, ConstraintsBuilder};
    pub use crate::deck::{Dealer, DuplicateFile};
    pub use crate::game_rules::{GameRules, GameVariant};
    pub use crate::match_runner::{MatchRecord, MatchRunner, OutputLayout};
    pub use crate::tournament::{analyze_scores, Tournament};
}
