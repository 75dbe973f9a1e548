//! Plays a match of many rounds between two bots and records everything that happened.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use tracing::{info, instrument, trace};

use crate::{
    actions::Action,
    bot_process::BotProcess,
    configuration::Configuration,
    constraints::Constraints,
    deck::{Card, Dealer},
    game_rules::GameRules,
    protocol::{Info, Message},
    round_state::{Chips, Node, RoundHistory, NUM_SEATS},
};

/// File names of every output of one match, all placed in one directory.
///
/// Names share the stem `{p1}.{p2}{duplicate_id}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    directory: PathBuf,
    stem: String,
}

impl OutputLayout {
    pub fn new(
        directory: impl Into<PathBuf>,
        first: &str,
        second: &str,
        duplicate_id: Option<&str>,
    ) -> OutputLayout {
        OutputLayout {
            directory: directory.into(),
            stem: format!("{first}.{second}{}", duplicate_id.unwrap_or_default()),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    pub fn game_log(&self) -> PathBuf {
        self.directory.join(format!("gamelog.{}.txt", self.stem))
    }

    pub fn scores(&self) -> PathBuf {
        self.directory.join(format!("scores.{}.txt", self.stem))
    }

    pub fn server_messages(&self, bot: &str) -> PathBuf {
        self.directory.join(format!("{}.{bot}.server.txt", self.stem))
    }

    pub fn player_messages(&self, bot: &str) -> PathBuf {
        self.directory.join(format!("{}.{bot}.player.txt", self.stem))
    }

    pub fn bot_output(&self, bot: &str) -> PathBuf {
        self.directory.join(format!("{}.{bot}.stdout.txt", self.stem))
    }
}

/// What one bot left behind after a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotRecord {
    pub name: String,
    pub bankroll: i64,
    pub server_messages: Vec<String>,
    pub player_messages: Vec<String>,
    pub output: Vec<u8>,
}

/// How one round went, seats as they were during that round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundSummary {
    pub seats: [String; NUM_SEATS],
    pub deck: Vec<Card>,
    pub actions: Vec<Action>,
    pub deltas: [Chips; NUM_SEATS],
    pub showdown: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchRecord {
    pub transcript: Vec<String>,
    /// In the order the bots were given to the runner.
    pub bots: [BotRecord; NUM_SEATS],
    pub rounds: Vec<RoundSummary>,
    pub num_rounds: u32,
    pub duplicate_id: Option<String>,
    /// Rounds dealt by shuffling although a duplicate file was given.
    pub fallback_rounds: usize,
}

impl MatchRecord {
    /// Average winnings per round.
    pub fn score(&self, bot: usize) -> f64 {
        if self.num_rounds == 0 {
            return 0.0;
        }
        self.bots[bot].bankroll as f64 / f64::from(self.num_rounds)
    }

    pub fn layout(&self, directory: impl Into<PathBuf>) -> OutputLayout {
        OutputLayout::new(
            directory,
            &self.bots[0].name,
            &self.bots[1].name,
            self.duplicate_id.as_deref(),
        )
    }

    /// Write transcript, message logs, bot output and scores.
    pub fn write(&self, layout: &OutputLayout) -> anyhow::Result<()> {
        fs::create_dir_all(layout.directory()).with_context(|| {
            format!("could not create output directory {}", layout.directory().display())
        })?;

        write_file(&layout.game_log(), self.transcript.join("\n"))?;
        for bot in &self.bots {
            write_file(
                &layout.server_messages(&bot.name),
                bot.server_messages.join("\n"),
            )?;
            write_file(
                &layout.player_messages(&bot.name),
                bot.player_messages.join("\n"),
            )?;
            write_file(&layout.bot_output(&bot.name), &bot.output)?;
        }

        let scores = (0..NUM_SEATS)
            .map(|bot| format!("{},{}\n", self.bots[bot].name, self.score(bot)))
            .collect::<String>();
        write_file(&layout.scores(), scores)?;
        info!(stem = layout.stem(), "match outputs written");
        Ok(())
    }
}

fn write_file(path: &Path, content: impl AsRef<[u8]>) -> anyhow::Result<()> {
    fs::write(path, content).with_context(|| format!("could not write {}", path.display()))
}

/// Drives bots through `num_rounds` rounds of one game.
#[derive(Debug)]
pub struct MatchRunner<R: GameRules> {
    rules: R,
    config: Configuration,
    constraints: Constraints,
    dealer: Dealer,
}

impl<R: GameRules> MatchRunner<R> {
    pub fn new(
        rules: R,
        config: Configuration,
        constraints: Constraints,
        dealer: Dealer,
    ) -> MatchRunner<R> {
        MatchRunner {
            rules,
            config,
            constraints,
            dealer,
        }
    }

    /// Build and start both bots from their directories, then play.
    #[instrument(skip_all)]
    pub fn run(self, bots: [(String, PathBuf); NUM_SEATS]) -> anyhow::Result<MatchRecord> {
        if self.config.verbose {
            println!("Starting the game engine...");
        }
        let bots = bots.map(|(name, path)| {
            let mut bot = BotProcess::new(name, path, self.config, &self.constraints);
            bot.build();
            bot.run();
            bot
        });
        self.run_with_bots(bots)
    }

    /// Play with bots that are already started (or that failed to start).
    ///
    /// Bots are stopped before returning, even when a round could not be dealt.
    #[instrument(skip_all, fields(game = self.rules.name()))]
    pub fn run_with_bots(mut self, bots: [BotProcess; NUM_SEATS]) -> anyhow::Result<MatchRecord> {
        let mut players = bots;
        let mut transcript = vec![format!(
            "Bot Arena {} - {} vs {}",
            self.rules.name(),
            players[0].name(),
            players[1].name()
        )];
        for bot in players.iter_mut() {
            bot.enqueue(Message::Hello);
        }

        let mut rounds = Vec::new();
        let mut swapped = false;
        let mut outcome: anyhow::Result<()> = Ok(());
        for round_num in 1..=self.config.num_rounds {
            transcript.push(String::new());
            transcript.push(format!("Round #{round_num}{}", status(&players)));
            match self.play_round(&mut players, round_num, &mut transcript) {
                Ok(summary) => rounds.push(summary),
                Err(e) => {
                    outcome = Err(e.context(format!("round {round_num} aborted")));
                    break;
                }
            }
            if self.config.switch_seats {
                players.swap(0, 1);
                swapped = !swapped;
            }
        }
        transcript.push(String::new());
        transcript.push(format!("Final{}", status(&players)));
        if self.config.verbose {
            println!("Final{}", status(&players));
        }

        if swapped {
            players.swap(0, 1);
        }
        let bots = players.map(|mut bot| {
            let output = bot.stop();
            BotRecord {
                name: bot.name().to_string(),
                bankroll: bot.bankroll(),
                server_messages: bot.server_messages().to_vec(),
                player_messages: bot.player_messages().to_vec(),
                output,
            }
        });
        let duplicate_id = self.dealer.duplicate_id().map(str::to_string);
        let fallback_rounds = self.dealer.fallback_rounds();
        self.dealer.close();
        outcome?;

        Ok(MatchRecord {
            transcript,
            bots,
            rounds,
            num_rounds: self.config.num_rounds,
            duplicate_id,
            fallback_rounds,
        })
    }

    fn play_round(
        &mut self,
        players: &mut [BotProcess; NUM_SEATS],
        round_num: u32,
        transcript: &mut Vec<String>,
    ) -> anyhow::Result<RoundSummary> {
        let deck = self.dealer.next_deck(&self.rules);
        let mut state = self.rules.new_round(deck)?;
        let mut history = RoundHistory::new();
        history.record(&state);

        for bot in players.iter_mut() {
            bot.begin_round(round_num);
            transcript.push(format!("{} posts the ante of {}", bot.name(), self.rules.ante()));
        }
        for (seat, bot) in players.iter_mut().enumerate() {
            transcript.push(format!("{} dealt [{}]", bot.name(), state.hands[seat]));
            bot.enqueue(Message::Info {
                info: Info {
                    seat,
                    hands: state.visible_hands(seat).to_vec(),
                    new_game: Some(true),
                    ..Info::default()
                },
            });
        }

        // simultaneous moves stay hidden until everyone has acted
        let mut held = Vec::new();
        let mut actions = Vec::new();
        let terminal = loop {
            let seat = state.active_seat();
            let legal = self.rules.legal_actions(&state);
            let action = players[seat].query(legal, transcript);
            transcript.push(format!("{} {action}", players[seat].name()));
            actions.push(action);

            let message = Message::action(action, seat);
            if self.rules.simultaneous() {
                held.push(message);
            } else {
                for bot in players.iter_mut() {
                    bot.enqueue(message.clone());
                }
            }

            match self.rules.proceed(&state, action) {
                Node::Round(next) => {
                    history.record(&next);
                    state = next;
                }
                Node::Terminal(terminal) => break terminal,
            }
        };
        for message in held {
            for bot in players.iter_mut() {
                bot.enqueue(message.clone());
            }
        }

        let last = &terminal.previous_state;
        trace!(
            round = round_num,
            states = history.trace(last.generation).count(),
            actions = ?actions,
            "round over"
        );

        let showdown = terminal.is_showdown();
        if showdown {
            let hands = last.hands.map(Some).to_vec();
            for (seat, bot) in players.iter_mut().enumerate() {
                transcript.push(format!("{} shows [{}]", bot.name(), last.hands[seat]));
                bot.enqueue(Message::Info {
                    info: Info {
                        seat,
                        hands: hands.clone(),
                        ..Info::default()
                    },
                });
            }
        }
        for (seat, bot) in players.iter_mut().enumerate() {
            let payoff = terminal.deltas[seat];
            transcript.push(format!("{} awarded {payoff}", bot.name()));
            bot.enqueue(Message::Payoff { payoff });
        }
        for (seat, bot) in players.iter_mut().enumerate() {
            bot.acknowledge(transcript);
            bot.add_to_bankroll(i64::from(terminal.deltas[seat]));
            trace!(bot = bot.name(), state = ?bot.state(), "round settled");
        }

        Ok(RoundSummary {
            seats: [players[0].name().to_string(), players[1].name().to_string()],
            deck: last.deck.to_vec(),
            actions,
            deltas: terminal.deltas,
            showdown,
        })
    }
}

fn status(players: &[BotProcess; NUM_SEATS]) -> String {
    players
        .iter()
        .map(|bot| format!(", {} ({})", bot.name(), bot.bankroll()))
        .collect()
}
