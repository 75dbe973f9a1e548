//! A bot taking part in a match: its process, its connection and its game clock.
//!
//! Startup happens in two steps, [`BotProcess::build`] then [`BotProcess::run`]. Both are
//! allowed to fail: a bot that never connects still takes part in the match, and every action
//! asked from it falls back to [`ActionSet::fallback`].

mod build;
mod output;

pub use build::{load_commands, BotCommands, COMMANDS_FILE};
pub use output::{CapturedOutput, SharedOutput};

use std::{
    io::{BufRead, BufReader, ErrorKind, Write},
    net::{TcpListener, TcpStream},
    path::{Path, PathBuf},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use thiserror::Error;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::{
    actions::{Action, ActionSet},
    cgroup_manager::LimitedProcess,
    configuration::Configuration,
    constraints::Constraints,
    protocol::{decode_reply, encode_packet, Message, ReplyFault},
};

/// Longest reply line accepted from a bot, newline included.
pub const MAX_REPLY_BYTES: usize = 64 * 1024;

/// Match-wide state of one bot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GameState {
    pub bankroll: i64,
    pub game_clock: Duration,
    pub round_num: u32,
}

/// Why a bot did not produce a usable action.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Fault {
    #[error("is not connected")]
    NotConnected,
    #[error("ran out of time")]
    OutOfTime,
    #[error("disconnected")]
    Disconnected,
    #[error("response misformatted: {0}")]
    Misformatted(ReplyFault),
    #[error("did not act")]
    NoAction,
    #[error("attempted illegal {0}")]
    Illegal(Action),
}

#[derive(Debug)]
struct Connection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Connection {
    fn new(stream: TcpStream, write_timeout: Duration) -> std::io::Result<Connection> {
        // accepted sockets inherit non-blocking mode on some platforms
        stream.set_nonblocking(false)?;
        stream.set_nodelay(true)?;
        stream.set_write_timeout(Some(write_timeout))?;
        let writer = stream.try_clone()?;
        Ok(Connection {
            reader: BufReader::new(stream),
            writer,
        })
    }

    fn send_line(&mut self, line: &str) -> std::io::Result<()> {
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }

    /// Read one line, giving up at `deadline` for the whole line. `None` waits forever.
    fn read_line(&mut self, deadline: Option<Instant>) -> std::io::Result<String> {
        let mut line = Vec::new();
        loop {
            let timeout = match deadline {
                Some(deadline) => {
                    let left = deadline.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        return Err(ErrorKind::TimedOut.into());
                    }
                    Some(left)
                }
                None => None,
            };
            self.reader.get_ref().set_read_timeout(timeout)?;
            let available = match self.reader.fill_buf() {
                Ok(available) => available,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if available.is_empty() {
                return Err(std::io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "connection closed by bot",
                ));
            }
            let (complete, used) = match available.iter().position(|&b| b == b'\n') {
                Some(end) => (true, end + 1),
                None => (false, available.len()),
            };
            if line.len() + used > MAX_REPLY_BYTES {
                // the rest of the line cannot be skipped reliably
                return Err(std::io::Error::other(format!(
                    "reply longer than {MAX_REPLY_BYTES} bytes"
                )));
            }
            line.extend_from_slice(&available[..used]);
            self.reader.consume(used);
            if complete {
                return String::from_utf8(line)
                    .map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e));
            }
        }
    }
}

#[derive(Debug)]
pub struct BotProcess {
    name: String,
    path: Option<PathBuf>,
    commands: Option<BotCommands>,
    process: Option<LimitedProcess>,
    connection: Option<Connection>,
    outbox: Vec<Message>,
    state: GameState,
    config: Configuration,
    constraints: Constraints,
    output: SharedOutput,
    drains: Vec<JoinHandle<()>>,
    server_messages: Vec<String>,
    player_messages: Vec<String>,
}

impl BotProcess {
    /// A bot living in the directory `path`, not started yet.
    pub fn new(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        config: Configuration,
        constraints: &Constraints,
    ) -> BotProcess {
        BotProcess {
            name: name.into(),
            path: Some(path.into()),
            commands: None,
            process: None,
            connection: None,
            outbox: Vec::new(),
            state: GameState {
                bankroll: 0,
                game_clock: constraints.game_clock,
                round_num: 0,
            },
            config,
            constraints: constraints.clone(),
            output: CapturedOutput::shared(constraints.output_limit),
            drains: Vec::new(),
            server_messages: Vec::new(),
            player_messages: Vec::new(),
        }
    }

    /// A bot that is already connected through `stream`, with no process of its own.
    pub fn from_stream(
        name: impl Into<String>,
        stream: TcpStream,
        config: Configuration,
        constraints: &Constraints,
    ) -> BotProcess {
        let mut bot = BotProcess::new(name, PathBuf::new(), config, constraints);
        bot.path = None;
        match Connection::new(stream, constraints.connect_timeout) {
            Ok(connection) => bot.connection = Some(connection),
            Err(e) => error!("could not set up connection of {}: {e}", bot.name),
        }
        bot
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    pub fn bankroll(&self) -> i64 {
        self.state.bankroll
    }

    pub fn game_clock(&self) -> Duration {
        self.state.game_clock
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Packets sent to the bot, one per line.
    pub fn server_messages(&self) -> &[String] {
        &self.server_messages
    }

    /// Replies received from the bot, one per line.
    pub fn player_messages(&self) -> &[String] {
        &self.player_messages
    }

    pub fn begin_round(&mut self, round_num: u32) {
        self.state.round_num = round_num;
    }

    pub fn add_to_bankroll(&mut self, delta: i64) {
        self.state.bankroll += delta;
    }

    /// Queue a message for the next exchange.
    pub fn enqueue(&mut self, message: Message) {
        self.outbox.push(message);
    }

    /// Read `commands.json` and run the build command.
    ///
    /// Failures are recorded in the captured output and leave the bot unable to run.
    #[instrument(skip_all, fields(bot = %self.name))]
    pub fn build(&mut self) {
        let Some(path) = self.path.clone() else {
            return;
        };
        let commands = match load_commands(&path) {
            Ok(commands) => commands,
            Err(e) => {
                self.setup_failure(&e);
                return;
            }
        };
        if let Err(e) =
            build::run_build(&path, &commands.build, self.constraints.build_timeout, &self.output)
        {
            self.setup_failure(&e);
            return;
        }
        self.commands = Some(commands);
        info!("build done");
    }

    /// Start the run command with the engine port appended and wait for the bot to connect.
    #[instrument(skip_all, fields(bot = %self.name))]
    pub fn run(&mut self) {
        let (Some(path), Some(commands)) = (self.path.clone(), self.commands.clone()) else {
            debug!("nothing to run");
            return;
        };
        let Some((program, args)) = commands.run.split_first() else {
            self.setup_failure(&anyhow!("\"run\" in {COMMANDS_FILE} is empty"));
            return;
        };
        match self.launch(program, args, &path) {
            Ok(()) => {
                info!("connected");
                if self.config.verbose {
                    println!("{} connected successfully", self.name);
                }
            }
            Err(e) => self.setup_failure(&e),
        }
    }

    fn launch(&mut self, program: &str, args: &[String], dir: &Path) -> anyhow::Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .context("engine error: could not create TcpListener")?;
        let mut args = args.to_vec();
        args.push(listener.local_addr()?.port().to_string());

        let mut process = self.spawn(program, &args, dir)?;
        debug!(contained = process.is_contained(), "bot process started");
        let stdout = process.child.stdout.take();
        let stderr = process.child.stderr.take();
        self.drains.extend(
            stdout.and_then(|out| output::spawn_drain(out, self.output.clone(), &self.name)),
        );
        self.drains.extend(
            stderr.and_then(|err| output::spawn_drain(err, self.output.clone(), &self.name)),
        );

        listener
            .set_nonblocking(true)
            .context("engine error: setting non-blocking to true")?;
        let timeout = self.constraints.connect_timeout;
        let deadline = Instant::now() + timeout;
        let accepted = loop {
            match listener.accept() {
                Ok((stream, _addr)) => break Ok(stream),
                Err(e) if e.kind() == ErrorKind::WouldBlock => {}
                Err(e) => break Err(anyhow!(e).context("engine error: accept failed")),
            }
            if let Ok(Some(status)) = process.child.try_wait() {
                break Err(anyhow!("bot exited with {status} before connecting"));
            }
            if Instant::now() >= deadline {
                break Err(anyhow!("Timed out after {timeout:?} waiting for bot to connect"));
            }
            // at least 10 tries
            thread::sleep(Duration::from_millis(10).min(timeout / 10));
        };
        // kept even on failure so stop() reaps it
        self.process = Some(process);

        let connection = Connection::new(accepted?, self.constraints.connect_timeout)
            .context("engine error: could not configure connection")?;
        self.connection = Some(connection);
        Ok(())
    }

    fn spawn(&self, program: &str, args: &[String], dir: &Path) -> anyhow::Result<LimitedProcess> {
        let Some(ram) = self.constraints.ram_per_bot else {
            return LimitedProcess::launch_without_container(program, args, dir);
        };
        match LimitedProcess::launch(program, args, dir, ram as i64) {
            Ok(process) => Ok(process),
            Err(e) if self.config.allow_uncontained => {
                warn!("running uncontained: {e:#}");
                LimitedProcess::launch_without_container(program, args, dir)
            }
            Err(e) => Err(e).context("engine error: child + cgroup creation failed"),
        }
    }

    fn setup_failure(&mut self, e: &anyhow::Error) {
        error!("{e:#}");
        if let Ok(mut output) = self.output.lock() {
            output.note(&format!("{e:#}"));
        }
        if self.config.verbose {
            println!("{}: {e:#}", self.name);
        }
    }

    /// Ask the bot for an action among `legal`. Never fails: faults are written to `game_log`
    /// and replaced by the fallback action.
    pub fn query(&mut self, legal: ActionSet, game_log: &mut Vec<String>) -> Action {
        match self.request_action(legal) {
            Ok(action) => action,
            Err(fault) => {
                self.report(&fault, game_log);
                legal.fallback()
            }
        }
    }

    fn request_action(&mut self, legal: ActionSet) -> Result<Action, Fault> {
        let line = self.exchange(true)?.unwrap_or_default();
        let action = decode_reply(&line)
            .map_err(Fault::Misformatted)?
            .ok_or(Fault::NoAction)?;
        if legal.contains(action) {
            Ok(action)
        } else {
            Err(Fault::Illegal(action))
        }
    }

    /// Final exchange of a round: deliver queued messages and discard the reply.
    pub fn acknowledge(&mut self, game_log: &mut Vec<String>) {
        match self.exchange(true) {
            Ok(_) | Err(Fault::Misformatted(_)) => {}
            Err(fault) => self.report(&fault, game_log),
        }
    }

    /// Guard faults repeat every turn once a bot is gone, so only the first sign of trouble goes
    /// to the transcript.
    fn report(&self, fault: &Fault, game_log: &mut Vec<String>) {
        if matches!(fault, Fault::NotConnected) {
            trace!(bot = %self.name, "{fault}");
            return;
        }
        warn!(bot = %self.name, "{fault}");
        game_log.push(format!("{} {fault}", self.name));
        if self.config.verbose && matches!(fault, Fault::OutOfTime | Fault::Disconnected) {
            println!("{} {fault}", self.name);
        }
    }

    /// Send the queued messages behind a fresh `time` message, then read one reply line when
    /// `expect_reply` is set.
    fn exchange(&mut self, expect_reply: bool) -> Result<Option<String>, Fault> {
        // messages for a bot that is out of the match are dropped
        let Some(connection) = self.connection.as_mut() else {
            self.outbox.clear();
            return Err(Fault::NotConnected);
        };
        if expect_reply && self.state.game_clock.is_zero() {
            self.outbox.clear();
            return Err(Fault::NotConnected);
        }

        let mut packet = Vec::with_capacity(self.outbox.len() + 1);
        packet.push(Message::Time {
            time: self.state.game_clock.as_secs_f64(),
        });
        packet.append(&mut self.outbox);
        let line = encode_packet(&packet);
        trace!(bot = %self.name, "sending {line}");

        let start = Instant::now();
        let sent = connection.send_line(&line);
        self.server_messages.push(line);
        if sent.is_err() {
            self.state.game_clock = Duration::ZERO;
            return Err(Fault::Disconnected);
        }
        if !expect_reply {
            return Ok(None);
        }

        let deadline = self
            .config
            .enforce_game_clock
            .then(|| start + self.state.game_clock);
        let reply = connection.read_line(deadline);
        if self.config.enforce_game_clock {
            self.state.game_clock = self.state.game_clock.saturating_sub(start.elapsed());
        }

        match reply {
            Ok(reply) => {
                self.player_messages.push(reply.trim_end().to_string());
                if self.state.game_clock.is_zero() {
                    Err(Fault::OutOfTime)
                } else {
                    Ok(Some(reply))
                }
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                self.state.game_clock = Duration::ZERO;
                Err(Fault::OutOfTime)
            }
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                self.player_messages.push("<invalid utf-8>".to_string());
                Err(Fault::Misformatted(ReplyFault::NotJson(e.to_string())))
            }
            Err(e) => {
                debug!(bot = %self.name, "read failed: {e}");
                self.state.game_clock = Duration::ZERO;
                Err(Fault::Disconnected)
            }
        }
    }

    /// Say goodbye, close the connection, make sure the process is gone and return everything
    /// it printed.
    #[instrument(skip_all, fields(bot = %self.name))]
    pub fn stop(&mut self) -> Vec<u8> {
        if self.connection.is_some() {
            self.enqueue(Message::Goodbye);
            if let Err(fault) = self.exchange(false) {
                debug!("goodbye not delivered: {fault}");
            }
        }
        self.connection = None;

        let disconnect_timeout = self.constraints.disconnect_timeout;
        if let Some(mut process) = self.process.take() {
            if process.wait(disconnect_timeout).is_none() {
                warn!("Timed out waiting for bot to quit");
                if let Ok(mut output) = self.output.lock() {
                    output.note(&format!("Timed out waiting for {} to quit", self.name));
                }
                if let Err(e) = process.try_kill(Duration::from_secs(1)) {
                    error!("could not kill bot: {e:#}");
                }
            }
        }
        output::join_within(std::mem::take(&mut self.drains), disconnect_timeout);

        self.output
            .lock()
            .map(|output| output.bytes().to_vec())
            .unwrap_or_default()
    }
}
