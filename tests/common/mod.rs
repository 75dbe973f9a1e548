#![allow(dead_code)]

use std::{
    collections::VecDeque,
    io::{BufRead, BufReader, Write},
    net::{TcpListener, TcpStream},
    path::Path,
    thread::{self, JoinHandle},
    time::Duration,
};

use bot_arena::prelude::*;
use serde_json::Value;
use tracing::{Level, Metadata};
use tracing_subscriber::{
    fmt,
    layer::{Context, Filter, SubscriberExt},
    Layer, Registry,
};

struct CustomLevelFilter;
impl<S> Filter<S> for CustomLevelFilter {
    fn enabled(&self, meta: &Metadata<'_>, _cx: &Context<'_, S>) -> bool {
        meta.level() <= &Level::DEBUG
    }
}

/// Print engine diagnostics while debugging a test.
pub fn init_debug_logger() {
    let format = fmt::format()
        .without_time()
        .with_ansi(true)
        .with_level(true)
        .with_thread_names(true)
        .with_target(false);

    let reg = Registry::default().with(
        fmt::layer()
            .event_format(format)
            .with_filter(CustomLevelFilter),
    );

    let _ = tracing::subscriber::set_global_default(reg);
}

pub fn quiet() -> Configuration {
    Configuration::new().with_verbose(false)
}

pub fn constraints() -> Constraints {
    ConstraintsBuilder::new()
        .with_game_clock(Duration::from_secs(10))
        .with_connect_timeout(Duration::from_secs(5))
        .with_disconnect_timeout(Duration::from_millis(500))
        .build()
        .unwrap()
}

pub fn action(verb: &str) -> String {
    format!(r#"{{"type":"action","action":{{"verb":"{verb}"}}}}"#)
}

/// Decides the reply to each packet; `None` hangs up.
pub type Responder = Box<dyn FnMut(&[Value]) -> Option<String> + Send>;

/// Reply with `verbs` in order, one per packet, then keep repeating the last one.
pub fn sequence(verbs: &[&str]) -> Responder {
    let mut replies = verbs.iter().map(|v| action(v)).collect::<VecDeque<_>>();
    Box::new(move |_| {
        if replies.len() > 1 {
            replies.pop_front()
        } else {
            replies.front().cloned()
        }
    })
}

/// Reply with `verb` to every packet.
pub fn always(verb: &str) -> Responder {
    sequence(&[verb])
}

/// Reply with fixed raw lines in order, then hang up.
pub fn raw(lines: &[&str]) -> Responder {
    let mut lines = lines
        .iter()
        .map(|l| l.to_string())
        .collect::<VecDeque<_>>();
    Box::new(move |_| lines.pop_front())
}

/// A bot running on a thread of the test, connected to the engine through a local socket.
///
/// The handle returns every line the bot received.
pub fn scripted_bot(
    name: &str,
    config: Configuration,
    constraints: &Constraints,
    delay: Duration,
    mut respond: Responder,
) -> (BotProcess, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = thread::spawn(move || {
        let stream = TcpStream::connect(addr).unwrap();
        let mut writer = stream.try_clone().unwrap();
        let mut reader = BufReader::new(stream);
        let mut received = Vec::new();
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).unwrap_or(0) == 0 {
                break;
            }
            let line = line.trim_end().to_string();
            let packet = serde_json::from_str::<Vec<Value>>(&line).unwrap_or_default();
            received.push(line);
            if packet.iter().any(|m| m["type"] == "goodbye") {
                break;
            }
            thread::sleep(delay);
            let Some(reply) = respond(&packet) else {
                break;
            };
            if writer.write_all(format!("{reply}\n").as_bytes()).is_err() {
                break;
            }
        }
        received
    });
    let (stream, _) = listener.accept().unwrap();
    let bot = BotProcess::from_stream(name, stream, config, constraints);
    (bot, handle)
}

/// A scripted bot answering immediately, with the default constraints.
pub fn bot(
    name: &str,
    config: Configuration,
    respond: Responder,
) -> (BotProcess, JoinHandle<Vec<String>>) {
    scripted_bot(name, config, &constraints(), Duration::ZERO, respond)
}

/// A bot that never connects.
pub fn absent_bot(name: &str, dir: &Path, config: Configuration) -> BotProcess {
    let mut bot = BotProcess::new(name, dir, config, &constraints());
    bot.build();
    bot.run();
    bot
}

/// Write a duplicate file with one deal per entry.
pub fn duplicate_file(dir: &Path, deals: &[&[u8]]) -> std::path::PathBuf {
    let path = dir.join("deals.txt");
    let content = deals
        .iter()
        .map(|deal| {
            deal.iter()
                .map(u8::to_string)
                .collect::<Vec<_>>()
                .join(",")
        })
        .collect::<Vec<_>>()
        .join("\n");
    std::fs::write(&path, content).unwrap();
    path
}
