use std::{
    io::{ErrorKind, Read},
    sync::{Arc, Mutex},
    thread::JoinHandle,
    time::{Duration, Instant},
};

use tracing::{error, trace};

/// Build and runtime output of one bot, capped to a fixed number of bytes.
///
/// Bytes past the cap are counted and dropped.
#[derive(Debug)]
pub struct CapturedOutput {
    bytes: Vec<u8>,
    limit: usize,
    dropped: usize,
}

pub type SharedOutput = Arc<Mutex<CapturedOutput>>;

impl CapturedOutput {
    pub fn new(limit: usize) -> Self {
        CapturedOutput {
            bytes: Vec::new(),
            limit,
            dropped: 0,
        }
    }

    pub fn shared(limit: usize) -> SharedOutput {
        Arc::new(Mutex::new(Self::new(limit)))
    }

    pub fn push(&mut self, chunk: &[u8]) {
        let room = self.limit.saturating_sub(self.bytes.len());
        let kept = chunk.len().min(room);
        self.bytes.extend_from_slice(&chunk[..kept]);
        self.dropped += chunk.len() - kept;
    }

    /// Append a line of engine-side text, e.g. a build failure.
    pub fn note(&mut self, text: &str) {
        self.push(text.as_bytes());
        self.push(b"\n");
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

/// Copy everything `source` produces into `sink` until end of file.
///
/// The thread keeps reading after the cap is reached so the writing process never blocks on a
/// full pipe.
pub fn spawn_drain<R>(source: R, sink: SharedOutput, name: &str) -> Option<JoinHandle<()>>
where
    R: Read + Send + 'static,
{
    let spawned = std::thread::Builder::new()
        .name(format!("{name}-drain"))
        .spawn(move || drain(source, &sink));
    match spawned {
        Ok(handle) => Some(handle),
        Err(e) => {
            error!("could not start output drain for {name}: {e}");
            None
        }
    }
}

fn drain<R: Read>(mut source: R, sink: &Mutex<CapturedOutput>) {
    let mut buf = [0; 4096];
    loop {
        match source.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if let Ok(mut output) = sink.lock() {
                    output.push(&buf[..n]);
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                trace!("output drain stopped: {e}");
                break;
            }
        }
    }
}

/// Join drain threads that finish within `max_duration`; the others are left detached.
///
/// A pipe stays open as long as any descendant of the bot holds it, so waiting without a bound
/// could hang the engine.
pub fn join_within(handles: Vec<JoinHandle<()>>, max_duration: Duration) {
    let deadline = Instant::now() + max_duration;
    for handle in handles {
        while !handle.is_finished() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        if handle.is_finished() {
            let _ = handle.join();
        }
    }
}
