//! Round-robin tournaments between every bot of a directory, and score aggregation.
//!
//! Every ordered pair of distinct bots plays one match, so each bot plays both first and second
//! against every opponent. A pair is skipped when its score file is newer than every file of
//! both bots. Matches run on a pool of worker threads; with a duplicate file they run one at a
//! time.

use std::{
    collections::VecDeque,
    fs,
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
};

use anyhow::Context;
use tracing::{error, info, instrument, trace, warn};

use crate::{
    bot_collector::{collect_bots, Bot},
    configuration::Configuration,
    constraints::Constraints,
    deck::{duplicate_id, Dealer, DuplicateFile},
    game_rules::GameVariant,
    logger::init_logger,
    match_runner::{MatchRunner, OutputLayout},
    round_state::NUM_SEATS,
};

/// Name of the file written by [`analyze_scores`].
pub const MEAN_SCORES_FILE: &str = "mean_scores.txt";

#[derive(Debug, Clone)]
struct Pairing {
    first: Bot,
    second: Bot,
    layout: OutputLayout,
}

/// What happened to every pairing of a tournament, named by output stem.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TournamentSummary {
    pub played: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<(String, String)>,
}

#[derive(Debug)]
pub struct Tournament {
    variant: GameVariant,
    config: Configuration,
    constraints: Constraints,
}

impl Tournament {
    pub fn new(variant: GameVariant, config: Configuration, constraints: Constraints) -> Self {
        trace!(?config, ?constraints);
        Tournament {
            variant,
            config,
            constraints,
        }
    }

    /// Play every pairing of the bots in `bots_dir` that is not up to date, writing outputs to
    /// `output_dir`.
    ///
    /// With a `duplicate` file every match replays the same deals, seats are not switched and
    /// output names carry the file's duplicate id.
    #[instrument(skip(self))]
    pub fn run(
        &self,
        bots_dir: &Path,
        output_dir: &Path,
        duplicate: Option<&Path>,
    ) -> anyhow::Result<TournamentSummary> {
        fs::create_dir_all(output_dir)
            .with_context(|| format!("could not create '{}'", output_dir.display()))?;
        if self.config.log {
            if let Err(e) = init_logger(output_dir) {
                warn!("{e:#}");
            }
        }

        let bots = collect_bots(bots_dir, self.config)?;
        let duplicate_id = duplicate.map(duplicate_id).transpose()?;

        let mut summary = TournamentSummary::default();
        let mut pending = VecDeque::new();
        for first in &bots {
            for second in &bots {
                if first.name == second.name {
                    continue;
                }
                let layout = OutputLayout::new(
                    output_dir,
                    &first.name,
                    &second.name,
                    duplicate_id.as_deref(),
                );
                if is_up_to_date(&layout.scores(), [first, second]) {
                    info!("Skipping {} vs {}: up to date", first.name, second.name);
                    if self.config.verbose {
                        println!("Skipping {} vs {}: up to date", first.name, second.name);
                    }
                    summary.skipped.push(layout.stem().to_string());
                    continue;
                }
                pending.push_back(Pairing {
                    first: first.clone(),
                    second: second.clone(),
                    layout,
                });
            }
        }

        let total = pending.len();
        let workers = match duplicate {
            Some(_) => 1,
            None => (num_cpus::get() / NUM_SEATS).max(1),
        }
        .min(total.max(1));
        info!(total, workers, "starting matches");

        let queue = Arc::new(Mutex::new(pending));
        let (tx_result, rx_result) = mpsc::channel();
        for _ in 0..workers {
            let queue = Arc::clone(&queue);
            let tx_result = tx_result.clone();
            let job = MatchJob {
                variant: self.variant,
                config: self.config,
                constraints: self.constraints.clone(),
                duplicate: duplicate.map(Path::to_path_buf),
            };
            std::thread::spawn(move || loop {
                let next = match queue.lock() {
                    Ok(mut queue) => queue.pop_front(),
                    Err(_) => None,
                };
                let Some(pairing) = next else {
                    break;
                };
                let result = job.play(&pairing);
                if tx_result.send((pairing, result)).is_err() {
                    break;
                }
            });
        }
        // the loop below ends once every worker is gone
        drop(tx_result);

        for (pairing, result) in rx_result.iter().take(total) {
            let stem = pairing.layout.stem().to_string();
            match result {
                Ok(()) => summary.played.push(stem),
                Err(e) => {
                    error!("{stem}: {e:#}");
                    if self.config.verbose {
                        println!("\x1b[31m{stem}: {e:#}\x1b[39m");
                    }
                    summary.failed.push((stem, format!("{e:#}")));
                }
            }
        }
        if summary.played.len() + summary.failed.len() < total {
            error!("a match worker stopped before finishing its matches");
        }
        Ok(summary)
    }
}

/// Everything a worker thread needs to play pairings.
#[derive(Debug)]
struct MatchJob {
    variant: GameVariant,
    config: Configuration,
    constraints: Constraints,
    duplicate: Option<PathBuf>,
}

impl MatchJob {
    #[instrument(skip_all, fields(first = %pairing.first.name, second = %pairing.second.name))]
    fn play(&self, pairing: &Pairing) -> anyhow::Result<()> {
        if self.config.verbose {
            println!("Match {} vs {}", pairing.first.name, pairing.second.name);
        }
        let (config, dealer) = match &self.duplicate {
            Some(path) => (
                self.config.with_switch_seats(false),
                Dealer::duplicate(DuplicateFile::open(path)?, self.config.seed),
            ),
            None => (self.config, Dealer::shuffled(self.config.seed)),
        };
        let runner = MatchRunner::new(self.variant, config, self.constraints.clone(), dealer);
        let record = runner.run([
            (pairing.first.name.clone(), pairing.first.path.clone()),
            (pairing.second.name.clone(), pairing.second.path.clone()),
        ])?;
        record.write(&pairing.layout)
    }
}

fn is_up_to_date(scores: &Path, bots: [&Bot; NUM_SEATS]) -> bool {
    let Ok(written) = fs::metadata(scores).and_then(|m| m.modified()) else {
        return false;
    };
    bots.iter()
        .all(|bot| bot.newest_modification().map_or(true, |newest| written > newest))
}

/// Aggregated scores of one bot across score files.
#[derive(Debug, Clone, PartialEq)]
pub struct BotScore {
    pub name: String,
    pub mean: f64,
    /// Standard error of the mean: sample standard deviation over the square root of the count.
    /// Zero with fewer than two samples.
    pub std_err: f64,
    pub samples: usize,
}

/// Read every `scores.*.txt` of `output_dir`, and write per-bot mean and standard error to
/// [`MEAN_SCORES_FILE`], best mean first.
#[instrument]
pub fn analyze_scores(output_dir: &Path) -> anyhow::Result<Vec<BotScore>> {
    let mut samples: Vec<(String, Vec<f64>)> = Vec::new();
    let entries = fs::read_dir(output_dir)
        .with_context(|| format!("could not read '{}'", output_dir.display()))?;
    let mut files = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| is_score_file(path))
        .collect::<Vec<_>>();
    files.sort();

    for file in files {
        let content = fs::read_to_string(&file)
            .with_context(|| format!("could not read {}", file.display()))?;
        for line in content.lines().filter(|line| !line.trim().is_empty()) {
            let parsed = line
                .split_once(',')
                .and_then(|(name, score)| Some((name.trim(), score.trim().parse::<f64>().ok()?)));
            let Some((name, score)) = parsed else {
                warn!("ignoring malformed line '{line}' in {}", file.display());
                continue;
            };
            match samples.iter_mut().find(|(known, _)| known == name) {
                Some((_, scores)) => scores.push(score),
                None => samples.push((name.to_string(), vec![score])),
            }
        }
    }

    let mut results = samples
        .into_iter()
        .map(|(name, scores)| summarize(name, &scores))
        .collect::<Vec<_>>();
    results.sort_by(|a, b| b.mean.total_cmp(&a.mean));

    let mut table = String::from("Name,Mean,StdErr\n");
    for score in &results {
        table.push_str(&format!("{},{:.2},{:.2}\n", score.name, score.mean, score.std_err));
    }
    let path = output_dir.join(MEAN_SCORES_FILE);
    fs::write(&path, table).with_context(|| format!("could not write {}", path.display()))?;
    Ok(results)
}

fn is_score_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with("scores.") && name.ends_with(".txt"))
}

fn summarize(name: String, scores: &[f64]) -> BotScore {
    let n = scores.len();
    let mean = scores.iter().sum::<f64>() / n as f64;
    let std_err = if n < 2 {
        0.0
    } else {
        let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        variance.sqrt() / (n as f64).sqrt()
    };
    BotScore {
        name,
        mean,
        std_err,
        samples: n,
    }
}
