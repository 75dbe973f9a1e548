use std::{
    env,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use bot_arena::{logger::init_logger, prelude::*};

const USAGE: &str = "usage:
  bot-arena <kuhn|rps|rps-restricted> <name1> <path1> <name2> <path2> <output_dir> [duplicate_file]
  bot-arena tournament <kuhn|rps|rps-restricted> <bots_dir> <output_dir> [duplicate_file]

Engine behavior is read from ENGINE_* variables, bot limits from GAME_CLOCK_SECS,
BUILD_TIMEOUT_SECS, CONNECT_TIMEOUT_SECS, DISCONNECT_TIMEOUT_SECS, BOT_OUTPUT_LIMIT and
RAM_PER_BOT.";

fn main() -> anyhow::Result<()> {
    let args = env::args().skip(1).collect::<Vec<_>>();
    let config = Configuration::from_env();
    let constraints = ConstraintsBuilder::from_env().build()?;

    match args.split_first() {
        Some((command, rest)) if command == "tournament" => {
            run_tournament(rest, config, constraints)
        }
        Some(_) => run_match(&args, config, constraints),
        None => bail!("{USAGE}"),
    }
}

fn prepare_output(output_dir: &Path, config: Configuration) -> anyhow::Result<()> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("could not create '{}'", output_dir.display()))?;
    if config.log() {
        init_logger(output_dir)?;
    }
    Ok(())
}

fn run_match(
    args: &[String],
    config: Configuration,
    constraints: Constraints,
) -> anyhow::Result<()> {
    let [variant, name1, path1, name2, path2, output_dir, rest @ ..] = args else {
        bail!("{USAGE}");
    };
    let variant = variant.parse::<GameVariant>()?;
    let output_dir = PathBuf::from(output_dir);
    prepare_output(&output_dir, config)?;

    let dealer = match rest {
        [] => Dealer::shuffled(config.seed()),
        [duplicate] => {
            let file = DuplicateFile::open(Path::new(duplicate))?;
            Dealer::duplicate(file, config.seed())
        }
        _ => bail!("{USAGE}"),
    };

    let runner = MatchRunner::new(variant, config, constraints, dealer);
    let record = runner.run([
        (name1.clone(), PathBuf::from(path1)),
        (name2.clone(), PathBuf::from(path2)),
    ])?;
    let layout = record.layout(&output_dir);
    if config.verbose() {
        println!("Writing {}", layout.game_log().display());
    }
    record.write(&layout)
}

fn run_tournament(
    args: &[String],
    config: Configuration,
    constraints: Constraints,
) -> anyhow::Result<()> {
    let [variant, bots_dir, output_dir, rest @ ..] = args else {
        bail!("{USAGE}");
    };
    let duplicate = match rest {
        [] => None,
        [duplicate] => Some(Path::new(duplicate)),
        _ => bail!("{USAGE}"),
    };
    let variant = variant.parse::<GameVariant>()?;
    let output_dir = PathBuf::from(output_dir);
    // the tournament installs its own logger
    prepare_output(&output_dir, config.with_log(false))?;

    let tournament = Tournament::new(variant, config, constraints);
    let summary = tournament.run(Path::new(bots_dir), &output_dir, duplicate)?;
    for (stem, error) in &summary.failed {
        eprintln!("{stem}: {error}");
    }

    let scores = analyze_scores(&output_dir)?;
    if config.verbose() {
        for score in &scores {
            println!("{}", score.name);
            println!("  Mean score: {:.2}", score.mean);
            println!("  Standard error of mean: {:.2}", score.std_err);
        }
    }
    Ok(())
}
