#![cfg(unix)]

use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
    time::{Duration, Instant},
};

use bot_arena::{prelude::*, tournament::MEAN_SCORES_FILE};

mod common;
use common::quiet;

fn has_bash() -> bool {
    Command::new("bash")
        .args(["-c", "exit 0"])
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// A bot connecting back through bash's `/dev/tcp`, answering `verb` to every packet.
fn bash_bot(verb: &str, on_goodbye: &str) -> String {
    format!(
        r#"exec 3<>/dev/tcp/127.0.0.1/$1
echo "bot started"
while IFS= read -r line <&3; do
  case "$line" in
    *'"goodbye"'*) {on_goodbye} ;;
  esac
  printf '%s\n' '{{"type":"action","action":{{"verb":"{verb}"}}}}' >&3
done
"#
    )
}

fn write_bot(root: &Path, name: &str, build: &[&str], run: &[&str], script: &str) -> PathBuf {
    let dir = root.join(name);
    fs::create_dir_all(&dir).unwrap();
    let commands = serde_json::json!({ "build": build, "run": run });
    fs::write(dir.join("commands.json"), commands.to_string()).unwrap();
    fs::write(dir.join("bot.sh"), script).unwrap();
    dir
}

fn default_bot(root: &Path, name: &str, verb: &str) -> PathBuf {
    write_bot(
        root,
        name,
        &["sh", "-c", "echo built"],
        &["bash", "bot.sh"],
        &bash_bot(verb, "exit 0"),
    )
}

fn constraints() -> ConstraintsBuilder {
    ConstraintsBuilder::new()
        .with_game_clock(Duration::from_secs(10))
        .with_connect_timeout(Duration::from_secs(5))
        .with_disconnect_timeout(Duration::from_millis(300))
}

fn kuhn() -> GameVariant {
    "kuhn".parse().unwrap()
}

#[test]
fn subprocess_bots_play_a_match() {
    if !has_bash() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let first = default_bot(dir.path(), "first", "D");
    let second = default_bot(dir.path(), "second", "D");

    let config = quiet().with_num_rounds(3);
    let runner = MatchRunner::new(
        kuhn(),
        config,
        constraints().build().unwrap(),
        Dealer::shuffled(Some(1)),
    );
    let record = runner
        .run([("first".into(), first), ("second".into(), second)])
        .unwrap();

    assert_eq!(record.rounds.len(), 3);
    assert!(record.rounds.iter().all(|round| round.showdown));
    assert_eq!(record.bots[0].bankroll + record.bots[1].bankroll, 0);
    assert!(!record
        .transcript
        .iter()
        .any(|l| l.ends_with("disconnected") || l.contains("misformatted")));
    for bot in &record.bots {
        let output = String::from_utf8_lossy(&bot.output);
        assert!(output.contains("built"), "{output}");
        assert!(output.contains("bot started"), "{output}");
        // three rounds of query and acknowledge
        assert!(bot.player_messages.len() >= 3);
    }

    let out = dir.path().join("out");
    record.write(&record.layout(&out)).unwrap();
    assert!(out.join("scores.first.second.txt").is_file());
    assert!(out.join("first.second.first.stdout.txt").is_file());
}

#[test]
fn slow_build_is_cut_off() {
    let dir = tempfile::tempdir().unwrap();
    let slow = write_bot(dir.path(), "slow", &["sleep", "5"], &["sh", "-c", "exit 0"], "");
    let other = write_bot(dir.path(), "other", &[], &["sh", "-c", "exit 0"], "");

    let constraints = constraints()
        .with_build_timeout(Duration::from_millis(300))
        .with_connect_timeout(Duration::from_millis(300))
        .build()
        .unwrap();
    let started = Instant::now();
    let config = quiet().with_num_rounds(2);
    let runner = MatchRunner::new(kuhn(), config, constraints, Dealer::shuffled(None));
    let record = runner
        .run([("slow".into(), slow), ("other".into(), other)])
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(record.rounds.len(), 2);
    let output = String::from_utf8_lossy(&record.bots[0].output);
    assert!(output.contains("Timed out"), "{output}");
    let output = String::from_utf8_lossy(&record.bots[1].output);
    assert!(output.contains("before connecting"), "{output}");
}

#[test]
fn bot_that_never_connects_is_killed() {
    let dir = tempfile::tempdir().unwrap();
    let sleeper = write_bot(dir.path(), "sleeper", &[], &["sleep", "5"], "");
    let other = write_bot(dir.path(), "other", &[], &["sleep", "5"], "");

    let constraints = constraints()
        .with_connect_timeout(Duration::from_millis(300))
        .build()
        .unwrap();
    let started = Instant::now();
    let config = quiet().with_num_rounds(1);
    let runner = MatchRunner::new(kuhn(), config, constraints, Dealer::shuffled(None));
    let record = runner
        .run([("sleeper".into(), sleeper), ("other".into(), other)])
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(4));
    for bot in &record.bots {
        let output = String::from_utf8_lossy(&bot.output);
        assert!(output.contains("waiting for bot to connect"), "{output}");
    }
}

#[test]
fn bot_ignoring_goodbye_is_killed() {
    if !has_bash() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let stubborn = write_bot(
        dir.path(),
        "stubborn",
        &[],
        &["bash", "bot.sh"],
        &bash_bot("D", "exec sleep 30"),
    );
    let polite = default_bot(dir.path(), "polite", "D");

    let started = Instant::now();
    let runner = MatchRunner::new(
        kuhn(),
        quiet().with_num_rounds(2),
        constraints().build().unwrap(),
        Dealer::shuffled(None),
    );
    let record = runner
        .run([("stubborn".into(), stubborn), ("polite".into(), polite)])
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    let output = String::from_utf8_lossy(&record.bots[0].output);
    assert!(output.contains("Timed out waiting for stubborn to quit"), "{output}");
    let output = String::from_utf8_lossy(&record.bots[1].output);
    assert!(!output.contains("Timed out"), "{output}");
}

#[test]
fn tournament_plays_every_ordered_pair_once() {
    if !has_bash() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let bots = dir.path().join("bots");
    default_bot(&bots, "checker", "D");
    default_bot(&bots, "bettor", "U");
    default_bot(&bots, "caller", "U");
    let out = dir.path().join("out");

    let tournament = Tournament::new(
        kuhn(),
        quiet().with_num_rounds(4),
        constraints().build().unwrap(),
    );
    let summary = tournament.run(&bots, &out, None).unwrap();
    assert_eq!(summary.played.len(), 6, "{summary:?}");
    assert!(summary.failed.is_empty());
    assert!(summary.played.contains(&"bettor.checker".to_string()));
    assert!(summary.played.contains(&"checker.bettor".to_string()));

    let scores = analyze_scores(&out).unwrap();
    assert_eq!(scores.len(), 3);
    assert!(scores.iter().all(|score| score.samples == 4));
    let total = scores.iter().map(|score| score.mean).sum::<f64>();
    assert!(total.abs() < 1e-9);
    assert!(out.join(MEAN_SCORES_FILE).is_file());

    // nothing changed: every pairing is up to date
    let summary = tournament.run(&bots, &out, None).unwrap();
    assert!(summary.played.is_empty());
    assert_eq!(summary.skipped.len(), 6);
}

#[test]
fn duplicate_tournament_tags_outputs() {
    if !has_bash() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let bots = dir.path().join("bots");
    default_bot(&bots, "checker", "D");
    default_bot(&bots, "bettor", "U");
    let deals = dir.path().join("deals.txt");
    fs::write(&deals, "0,1,2\n2,1,0\n1,2,0\n").unwrap();
    let out = dir.path().join("out");

    let tournament = Tournament::new(
        kuhn(),
        quiet().with_num_rounds(3),
        constraints().build().unwrap(),
    );
    let summary = tournament.run(&bots, &out, Some(deals.as_path())).unwrap();
    assert_eq!(summary.played.len(), 2);

    let id = bot_arena::deck::duplicate_id(&deals).unwrap();
    let read = |name: String| fs::read_to_string(out.join(name)).unwrap();
    let forward = read(format!("scores.bettor.checker{id}.txt"));
    let backward = read(format!("scores.checker.bettor{id}.txt"));
    assert!(forward.starts_with("bettor,"));
    assert!(backward.starts_with("checker,"));

    let transcript = read(format!("gamelog.bettor.checker{id}.txt"));
    // seats are kept in duplicate mode
    assert!(transcript.contains("Round #3, bettor ("));
}
