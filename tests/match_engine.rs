use std::time::Duration;

use bot_arena::{match_runner::MatchRecord, prelude::*};
use serde_json::Value;

mod common;
use common::*;

fn play(
    variant: &str,
    config: Configuration,
    dealer: Dealer,
    bots: [BotProcess; 2],
) -> MatchRecord {
    let variant = variant.parse::<GameVariant>().unwrap();
    MatchRunner::new(variant, config, constraints(), dealer)
        .run_with_bots(bots)
        .unwrap()
}

fn duplicate_dealer(dir: &std::path::Path, deals: &[&[u8]]) -> Dealer {
    let path = duplicate_file(dir, deals);
    Dealer::duplicate(DuplicateFile::open(&path).unwrap(), Some(0))
}

fn contains_line(record: &MatchRecord, line: &str) -> bool {
    record.transcript.iter().any(|l| l == line)
}

#[test]
fn kuhn_showdown() {
    let dir = tempfile::tempdir().unwrap();
    let config = quiet().with_num_rounds(1);
    let (a, a_seen) = bot("a", config, sequence(&["D", "U"]));
    let (b, b_seen) = bot("b", config, always("U"));

    let record = play("kuhn", config, duplicate_dealer(dir.path(), &[&[2, 0, 1]]), [a, b]);
    assert_eq!(record.bots[0].bankroll, 2);
    assert_eq!(record.bots[1].bankroll, -2);
    assert_eq!(record.rounds[0].deltas, [2, -2]);
    assert_eq!(record.rounds[0].actions, vec![Action::Down, Action::Up, Action::Up]);
    assert!(record.rounds[0].showdown);

    for line in [
        "Round #1, a (0), b (0)",
        "a posts the ante of 1",
        "a dealt [2]",
        "b dealt [0]",
        "a down",
        "b up",
        "a up",
        "a shows [2]",
        "b shows [0]",
        "a awarded 2",
        "b awarded -2",
        "Final, b (-2), a (2)",
    ] {
        assert!(
            contains_line(&record, line),
            "missing '{line}' in {:#?}",
            record.transcript
        );
    }

    let a_seen = a_seen.join().unwrap();
    let b_seen = b_seen.join().unwrap();
    assert!(a_seen[0].starts_with(r#"[{"type":"time","time":"#));
    assert!(a_seen[0].contains(r#"{"type":"hello"}"#));
    assert!(a_seen[0].contains(r#""hands":[2,null],"new_game":true"#));
    assert!(b_seen[0].contains(r#""hands":[null,0],"new_game":true"#));
    // b learns a checked before being asked
    assert!(b_seen[0].contains(r#"{"type":"action","action":{"verb":"D"},"seat":0}"#));

    let last_round = &a_seen[a_seen.len() - 2];
    assert!(last_round.contains(r#""hands":[2,0]"#));
    assert!(last_round.contains(r#"{"type":"payoff","payoff":2}"#));
    assert!(a_seen.last().unwrap().contains("goodbye"));
}

#[test]
fn kuhn_fold_keeps_hands_hidden() {
    let dir = tempfile::tempdir().unwrap();
    let config = quiet().with_num_rounds(1);
    let (a, a_seen) = bot("a", config, always("U"));
    let (b, b_seen) = bot("b", config, always("D"));

    let record = play("kuhn", config, duplicate_dealer(dir.path(), &[&[2, 0, 1]]), [a, b]);
    assert_eq!(record.rounds[0].deltas, [1, -1]);
    assert!(!record.rounds[0].showdown);
    assert!(!record.transcript.iter().any(|l| l.contains("shows")));

    for seen in [a_seen.join().unwrap(), b_seen.join().unwrap()] {
        assert!(!seen.iter().any(|line| line.contains(r#""hands":[2,0]"#)));
    }
}

#[test]
fn new_game_info_only_shows_own_hand() {
    let config = quiet().with_num_rounds(30);
    let (a, a_seen) = bot("a", config, always("U"));
    let (b, b_seen) = bot("b", config, always("D"));
    let record = play("kuhn", config, Dealer::shuffled(Some(11)), [a, b]);
    assert_eq!(record.rounds.len(), 30);
    assert!(record.rounds.iter().all(|round| !round.showdown));

    for seen in [a_seen.join().unwrap(), b_seen.join().unwrap()] {
        let infos = seen
            .iter()
            .flat_map(|line| serde_json::from_str::<Vec<Value>>(line).unwrap())
            .filter(|message| message["type"] == "info")
            .collect::<Vec<_>>();
        assert_eq!(infos.len(), 30);
        for message in infos {
            let info = &message["info"];
            assert_eq!(info["new_game"], true);
            let seat = info["seat"].as_u64().unwrap() as usize;
            let hands = info["hands"].as_array().unwrap();
            assert!(!hands[seat].is_null());
            assert!(hands[1 - seat].is_null());
        }
    }
}

#[test]
fn rock_beats_scissors_and_moves_stay_hidden() {
    let config = quiet().with_num_rounds(1);
    let (a, _) = bot("a", config, always("R"));
    let (b, b_seen) = bot("b", config, always("S"));

    let record = play("rps", config, Dealer::shuffled(Some(3)), [a, b]);
    assert_eq!(record.bots[0].bankroll, 1);
    assert_eq!(record.bots[1].bankroll, -1);
    assert!(contains_line(&record, "a rock"));
    assert!(contains_line(&record, "b scissors"));

    let b_seen = b_seen.join().unwrap();
    assert!(!b_seen[0].contains(r#""verb":"R""#));
    assert!(b_seen[1].contains(r#""verb":"R""#));
    assert!(b_seen[1].contains(r#""verb":"S""#));
}

#[test]
fn rock_vs_rock_is_a_tie() {
    let config = quiet().with_num_rounds(4);
    let (a, _) = bot("a", config, always("R"));
    let (b, _) = bot("b", config, always("R"));
    let record = play("rps", config, Dealer::shuffled(None), [a, b]);
    assert!(record.rounds.iter().all(|round| round.deltas == [0, 0]));
    assert_eq!(record.score(0), 0.0);
}

#[test]
fn restricted_rock_needs_the_token() {
    let dir = tempfile::tempdir().unwrap();
    let config = quiet().with_num_rounds(1);
    let (a, _) = bot("a", config, always("R"));
    let (b, _) = bot("b", config, always("R"));

    let dealer = duplicate_dealer(dir.path(), &[&[0, 3, 1, 2]]);
    let record = play("rps-restricted", config, dealer, [a, b]);
    assert!(contains_line(&record, "a attempted illegal rock"));
    assert!(contains_line(&record, "a paper"));
    assert!(contains_line(&record, "b rock"));
    assert_eq!(record.rounds[0].deltas, [1, -1]);
}

#[test]
fn faulty_bots_still_finish_the_match() {
    let dir = tempfile::tempdir().unwrap();
    let config = quiet().with_num_rounds(20);
    let absent = absent_bot("a", dir.path(), config);
    let replies = raw(&[
        "not json",
        r#"{"type":"action"}"#,
        "[]",
        r#"{"type":"action","action":{"verb":"X"}}"#,
    ]);
    let (b, _) = bot("b", config, replies);

    let record = play("kuhn", config, Dealer::shuffled(Some(5)), [absent, b]);
    assert_eq!(record.rounds.len(), 20);
    assert_eq!(record.bots[0].bankroll + record.bots[1].bankroll, 0);
    assert!(record.transcript.iter().any(|l| l.starts_with("b response misformatted")));
    assert!(contains_line(&record, "b did not act"));
    let disconnects = record
        .transcript
        .iter()
        .filter(|l| *l == "b disconnected")
        .count();
    assert_eq!(disconnects, 1);
    assert!(!record
        .transcript
        .iter()
        .any(|l| l.starts_with("a ") && l.contains("connected")));

    let output = String::from_utf8_lossy(&record.bots[0].output);
    assert!(output.contains("commands.json"));
}

#[test]
fn exhausted_clock_stays_exhausted() {
    let config = quiet().with_num_rounds(10);
    let tight = ConstraintsBuilder::new()
        .with_game_clock(Duration::from_millis(200))
        .with_disconnect_timeout(Duration::from_millis(500))
        .build()
        .unwrap();
    let delay = Duration::from_millis(80);
    let (slow, _) = scripted_bot("slow", config, &tight, delay, always("U"));
    let (fast, _) = bot("fast", config, always("D"));

    let record = play("kuhn", config, Dealer::shuffled(Some(9)), [slow, fast]);
    assert_eq!(record.rounds.len(), 10);
    let timeouts = record
        .transcript
        .iter()
        .enumerate()
        .filter_map(|(i, l)| (l == "slow ran out of time").then_some(i))
        .collect::<Vec<_>>();
    assert_eq!(timeouts.len(), 1);
    // every later move of the slow bot is the fallback
    assert!(!record.transcript[timeouts[0]..].contains(&"slow up".to_string()));
    assert!(record.bots[0].player_messages.len() < 3);
    // nothing but goodbye is sent once the clock is gone
    assert!(record.bots[0].server_messages.len() <= 4);
    let goodbye = record.bots[0].server_messages.last().unwrap();
    let packet = serde_json::from_str::<Vec<Value>>(goodbye).unwrap();
    let kinds = packet.iter().map(|m| m["type"].as_str().unwrap()).collect::<Vec<_>>();
    assert_eq!(kinds, vec!["time", "goodbye"]);
}

#[test]
fn same_deals_same_match() {
    let dir = tempfile::tempdir().unwrap();
    let path = duplicate_file(
        dir.path(),
        &[&[0, 1, 2], &[2, 1, 0], &[1, 2, 0], &[1, 0, 2], &[0, 2, 1], &[2, 0, 1]],
    );
    let run = || {
        let config = quiet().with_num_rounds(6);
        let (a, _) = bot("a", config, sequence(&["U", "D", "D", "U", "U"]));
        let (b, _) = bot("b", config, sequence(&["D", "U", "U", "D"]));
        let dealer = Dealer::duplicate(DuplicateFile::open(&path).unwrap(), None);
        play("kuhn", config, dealer, [a, b])
    };

    let first = run();
    let second = run();
    assert_eq!(first.transcript, second.transcript);
    assert_eq!(first.rounds, second.rounds);
    assert_eq!(first.rounds[1].deck, vec![2, 1, 0]);
    assert_eq!(first.fallback_rounds, 0);
    assert!(first.duplicate_id.as_deref().unwrap().starts_with(".D"));
}

#[test]
fn short_duplicate_file_falls_back_to_shuffles() {
    let dir = tempfile::tempdir().unwrap();
    let config = quiet().with_num_rounds(5);
    let (a, _) = bot("a", config, always("D"));
    let (b, _) = bot("b", config, always("D"));

    let dealer = duplicate_dealer(dir.path(), &[&[1, 0, 2], &[0, 2, 1]]);
    let record = play("kuhn", config, dealer, [a, b]);
    assert_eq!(record.rounds.len(), 5);
    assert_eq!(record.fallback_rounds, 3);
    assert_eq!(record.rounds[0].deck, vec![1, 0, 2]);
    assert_eq!(record.rounds[1].deck, vec![0, 2, 1]);
}

#[test]
fn outputs_are_written() {
    let dir = tempfile::tempdir().unwrap();
    let config = quiet().with_num_rounds(1);
    let (a, _) = bot("a", config, sequence(&["D", "U"]));
    let (b, _) = bot("b", config, always("U"));
    let record = play("kuhn", config, duplicate_dealer(dir.path(), &[&[2, 0, 1]]), [a, b]);

    let out = dir.path().join("out");
    let layout = record.layout(&out);
    record.write(&layout).unwrap();

    let id = record.duplicate_id.clone().unwrap();
    assert_eq!(layout.stem(), format!("a.b{id}"));
    let scores = std::fs::read_to_string(out.join(format!("scores.a.b{id}.txt"))).unwrap();
    assert_eq!(scores, "a,2\nb,-2\n");

    let transcript = std::fs::read_to_string(layout.game_log()).unwrap();
    assert!(transcript.starts_with("Bot Arena kuhn - a vs b"));
    for bot in ["a", "b"] {
        let server = std::fs::read_to_string(layout.server_messages(bot)).unwrap();
        let sent = &record.bots.iter().find(|r| r.name == bot).unwrap().server_messages;
        assert_eq!(server.lines().count(), sent.len());
        assert!(layout.player_messages(bot).is_file());
        assert!(layout.bot_output(bot).is_file());
    }
}
