//! Chance model.
//!
//! A [`Deck`] is the ordered card sequence of one round. The [`Dealer`] produces one deck per
//! round, either by shuffling the variant's card set or, in duplicate mode, by replaying the next
//! line of a [`DuplicateFile`] so that different pairings can be compared on identical deals.

use std::{
    fs::File,
    io::{BufRead, BufReader, Lines},
    path::{Path, PathBuf},
    sync::Arc,
    time::UNIX_EPOCH,
};

use anyhow::{bail, Context};
use rand::{seq::SliceRandom, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::game_rules::GameRules;

/// A card is its value; higher beats lower in comparative games.
pub type Card = u8;

/// Dealing past the end of a deck. Only reachable through a programming error in the game rules,
/// so it aborts the match.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("no more cards to deal ({dealt} already dealt)")]
pub struct DeckExhausted {
    pub dealt: usize,
}

#[derive(Debug, Clone)]
pub struct Deck {
    cards: Arc<[Card]>,
    index: usize,
}

impl Deck {
    /// A deck dealing `cards` in order.
    pub fn from_cards(cards: Vec<Card>) -> Deck {
        Deck {
            cards: Arc::from(cards),
            index: 0,
        }
    }

    /// A uniformly shuffled copy of `card_set`.
    pub fn shuffled(card_set: &[Card], rng: &mut ChaCha20Rng) -> Deck {
        let mut cards = card_set.to_vec();
        cards.shuffle(rng);
        Deck::from_cards(cards)
    }

    pub fn deal(&mut self) -> Result<Card, DeckExhausted> {
        let card = *self
            .cards
            .get(self.index)
            .ok_or(DeckExhausted { dealt: self.index })?;
        self.index += 1;
        Ok(card)
    }

    /// The whole sequence, dealt or not.
    pub fn cards(&self) -> Arc<[Card]> {
        Arc::clone(&self.cards)
    }

    pub fn remaining(&self) -> usize {
        self.cards.len().saturating_sub(self.index)
    }
}

/// Compute the tag identifying a duplicate file: `.D` followed by the first six hex digits of
/// the SHA-256 of `"{absolute path}|{modification time}"`.
///
/// Results produced against an edited file get a different tag, so they never collide with stale
/// ones.
pub fn duplicate_id(path: &Path) -> anyhow::Result<String> {
    let full_path = std::path::absolute(path)
        .with_context(|| format!("could not resolve '{}'", path.display()))?;
    let mtime = full_path
        .metadata()
        .and_then(|m| m.modified())
        .with_context(|| format!("could not read modification time of '{}'", path.display()))?
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    let digest = Sha256::digest(format!("{}|{mtime}", full_path.display()).as_bytes());
    let hex = format!("{digest:x}");
    Ok(format!(".D{}", &hex[..6]))
}

/// Pre-recorded deals, one comma-separated card sequence per line.
///
/// Opened once for a whole match and read sequentially, one line per round. Two matches must not
/// read the same file at the same time.
#[derive(Debug)]
pub struct DuplicateFile {
    path: PathBuf,
    id: String,
    lines: Lines<BufReader<File>>,
}

impl DuplicateFile {
    #[instrument]
    pub fn open(path: &Path) -> anyhow::Result<DuplicateFile> {
        let file = File::open(path)
            .with_context(|| format!("could not open duplicate file '{}'", path.display()))?;
        let id = duplicate_id(path)?;
        info!(%id, "duplicate file opened");
        Ok(DuplicateFile {
            path: path.to_path_buf(),
            id,
            lines: BufReader::new(file).lines(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Next recorded sequence, `Ok(None)` once the file is exhausted.
    pub fn next_sequence(&mut self) -> anyhow::Result<Option<Vec<Card>>> {
        let Some(line) = self.lines.next() else {
            return Ok(None);
        };
        let line = line.context("could not read duplicate file")?;
        let line = line.trim();
        if line.is_empty() {
            bail!("empty line in duplicate file");
        }
        let cards = line
            .split(',')
            .map(|c| {
                c.trim()
                    .parse::<Card>()
                    .with_context(|| format!("invalid card '{c}'"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Some(cards))
    }

    pub fn close(self) {
        info!(path = %self.path.display(), "duplicate file closed");
    }
}

/// Every card belongs to `card_set` and none is repeated.
fn is_deal_from(cards: &[Card], card_set: &[Card]) -> bool {
    cards
        .iter()
        .enumerate()
        .all(|(i, card)| card_set.contains(card) && !cards[..i].contains(card))
}

/// Produces one deck per round.
#[derive(Debug)]
pub struct Dealer {
    rng: ChaCha20Rng,
    duplicate: Option<DuplicateFile>,
    fallback_rounds: usize,
}

impl Dealer {
    /// Shuffle every round. A fixed `seed` makes the deals reproducible.
    pub fn shuffled(seed: Option<u64>) -> Dealer {
        Dealer {
            rng: ChaCha20Rng::seed_from_u64(seed.unwrap_or_else(rand::random::<u64>)),
            duplicate: None,
            fallback_rounds: 0,
        }
    }

    /// Replay `file`, shuffling (with `seed`) only for rounds the file cannot provide.
    pub fn duplicate(file: DuplicateFile, seed: Option<u64>) -> Dealer {
        Dealer {
            duplicate: Some(file),
            ..Dealer::shuffled(seed)
        }
    }

    pub fn duplicate_id(&self) -> Option<&str> {
        self.duplicate.as_ref().map(DuplicateFile::id)
    }

    /// Rounds for which the duplicate file could not provide a deal.
    pub fn fallback_rounds(&self) -> usize {
        self.fallback_rounds
    }

    pub fn next_deck<R: GameRules + ?Sized>(&mut self, rules: &R) -> Deck {
        let card_set = rules.card_set();
        let Some(file) = self.duplicate.as_mut() else {
            return Deck::shuffled(&card_set, &mut self.rng);
        };

        match file.next_sequence() {
            Ok(Some(cards)) if cards.len() < rules.cards_dealt() => warn!(
                "duplicate deal {cards:?} is too short ({} cards needed), shuffling this round",
                rules.cards_dealt()
            ),
            Ok(Some(cards)) if !is_deal_from(&cards, &card_set) => warn!(
                "duplicate deal {cards:?} is not drawn from {card_set:?}, shuffling this round"
            ),
            Ok(Some(cards)) => return Deck::from_cards(cards),
            Ok(None) => warn!("duplicate file exhausted, shuffling this round"),
            Err(e) => warn!("duplicate file unreadable ({e:#}), shuffling this round"),
        }
        self.fallback_rounds += 1;
        Deck::shuffled(&card_set, &mut self.rng)
    }

    /// Release the duplicate file, if any.
    pub fn close(self) {
        if let Some(file) = self.duplicate {
            file.close();
        }
    }
}
