//! Pluggable game rules.
//!
//! A variant is one implementation of [`GameRules`]: it decides the legal actions at a node,
//! the transition function, the showdown payoffs and how many cards a round deals. Transitions
//! are pure: they only read the current node and build a new one.
//!
//! Two variants are provided: [`KuhnPoker`] and [`RockPaperScissors`]. [`GameVariant`] selects
//! one of them at runtime.

use std::{fmt::Debug, str::FromStr};

use anyhow::bail;

use crate::{
    actions::{Action, ActionSet},
    deck::{Card, Deck, DeckExhausted},
    round_state::{Chips, Node, RoundState, TerminalState, NUM_SEATS},
};

mod kuhn;
mod rock_paper_scissors;

pub use kuhn::KuhnPoker;
pub use rock_paper_scissors::RockPaperScissors;

/// What a game variant must define.
pub trait GameRules: Debug + Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Cards a fresh deck is made of.
    fn card_set(&self) -> Vec<Card>;

    /// Number of cards a round deals. A duplicate deal shorter than this is rejected.
    fn cards_dealt(&self) -> usize {
        NUM_SEATS
    }

    /// Chips each seat posts before any action.
    fn ante(&self) -> Chips;

    /// Chips each seat starts a round with, ante included.
    fn starting_stack(&self) -> Chips;

    /// Deal the hands and build the root node of a round.
    ///
    /// # Errors
    /// Returns [`DeckExhausted`] if the deck is too short, which is a programming error.
    fn new_round(&self, mut deck: Deck) -> Result<RoundState, DeckExhausted> {
        let hands = [deck.deal()?, deck.deal()?];
        let ante = self.ante();
        let stack = self.starting_stack() - ante;
        Ok(RoundState::root(
            [ante; NUM_SEATS],
            [stack; NUM_SEATS],
            hands,
            deck.cards(),
        ))
    }

    /// Actions the active seat may take. Never empty for a reachable node.
    fn legal_actions(&self, state: &RoundState) -> ActionSet;

    /// Successor of `state` when its active seat plays `action`.
    ///
    /// Passing an action outside [`GameRules::legal_actions`] is a caller error; the rules play
    /// the fallback action of the legal set instead.
    fn proceed(&self, state: &RoundState, action: Action) -> Node;

    /// Resolve the current street. Every provided variant has a single street.
    fn proceed_street(&self, state: &RoundState) -> Node {
        Node::Terminal(self.showdown(state))
    }

    /// Payoffs when the round reaches its end without a fold.
    fn showdown(&self, state: &RoundState) -> TerminalState;

    /// Upper bound on the number of actions in a round.
    fn max_turns(&self) -> usize;

    /// True when actions are revealed only once every seat has chosen.
    fn simultaneous(&self) -> bool {
        false
    }
}

/// Replace an illegal action by the fallback of the legal set.
fn sanitize<R: GameRules + ?Sized>(rules: &R, state: &RoundState, action: Action) -> Action {
    let legal = rules.legal_actions(state);
    if legal.contains(action) {
        action
    } else {
        legal.fallback()
    }
}

/// Runtime selection of a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameVariant {
    Kuhn(KuhnPoker),
    RockPaperScissors(RockPaperScissors),
}

impl GameVariant {
    fn rules(&self) -> &dyn GameRules {
        match self {
            GameVariant::Kuhn(rules) => rules,
            GameVariant::RockPaperScissors(rules) => rules,
        }
    }
}

impl FromStr for GameVariant {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "kuhn" => Ok(GameVariant::Kuhn(KuhnPoker::default())),
            "rps" => Ok(GameVariant::RockPaperScissors(RockPaperScissors::classic())),
            "rps-restricted" => Ok(GameVariant::RockPaperScissors(
                RockPaperScissors::restricted(),
            )),
            other => bail!("unknown game variant '{other}' (expected kuhn, rps or rps-restricted)"),
        }
    }
}

impl GameRules for GameVariant {
    fn name(&self) -> &'static str {
        self.rules().name()
    }

    fn card_set(&self) -> Vec<Card> {
        self.rules().card_set()
    }

    fn cards_dealt(&self) -> usize {
        self.rules().cards_dealt()
    }

    fn ante(&self) -> Chips {
        self.rules().ante()
    }

    fn starting_stack(&self) -> Chips {
        self.rules().starting_stack()
    }

    fn new_round(&self, deck: Deck) -> Result<RoundState, DeckExhausted> {
        self.rules().new_round(deck)
    }

    fn legal_actions(&self, state: &RoundState) -> ActionSet {
        self.rules().legal_actions(state)
    }

    fn proceed(&self, state: &RoundState, action: Action) -> Node {
        self.rules().proceed(state, action)
    }

    fn proceed_street(&self, state: &RoundState) -> Node {
        self.rules().proceed_street(state)
    }

    fn showdown(&self, state: &RoundState) -> TerminalState {
        self.rules().showdown(state)
    }

    fn max_turns(&self) -> usize {
        self.rules().max_turns()
    }

    fn simultaneous(&self) -> bool {
        self.rules().simultaneous()
    }
}
