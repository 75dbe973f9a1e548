//! Extensive-form game tree nodes.
//!
//! A [`RoundState`] is an immutable value: every transition builds a new node whose
//! `previous_state` is the generation of its parent. Nodes of one round are kept in a
//! [`RoundHistory`] arena so the chain can be walked back for tracing or replay without holding
//! live references between nodes.

use std::sync::Arc;

use crate::actions::Action;
use crate::deck::Card;

/// Number of seats at the table.
pub const NUM_SEATS: usize = 2;

/// Chip amounts. Signed so payoffs and deltas share the type.
pub type Chips = i32;

/// A non-terminal node of a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundState {
    /// Number of actions taken so far. Its parity selects the active seat.
    pub turn_number: usize,
    /// Game-rule defined phase index.
    pub street: usize,
    /// Chips committed by each seat during the current street.
    pub pips: [Chips; NUM_SEATS],
    /// Chips remaining for each seat.
    pub stacks: [Chips; NUM_SEATS],
    /// Private card of each seat. Use [`RoundState::visible_hands`] to build a seat's view.
    pub hands: [Card; NUM_SEATS],
    /// The dealt sequence, shared between every node of the round.
    pub deck: Arc<[Card]>,
    /// Actions taken so far, oldest first.
    pub action_history: Vec<Action>,
    /// Index of this node in its round's [`RoundHistory`].
    pub generation: usize,
    /// Generation of the parent node, `None` for the root.
    pub previous_state: Option<usize>,
}

impl RoundState {
    /// First node of a round.
    pub fn root(
        pips: [Chips; NUM_SEATS],
        stacks: [Chips; NUM_SEATS],
        hands: [Card; NUM_SEATS],
        deck: Arc<[Card]>,
    ) -> RoundState {
        RoundState {
            turn_number: 0,
            street: 0,
            pips,
            stacks,
            hands,
            deck,
            action_history: vec![],
            generation: 0,
            previous_state: None,
        }
    }

    /// Child node reached by `action`, with updated chip counts.
    pub fn advance(
        &self,
        action: Action,
        pips: [Chips; NUM_SEATS],
        stacks: [Chips; NUM_SEATS],
    ) -> RoundState {
        let mut action_history = self.action_history.clone();
        action_history.push(action);
        RoundState {
            turn_number: self.turn_number + 1,
            street: self.street,
            pips,
            stacks,
            hands: self.hands,
            deck: Arc::clone(&self.deck),
            action_history,
            generation: self.generation + 1,
            previous_state: Some(self.generation),
        }
    }

    /// Seat expected to act at this node.
    pub fn active_seat(&self) -> usize {
        self.turn_number % NUM_SEATS
    }

    /// Total chips committed this street.
    pub fn pot(&self) -> Chips {
        self.pips.iter().sum()
    }

    /// Hands as seen by `seat`: every entry but its own is hidden.
    pub fn visible_hands(&self, seat: usize) -> [Option<Card>; NUM_SEATS] {
        let mut visible = [None; NUM_SEATS];
        if let Some(own) = visible.get_mut(seat) {
            *own = Some(self.hands[seat]);
        }
        visible
    }
}

/// End of a round. Never transitions further.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalState {
    /// Payoff of each seat. Always sums to zero.
    pub deltas: [Chips; NUM_SEATS],
    /// The node that produced this result.
    pub previous_state: RoundState,
}

impl TerminalState {
    pub fn new(deltas: [Chips; NUM_SEATS], previous_state: RoundState) -> Self {
        debug_assert_eq!(deltas.iter().sum::<Chips>(), 0, "payoffs must be zero-sum");
        TerminalState {
            deltas,
            previous_state,
        }
    }

    /// True when contributions were equal at the end, i.e. the round ended in a showdown
    /// rather than a fold.
    pub fn is_showdown(&self) -> bool {
        self.previous_state.pips[0] == self.previous_state.pips[1]
    }
}

/// Result of a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Round(RoundState),
    Terminal(TerminalState),
}

/// Append-only arena holding every [`RoundState`] of one round, indexed by generation.
#[derive(Debug, Default)]
pub struct RoundHistory {
    nodes: Vec<RoundState>,
}

impl RoundHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a node. Nodes must be recorded in generation order.
    pub fn record(&mut self, state: &RoundState) {
        debug_assert_eq!(
            state.generation,
            self.nodes.len(),
            "nodes must be recorded in generation order"
        );
        self.nodes.push(state.clone());
    }

    pub fn get(&self, generation: usize) -> Option<&RoundState> {
        self.nodes.get(generation)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Walk from `generation` back to the root.
    pub fn trace(&self, generation: usize) -> impl Iterator<Item = &RoundState> + '_ {
        let mut next = self.get(generation);
        std::iter::from_fn(move || {
            let current = next?;
            next = current.previous_state.and_then(|g| self.get(g));
            Some(current)
        })
    }
}
