use crate::{
    actions::{Action, ActionSet},
    deck::Card,
    round_state::{Chips, Node, RoundState, TerminalState, NUM_SEATS},
};

use super::{sanitize, GameRules};

/// Kuhn poker: three cards, one private card each, a single street with one fixed-size bet.
///
/// `Down` checks or folds, `Up` bets or calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KuhnPoker {
    pub ante: Chips,
    pub bet_size: Chips,
    pub starting_stack: Chips,
}

impl Default for KuhnPoker {
    fn default() -> Self {
        KuhnPoker {
            ante: 1,
            bet_size: 1,
            starting_stack: 2,
        }
    }
}

impl GameRules for KuhnPoker {
    fn name(&self) -> &'static str {
        "kuhn"
    }

    fn card_set(&self) -> Vec<Card> {
        vec![0, 1, 2]
    }

    fn ante(&self) -> Chips {
        self.ante
    }

    fn starting_stack(&self) -> Chips {
        self.starting_stack
    }

    fn legal_actions(&self, state: &RoundState) -> ActionSet {
        let active = state.active_seat();
        let inactive = 1 - active;
        let cost = if state.pips[active] == state.pips[inactive] {
            self.bet_size
        } else {
            state.pips[inactive] - state.pips[active]
        };
        let legal = ActionSet::empty().with(Action::Down);
        if state.stacks[active] >= cost {
            legal.with(Action::Up)
        } else {
            legal
        }
    }

    fn proceed(&self, state: &RoundState, action: Action) -> Node {
        let action = sanitize(self, state, action);
        let active = state.active_seat();
        let inactive = 1 - active;
        let mut pips = state.pips;
        let mut stacks = state.stacks;

        if action == Action::Up {
            if pips[active] == pips[inactive] {
                // bet
                pips[active] += self.bet_size;
                stacks[active] -= self.bet_size;
                return Node::Round(state.advance(action, pips, stacks));
            }
            // call, then the street is over
            stacks[active] -= pips[inactive] - pips[active];
            pips[active] = pips[inactive];
            let next = state.advance(action, pips, stacks);
            return self.proceed_street(&next);
        }

        let next = state.advance(action, pips, stacks);
        if state.turn_number == 0 {
            Node::Round(next)
        } else if pips[active] == pips[inactive] {
            self.proceed_street(&next)
        } else {
            // fold: the active seat forfeits what it committed
            let mut deltas = [0; NUM_SEATS];
            deltas[active] = -pips[active];
            deltas[inactive] = pips[active];
            Node::Terminal(TerminalState::new(deltas, next))
        }
    }

    fn showdown(&self, state: &RoundState) -> TerminalState {
        let winner = if state.hands[0] > state.hands[1] { 0 } else { 1 };
        let loser = 1 - winner;
        let mut deltas = [0; NUM_SEATS];
        deltas[winner] = state.pips[loser];
        deltas[loser] = -state.pips[loser];
        TerminalState::new(deltas, state.clone())
    }

    fn max_turns(&self) -> usize {
        3
    }
}
