use crate::{
    actions::{Action, ActionSet},
    deck::Card,
    round_state::{Chips, Node, RoundState, TerminalState, NUM_SEATS},
};

use super::{sanitize, GameRules};

/// Card allowing its holder to throw rock in the restricted game.
pub const ROCK_TOKEN: Card = 3;

/// Simultaneous-choice game. Seat 0 chooses, then seat 1, and both choices are resolved
/// together: rock beats scissors, scissors beats paper, paper beats rock, same throws tie.
///
/// In the restricted game a seat may only throw rock when it was dealt [`ROCK_TOKEN`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RockPaperScissors {
    pub ante: Chips,
    pub restricted: bool,
}

impl RockPaperScissors {
    pub fn classic() -> Self {
        RockPaperScissors {
            ante: 1,
            restricted: false,
        }
    }

    pub fn restricted() -> Self {
        RockPaperScissors {
            ante: 1,
            restricted: true,
        }
    }
}

impl Default for RockPaperScissors {
    fn default() -> Self {
        Self::classic()
    }
}

fn beats(a: Action, b: Action) -> bool {
    matches!(
        (a, b),
        (Action::Rock, Action::Scissors)
            | (Action::Scissors, Action::Paper)
            | (Action::Paper, Action::Rock)
    )
}

impl GameRules for RockPaperScissors {
    fn name(&self) -> &'static str {
        if self.restricted {
            "restricted-rock-paper-scissors"
        } else {
            "rock-paper-scissors"
        }
    }

    fn card_set(&self) -> Vec<Card> {
        vec![0, 1, 2, ROCK_TOKEN]
    }

    fn ante(&self) -> Chips {
        self.ante
    }

    fn starting_stack(&self) -> Chips {
        self.ante
    }

    fn legal_actions(&self, state: &RoundState) -> ActionSet {
        let throws = ActionSet::empty().with(Action::Paper).with(Action::Scissors);
        if !self.restricted || state.hands[state.active_seat()] == ROCK_TOKEN {
            throws.with(Action::Rock)
        } else {
            throws
        }
    }

    fn proceed(&self, state: &RoundState, action: Action) -> Node {
        let action = sanitize(self, state, action);
        let next = state.advance(action, state.pips, state.stacks);
        if next.turn_number < NUM_SEATS {
            Node::Round(next)
        } else {
            self.proceed_street(&next)
        }
    }

    fn showdown(&self, state: &RoundState) -> TerminalState {
        let mut deltas = [0; NUM_SEATS];
        if let [first, second, ..] = state.action_history[..] {
            let winner = if beats(first, second) {
                Some(0)
            } else if beats(second, first) {
                Some(1)
            } else {
                None
            };
            if let Some(winner) = winner {
                let loser = 1 - winner;
                deltas[winner] = state.pips[loser];
                deltas[loser] = -state.pips[loser];
            }
        }
        TerminalState::new(deltas, state.clone())
    }

    fn max_turns(&self) -> usize {
        NUM_SEATS
    }

    fn simultaneous(&self) -> bool {
        true
    }
}
