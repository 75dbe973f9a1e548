//! Action tags shared by every game variant.
//!
//! Actions carry no payload: two actions with the same tag are always equal. Each one has a
//! single-character verb used on the wire.

use std::fmt::Display;

/// Every action known to the engine.
///
/// `Up` and `Down` are the aggressive (bet/call) and passive (check/fold) actions of the betting
/// game. `Rock`, `Paper` and `Scissors` belong to the simultaneous-choice game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Action {
    /// Aggressive action, verb `U`.
    Up,
    /// Passive action, verb `D`.
    Down,
    /// Verb `R`.
    Rock,
    /// Verb `P`.
    Paper,
    /// Verb `S`.
    Scissors,
}

impl Action {
    /// All actions in canonical order.
    pub const ALL: [Action; 5] = [
        Action::Up,
        Action::Down,
        Action::Rock,
        Action::Paper,
        Action::Scissors,
    ];

    /// Wire code of the action.
    pub fn verb(self) -> &'static str {
        match self {
            Action::Up => "U",
            Action::Down => "D",
            Action::Rock => "R",
            Action::Paper => "P",
            Action::Scissors => "S",
        }
    }

    /// Decode a wire verb. Returns `None` for anything unknown.
    pub fn from_verb(verb: &str) -> Option<Action> {
        Action::ALL.into_iter().find(|a| a.verb() == verb)
    }

    /// The check/call/fold-equivalent action, preferred by the fallback policy.
    pub fn is_passive(self) -> bool {
        self == Action::Down
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Action::Up => "up",
            Action::Down => "down",
            Action::Rock => "rock",
            Action::Paper => "paper",
            Action::Scissors => "scissors",
        };
        write!(f, "{name}")
    }
}

/// A small set of actions, iterated in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct ActionSet(u8);

impl ActionSet {
    /// The empty set.
    pub const fn empty() -> Self {
        ActionSet(0)
    }

    /// Add an action, builder style.
    #[must_use]
    pub fn with(self, action: Action) -> Self {
        ActionSet(self.0 | action.bit())
    }

    pub fn insert(&mut self, action: Action) {
        self.0 |= action.bit();
    }

    pub fn contains(&self, action: Action) -> bool {
        self.0 & action.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = Action> + '_ {
        Action::ALL.into_iter().filter(|a| self.contains(*a))
    }

    /// The action played on behalf of a bot that failed to produce a legal one.
    ///
    /// The passive action when it is legal, else the first legal action in canonical order.
    /// Reachable states never have an empty legal set; `Down` is returned if one does.
    pub fn fallback(&self) -> Action {
        debug_assert!(!self.is_empty(), "fallback requested for an empty action set");
        if self.contains(Action::Down) {
            return Action::Down;
        }
        self.iter().next().unwrap_or(Action::Down)
    }
}

impl FromIterator<Action> for ActionSet {
    fn from_iter<T: IntoIterator<Item = Action>>(iter: T) -> Self {
        iter.into_iter().fold(ActionSet::empty(), ActionSet::with)
    }
}

impl Display for ActionSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let verbs = self.iter().map(Action::verb).collect::<Vec<_>>().join(",");
        write!(f, "{{{verbs}}}")
    }
}
