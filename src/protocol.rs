//! Line-delimited JSON protocol spoken with bots.
//!
//! The engine sends one packet per line: a JSON array of [`Message`]s, always starting with a
//! `time` message. A bot answers every line with exactly one line holding a single message object
//! or an array of them. Only `action` messages matter in a reply; anything the engine cannot
//! make sense of becomes a [`ReplyFault`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::error;

use crate::{actions::Action, deck::Card, round_state::Chips};

/// One protocol message, tagged by its `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    Hello,
    /// Remaining game clock, in seconds.
    Time { time: f64 },
    Info { info: Info },
    Action {
        action: ActionBody,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seat: Option<usize>,
    },
    Payoff { payoff: Chips },
    Goodbye,
}

impl Message {
    /// An action taken by `seat`.
    pub fn action(action: Action, seat: usize) -> Message {
        Message::Action {
            action: ActionBody {
                verb: action.verb().to_string(),
            },
            seat: Some(seat),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionBody {
    pub verb: String,
}

/// Round information addressed to one seat.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Info {
    pub seat: usize,
    /// One entry per seat; hidden hands are `null`.
    pub hands: Vec<Option<Card>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_game: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

/// Why a reply line could not be turned into an action.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReplyFault {
    #[error("empty response")]
    Empty,
    #[error("not valid JSON ({0})")]
    NotJson(String),
    #[error("expected an object or an array of objects")]
    NotObject,
    #[error("missing field '{0}'")]
    MissingField(&'static str),
    #[error("unknown message type '{0}'")]
    UnknownType(String),
    #[error("unknown action verb '{0}'")]
    UnknownVerb(String),
}

const PASSIVE_TYPES: [&str; 5] = ["hello", "time", "info", "payoff", "goodbye"];

/// Serialize one outbound packet, without the trailing newline.
pub fn encode_packet(packet: &[Message]) -> String {
    serde_json::to_string(packet).unwrap_or_else(|e| {
        error!("could not encode packet: {e}");
        String::from("[]")
    })
}

/// Decode a reply line into the first action it carries.
///
/// `Ok(None)` means the reply was well formed but held no action message.
pub fn decode_reply(line: &str) -> Result<Option<Action>, ReplyFault> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ReplyFault::Empty);
    }
    let value: Value =
        serde_json::from_str(line).map_err(|e| ReplyFault::NotJson(e.to_string()))?;
    let messages = match value {
        Value::Array(messages) => messages,
        object @ Value::Object(_) => vec![object],
        _ => return Err(ReplyFault::NotObject),
    };

    let mut action = None;
    for message in &messages {
        if !message.is_object() {
            return Err(ReplyFault::NotObject);
        }
        let kind = message
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ReplyFault::MissingField("type"))?;
        if PASSIVE_TYPES.contains(&kind) {
            continue;
        }
        if kind != "action" {
            return Err(ReplyFault::UnknownType(kind.to_string()));
        }
        let verb = message
            .get("action")
            .ok_or(ReplyFault::MissingField("action"))?
            .get("verb")
            .and_then(Value::as_str)
            .ok_or(ReplyFault::MissingField("verb"))?;
        let decoded = Action::from_verb(verb).ok_or(ReplyFault::UnknownVerb(verb.to_string()))?;
        action.get_or_insert(decoded);
    }
    Ok(action)
}
