//! Inline-button payloads.
//!
//! Buttons carry a short `kind:value` string as callback data. Anything that
//! does not decode, for instance a button left over from an older content
//! version, yields `None` and is dropped by the caller without a reply.

use super::{Action, Event};

const SCREEN: &str = "screen";
const COMMAND: &str = "cmd";
const ANSWER: &str = "answer";
const LINK: &str = "link";

/// Telegram's limit on callback data, in bytes.
pub const MAX_DATA_LEN: usize = 64;

/// Callback data for a button. `None` for plain URL buttons and for names too
/// long to fit into [`MAX_DATA_LEN`].
pub fn encode(action: &Action) -> Option<String> {
    let data = match action {
        Action::OpenUrl(_) => return None,
        Action::Screen(name) => format!("{}:{}", SCREEN, name),
        Action::Command(command) => format!("{}:{}", COMMAND, command.as_str()),
        Action::Answer(choice) => format!("{}:{}", ANSWER, choice.label()),
        Action::Link(kind) => format!("{}:{}", LINK, kind),
    };
    (data.len() <= MAX_DATA_LEN).then_some(data)
}

pub fn decode(data: &str) -> Option<Event> {
    let (kind, value) = data.split_once(':')?;
    if value.is_empty() {
        return None;
    }
    match kind {
        SCREEN => Some(Event::Navigate(value.to_string())),
        COMMAND => value.parse().ok().map(Event::Command),
        ANSWER => value.parse().ok().map(Event::Answer),
        LINK => Some(Event::Link(value.to_string())),
        _ => None,
    }
}
