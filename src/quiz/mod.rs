pub mod content;
pub mod deck;
pub mod engine;
pub mod router;
pub mod session;
pub mod template;

use std::{fmt, str::FromStr, time::Duration};

/// One of the four answer slots of a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Choice {
    A,
    B,
    C,
    D,
}

impl Choice {
    pub const ALL: [Choice; 4] = [Choice::A, Choice::B, Choice::C, Choice::D];

    pub fn label(self) -> &'static str {
        match self {
            Choice::A => "A",
            Choice::B => "B",
            Choice::C => "C",
            Choice::D => "D",
        }
    }
}

impl FromStr for Choice {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A" => Ok(Choice::A),
            "B" => Ok(Choice::B),
            "C" => Ok(Choice::C),
            "D" => Ok(Choice::D),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Named commands reachable from inline buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizCommand {
    /// Start a new game.
    Go,
    /// Move on to the next question after feedback.
    Next,
    /// Show the final result.
    Final,
}

impl QuizCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            QuizCommand::Go => "go",
            QuizCommand::Next => "next",
            QuizCommand::Final => "final",
        }
    }
}

impl FromStr for QuizCommand {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "go" => Ok(QuizCommand::Go),
            "next" => Ok(QuizCommand::Next),
            "final" => Ok(QuizCommand::Final),
            _ => Err(()),
        }
    }
}

/// A user interaction delivered by the chat transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The `/start` onboarding command.
    Start,
    Text(String),
    Answer(Choice),
    Navigate(String),
    Command(QuizCommand),
    /// A click on a tracked outbound link.
    Link(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    OpenUrl(String),
    Screen(String),
    Command(QuizCommand),
    Answer(Choice),
    Link(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    pub label: String,
    pub action: Action,
}

impl Control {
    pub fn new(label: impl Into<String>, action: Action) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }
}

/// What the transport should show the user. Captions are Telegram HTML.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Render {
    pub image: Option<String>,
    pub caption: String,
    /// Rows of inline buttons.
    pub controls: Vec<Vec<Control>>,
    /// Phrases offered on the reply keyboard. Ignored when `controls` is set.
    pub reply_keyboard: Vec<String>,
    /// Delete the message again after this delay.
    pub dismiss_after: Option<Duration>,
}

impl Render {
    pub fn text(caption: impl Into<String>) -> Self {
        Self {
            caption: caption.into(),
            ..Default::default()
        }
    }

    pub fn with_image(mut self, image: Option<String>) -> Self {
        self.image = image.filter(|i| !i.trim().is_empty());
        self
    }

    pub fn with_row(mut self, row: Vec<Control>) -> Self {
        if !row.is_empty() {
            self.controls.push(row);
        }
        self
    }

    pub fn with_reply_keyboard(mut self, phrases: Vec<String>) -> Self {
        self.reply_keyboard = phrases;
        self
    }
}

/// Joins an optional bold title and a body the way every screen is laid out.
pub fn caption(title: &str, body: &str) -> String {
    match (title.trim().is_empty(), body.trim().is_empty()) {
        (true, _) => body.to_string(),
        (false, true) => format!("<b>{}</b>", title),
        (false, false) => format!("<b>{}</b>\n\n{}", title, body),
    }
}
