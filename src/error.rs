//! Error types shared by the bot's startup path and the quiz core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading the environment.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("TELEGRAM_BOT_TOKEN is not set")]
    MissingToken,
    #[error("{var} has an invalid value {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Errors raised while loading the content document.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ContentError {
    #[error("no content file found (tried {tried:?})")]
    NotFound { tried: Vec<PathBuf> },
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("content document is not valid: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors raised while choosing a deck for a new game.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum DeckError {
    #[error("deck pool is empty")]
    EmptyPool,
}

/// Anything that stops the bot from serving traffic.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error(transparent)]
    Deck(#[from] DeckError),
    #[error("invalid webhook url: {0}")]
    WebhookUrl(#[from] url::ParseError),
    #[error("failed to set up the webhook: {0}")]
    Webhook(#[from] teloxide::RequestError),
}
