use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use log::{debug, warn};
use teloxide::{
    prelude::*,
    types::{
        InlineKeyboardButton, InlineKeyboardMarkup, InputFile, KeyboardButton, KeyboardMarkup,
        MessageId, ParseMode, ReplyMarkup,
    },
    RequestError,
};
use url::Url;

use crate::quiz::{router, Action, Control, Render};

// Telegram refuses photo captions longer than this
const CAPTION_LIMIT: usize = 1024;
const EMPTY_CAPTION: &str = "👇";

/// Sends every render to `chat`, in order.
pub async fn deliver(bot: &Bot, chat: ChatId, renders: Vec<Render>) -> Result<(), RequestError> {
    for render in renders {
        send(bot, chat, render).await?;
    }
    Ok(())
}

async fn send(bot: &Bot, chat: ChatId, render: Render) -> Result<(), RequestError> {
    let keyboard = reply_markup(&render);
    let caption = if render.caption.trim().is_empty() {
        EMPTY_CAPTION.to_string()
    } else {
        render.caption.clone()
    };

    let sent = match &render.image {
        Some(image) if caption.chars().count() <= CAPTION_LIMIT => {
            let mut request = bot
                .send_photo(chat, input_file(image))
                .caption(caption.clone())
                .parse_mode(ParseMode::Html);
            if let Some(markup) = keyboard.clone() {
                request = request.reply_markup(markup);
            }
            match request.await {
                Ok(message) => message,
                Err(err) => {
                    // the text still matters more than the picture
                    warn!("Failed to send image {:?}: {}", image, err);
                    send_text(bot, chat, caption, keyboard).await?
                }
            }
        }
        Some(image) => {
            if let Err(err) = bot.send_photo(chat, input_file(image)).await {
                warn!("Failed to send image {:?}: {}", image, err);
            }
            send_text(bot, chat, caption, keyboard).await?
        }
        None => send_text(bot, chat, caption, keyboard).await?,
    };

    if let Some(delay) = render.dismiss_after {
        schedule_dismiss(bot.clone(), chat, sent.id, delay);
    }
    Ok(())
}

async fn send_text(
    bot: &Bot,
    chat: ChatId,
    text: String,
    keyboard: Option<ReplyMarkup>,
) -> Result<Message, RequestError> {
    let mut request = bot.send_message(chat, text).parse_mode(ParseMode::Html);
    if let Some(markup) = keyboard {
        request = request.reply_markup(markup);
    }
    request.await
}

/// Deletes the message after `delay`. Failures are only logged.
fn schedule_dismiss(bot: Bot, chat: ChatId, message: MessageId, delay: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if let Err(err) = bot.delete_message(chat, message).await {
            debug!("Could not dismiss message {:?} in {:?}: {}", message, chat, err);
        }
    });
}

/// Inline buttons win over the reply keyboard, a message carries only one.
fn reply_markup(render: &Render) -> Option<ReplyMarkup> {
    if let Some(inline) = keyboard(&render.controls) {
        return Some(inline.into());
    }
    if render.reply_keyboard.is_empty() {
        return None;
    }
    let row = render
        .reply_keyboard
        .iter()
        .map(|phrase| KeyboardButton::new(phrase.clone()))
        .collect::<Vec<_>>();
    Some(KeyboardMarkup::new(vec![row]).into())
}

pub fn keyboard(controls: &[Vec<Control>]) -> Option<InlineKeyboardMarkup> {
    let rows: Vec<Vec<InlineKeyboardButton>> = controls
        .iter()
        .map(|row| row.iter().filter_map(button).collect::<Vec<_>>())
        .filter(|row| !row.is_empty())
        .collect();
    if rows.is_empty() {
        None
    } else {
        Some(InlineKeyboardMarkup::new(rows))
    }
}

fn button(control: &Control) -> Option<InlineKeyboardButton> {
    match &control.action {
        Action::OpenUrl(url) => match Url::parse(url) {
            Ok(url) => Some(InlineKeyboardButton::url(control.label.clone(), url)),
            Err(err) => {
                warn!("Dropping button {:?} with bad url {:?}: {}", control.label, url, err);
                None
            }
        },
        action => router::encode(action)
            .map(|data| InlineKeyboardButton::callback(control.label.clone(), data)),
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ImageSource {
    Url(Url),
    Path(PathBuf),
    /// A file id Telegram already knows.
    FileId(String),
}

fn image_source(image: &str) -> ImageSource {
    if let Ok(url) = Url::parse(image) {
        if matches!(url.scheme(), "http" | "https") {
            return ImageSource::Url(url);
        }
    }
    let path = Path::new(image);
    if path.is_file() {
        ImageSource::Path(path.to_path_buf())
    } else {
        ImageSource::FileId(image.to_string())
    }
}

fn input_file(image: &str) -> InputFile {
    match image_source(image) {
        ImageSource::Url(url) => InputFile::url(url),
        ImageSource::Path(path) => InputFile::file(path),
        ImageSource::FileId(id) => InputFile::file_id(id),
    }
}
