use std::{
    collections::HashMap,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use log::{info, warn};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{router, Action, Control, QuizCommand};
use crate::error::ContentError;

const DEFAULT_Q_TOTAL: usize = 10;
const DEFAULT_START_SYNONYMS: [&str; 4] = ["поехали", "начать игру", "старт", "start"];
const DEFAULT_START_KEYBOARD: [&str; 2] = ["Поехали ▶️", "Начать игру ▶️"];
const DEFAULT_START_PROMPT: &str = "Tap a button below whenever you are ready 👇";

/// A single quiz question.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Card {
    pub id: String,
    #[serde(alias = "q")]
    pub question: String,
    pub options: Vec<String>,
    /// Label of the right option, `A` to `D`.
    pub correct: String,
    #[serde(default, alias = "explanation")]
    pub explain: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Button {
    pub text: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub screen: Option<String>,
    #[serde(default)]
    pub cmd: Option<String>,
    /// Marks an outbound link whose clicks are counted.
    #[serde(default)]
    pub link: Option<String>,
}

impl Button {
    /// The control this button renders to, or `None` when it has no usable action.
    pub fn to_control(&self) -> Option<Control> {
        let action = if let (Some(kind), Some(_)) = (&self.link, &self.url) {
            Action::Link(kind.clone())
        } else if let Some(url) = &self.url {
            Action::OpenUrl(url.clone())
        } else if let Some(screen) = &self.screen {
            Action::Screen(screen.clone())
        } else if let Some(cmd) = &self.cmd {
            Action::Command(cmd.parse::<QuizCommand>().ok()?)
        } else {
            return None;
        };
        Some(Control::new(self.text.clone(), action))
    }
}

/// Static onboarding/informational content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Screen {
    #[serde(default)]
    pub title: String,
    #[serde(default, alias = "body")]
    pub text: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub buttons: Vec<Button>,
}

impl Screen {
    pub fn control_rows(&self) -> Vec<Vec<Control>> {
        control_rows(&self.buttons)
    }
}

/// One control per row, in declared order.
pub fn control_rows(buttons: &[Button]) -> Vec<Vec<Control>> {
    buttons
        .iter()
        .filter_map(Button::to_control)
        .map(|control| vec![control])
        .collect()
}

/// A feedback block shown after an answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Feedback {
    #[serde(default)]
    pub title: String,
    #[serde(default, alias = "body")]
    pub text: String,
    #[serde(default)]
    pub image: Option<String>,
    /// Label of the advance/finish button.
    #[serde(default)]
    pub button: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedbackVariant {
    CorrectLast,
    CorrectMore,
    WrongLast,
    WrongMore,
}

impl FeedbackVariant {
    pub fn new(correct: bool, last: bool) -> Self {
        match (correct, last) {
            (true, true) => FeedbackVariant::CorrectLast,
            (true, false) => FeedbackVariant::CorrectMore,
            (false, true) => FeedbackVariant::WrongLast,
            (false, false) => FeedbackVariant::WrongMore,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            FeedbackVariant::CorrectLast => "correct_last",
            FeedbackVariant::CorrectMore => "correct_more",
            FeedbackVariant::WrongLast => "wrong_last",
            FeedbackVariant::WrongMore => "wrong_more",
        }
    }
}

/// An outcome bucket for a final score, matched on `low..=high`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tier {
    pub name: String,
    pub low: usize,
    pub high: usize,
    pub title: String,
    pub text: String,
    pub image: Option<String>,
    pub buttons: Vec<Button>,
}

impl Tier {
    pub fn contains(&self, score: usize) -> bool {
        self.low <= score && score <= self.high
    }

    pub fn control_rows(&self) -> Vec<Vec<Control>> {
        control_rows(&self.buttons)
    }
}

#[derive(Debug, Deserialize)]
struct RawTier {
    range: (usize, usize),
    #[serde(default)]
    title: String,
    #[serde(default, alias = "body")]
    text: String,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    buttons: Vec<Button>,
}

#[derive(Debug, Default, Deserialize)]
struct Settings {
    #[serde(default)]
    q_total: Option<usize>,
    #[serde(default)]
    start_synonyms: Option<Vec<String>>,
    #[serde(default)]
    start_ack: Option<String>,
    #[serde(default)]
    start_keyboard: Option<Vec<String>>,
    #[serde(default)]
    start_prompt: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Document {
    #[serde(default)]
    screens: HashMap<String, Screen>,
    #[serde(default)]
    cards: Vec<Card>,
    #[serde(default)]
    deck_pool: Vec<Vec<String>>,
    #[serde(default)]
    debug_decks: Vec<Vec<String>>,
    #[serde(default)]
    cards_ui: HashMap<String, Feedback>,
    // a map keeps the document's declaration order thanks to `preserve_order`
    #[serde(default)]
    final_routes: Map<String, Value>,
    #[serde(default)]
    settings: Settings,
}

/// The immutable quiz catalog.
#[derive(Debug, Clone, Default)]
pub struct Content {
    cards: HashMap<String, Card>,
    screens: HashMap<String, Screen>,
    deck_pool: Vec<Vec<String>>,
    debug_decks: Vec<Vec<String>>,
    feedback: HashMap<String, Feedback>,
    tiers: Vec<Tier>,
    links: HashMap<String, String>,
    q_total: usize,
    start_synonyms: Vec<String>,
    start_ack: Option<String>,
    start_keyboard: Vec<String>,
    start_prompt: String,
}

impl Content {
    /// Picks the first of `candidates` that exists on disk.
    pub fn locate(candidates: &[PathBuf]) -> Result<PathBuf, ContentError> {
        candidates
            .iter()
            .find(|path| path.is_file())
            .cloned()
            .ok_or_else(|| ContentError::NotFound {
                tried: candidates.to_vec(),
            })
    }

    pub fn load(path: &Path) -> Result<Self, ContentError> {
        let file = File::open(path).map_err(|source| ContentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let document: Document = serde_json::from_reader(BufReader::new(file))?;
        let content = Self::from_document(document)?;
        info!(
            "Loaded {} cards, {} screens, {} decks and {} tiers from {:?}",
            content.cards.len(),
            content.screens.len(),
            content.deck_pool.len(),
            content.tiers.len(),
            path
        );
        Ok(content)
    }

    pub fn from_json(json: &str) -> Result<Self, ContentError> {
        let document: Document = serde_json::from_str(json)?;
        Self::from_document(document)
    }

    fn from_document(document: Document) -> Result<Self, ContentError> {
        let mut cards = HashMap::new();
        for card in document.cards {
            if card.options.len() != 4 {
                warn!(
                    "Skipping card {:?}: expected 4 options, found {}",
                    card.id,
                    card.options.len()
                );
                continue;
            }
            cards.insert(card.id.clone(), card);
        }

        let mut tiers = Vec::with_capacity(document.final_routes.len());
        for (name, value) in document.final_routes {
            let raw: RawTier = serde_json::from_value(value)?;
            tiers.push(Tier {
                name,
                low: raw.range.0,
                high: raw.range.1,
                title: raw.title,
                text: raw.text,
                image: raw.image,
                buttons: raw.buttons,
            });
        }

        let mut content = Self {
            cards,
            screens: document.screens,
            deck_pool: document.deck_pool,
            debug_decks: document.debug_decks,
            feedback: document.cards_ui,
            tiers,
            links: HashMap::new(),
            q_total: document.settings.q_total.unwrap_or(DEFAULT_Q_TOTAL),
            start_synonyms: document
                .settings
                .start_synonyms
                .unwrap_or_else(|| DEFAULT_START_SYNONYMS.iter().map(|s| s.to_string()).collect())
                .iter()
                .map(|s| normalize(s))
                .filter(|s| !s.is_empty())
                .collect(),
            start_ack: document.settings.start_ack.filter(|s| !s.trim().is_empty()),
            start_keyboard: document
                .settings
                .start_keyboard
                .unwrap_or_else(|| DEFAULT_START_KEYBOARD.iter().map(|s| s.to_string()).collect())
                .into_iter()
                .filter(|s| !s.trim().is_empty())
                .collect(),
            start_prompt: document
                .settings
                .start_prompt
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_START_PROMPT.to_string()),
        };
        content.index_links();
        content.warn_about_dead_buttons();
        for phrase in &content.start_keyboard {
            if !content.is_start_phrase(phrase) {
                warn!("Start keyboard button {:?} does not match any start phrase", phrase);
            }
        }
        Ok(content)
    }

    fn index_links(&mut self) {
        let screen_buttons = self.screens.values().flat_map(|s| s.buttons.iter());
        let tier_buttons = self.tiers.iter().flat_map(|t| t.buttons.iter());
        for button in screen_buttons.chain(tier_buttons) {
            if let (Some(kind), Some(url)) = (&button.link, &button.url) {
                self.links.insert(kind.clone(), url.clone());
            }
        }
    }

    fn warn_about_dead_buttons(&self) {
        let screen_buttons = self.screens.values().flat_map(|s| s.buttons.iter());
        let tier_buttons = self.tiers.iter().flat_map(|t| t.buttons.iter());
        for button in screen_buttons.chain(tier_buttons) {
            match button.to_control() {
                None => warn!("Button {:?} has no usable action and will be hidden", button.text),
                Some(Control {
                    action: Action::OpenUrl(_),
                    ..
                }) => {}
                Some(control) if router::encode(&control.action).is_none() => warn!(
                    "Button {:?} points to a name longer than {} bytes of callback data and will be hidden",
                    button.text,
                    router::MAX_DATA_LEN
                ),
                Some(_) => {}
            }
        }
    }

    pub fn card(&self, id: &str) -> Option<&Card> {
        self.cards.get(id)
    }

    pub fn screen(&self, name: &str) -> Option<&Screen> {
        self.screens.get(name)
    }

    pub fn deck_pool(&self) -> &[Vec<String>] {
        &self.deck_pool
    }

    pub fn debug_decks(&self) -> &[Vec<String>] {
        &self.debug_decks
    }

    pub fn feedback(&self, variant: FeedbackVariant) -> Option<&Feedback> {
        self.feedback.get(variant.key())
    }

    /// Tiers in declaration order.
    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    /// First tier, in declaration order, whose range holds `score`.
    pub fn tier_for(&self, score: usize) -> Option<&Tier> {
        self.tiers.iter().find(|tier| tier.contains(score))
    }

    pub fn link_url(&self, kind: &str) -> Option<&str> {
        self.links.get(kind).map(String::as_str)
    }

    pub fn q_total(&self) -> usize {
        self.q_total
    }

    pub fn start_ack(&self) -> Option<&str> {
        self.start_ack.as_deref()
    }

    /// Reply keyboard offered on `/start`, empty when disabled.
    pub fn start_keyboard(&self) -> &[String] {
        &self.start_keyboard
    }

    pub fn start_prompt(&self) -> &str {
        &self.start_prompt
    }

    /// Whether a free-text message should start a game. A synonym matches the
    /// whole message or its leading words, never part of a word.
    pub fn is_start_phrase(&self, text: &str) -> bool {
        let text = normalize(text);
        !text.is_empty()
            && self.start_synonyms.iter().any(|synonym| {
                text.strip_prefix(synonym.as_str())
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
            })
    }
}

/// Lowercases and drops emoji, punctuation and other symbols.
pub fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .trim()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    const DOCUMENT: &str = r#"{
        "screens": {
            "start": {
                "title": "Hello",
                "text": "Ready?",
                "image": "https://example.com/hello.png",
                "buttons": [
                    {"text": "Play", "cmd": "go"},
                    {"text": "About", "screen": "about"},
                    {"text": "Channel", "link": "tg", "url": "https://t.me/example"},
                    {"text": "Broken", "cmd": "dance"}
                ]
            },
            "about": {"text": "A quiz."}
        },
        "cards": [
            {"id": "c1", "q": "2+2?", "options": ["3", "4", "5", "6"], "correct": "B", "explain": "Basic sums."},
            {"id": "c2", "question": "Three options", "options": ["a", "b", "c"], "correct": "A"}
        ],
        "deck_pool": [["c1", "c2"]],
        "final_routes": {
            "zeta": {"range": [0, 5], "title": "Z"},
            "alpha": {"range": [3, 10], "title": "A"}
        },
        "settings": {"q_total": 3, "start_synonyms": ["Let's go!"]}
    }"#;

    #[test]
    fn loads_cards_and_drops_malformed_ones() {
        let content = Content::from_json(DOCUMENT).unwrap();
        let card = content.card("c1").unwrap();
        assert_eq!(card.question, "2+2?");
        assert_eq!(card.correct, "B");
        assert_eq!(card.explain.as_deref(), Some("Basic sums."));
        assert!(content.card("c2").is_none());
        assert!(content.card("nope").is_none());
        assert_eq!(content.q_total(), 3);
    }

    #[test]
    fn tiers_keep_declaration_order() {
        let content = Content::from_json(DOCUMENT).unwrap();
        let names: Vec<_> = content.tiers().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["zeta", "alpha"]);
        // 4 sits in both ranges, the first declared wins every time
        for _ in 0..5 {
            assert_eq!(content.tier_for(4).unwrap().name, "zeta");
        }
        assert_eq!(content.tier_for(7).unwrap().name, "alpha");
        assert!(content.tier_for(11).is_none());
    }

    #[test]
    fn screen_buttons_become_controls() {
        let content = Content::from_json(DOCUMENT).unwrap();
        let rows = content.screen("start").unwrap().control_rows();
        let actions: Vec<_> = rows.iter().map(|row| row[0].action.clone()).collect();
        assert_eq!(
            actions,
            vec![
                Action::Command(QuizCommand::Go),
                Action::Screen("about".to_string()),
                Action::Link("tg".to_string()),
            ]
        );
        assert_eq!(content.link_url("tg"), Some("https://t.me/example"));
        assert_eq!(content.link_url("site"), None);
    }

    #[test]
    fn missing_optional_keys_use_defaults() {
        let content = Content::from_json("{}").unwrap();
        assert_eq!(content.q_total(), DEFAULT_Q_TOTAL);
        assert!(content.deck_pool().is_empty());
        assert!(content.debug_decks().is_empty());
        assert!(content.tiers().is_empty());
        assert!(content.feedback(FeedbackVariant::CorrectLast).is_none());
        assert!(content.start_ack().is_none());
        assert!(content.is_start_phrase("Поехали ▶️"));
        assert!(content.is_start_phrase("Начать игру ▶️"));
    }

    #[test]
    fn start_phrases_ignore_case_and_emoji() {
        let content = Content::from_json(DOCUMENT).unwrap();
        assert!(content.is_start_phrase("LETS GO 🚀"));
        assert!(content.is_start_phrase("  lets go, please"));
        assert!(!content.is_start_phrase("go"));
        assert!(!content.is_start_phrase("lets gone"));
        assert!(!content.is_start_phrase("🚀"));
    }

    #[test]
    fn start_synonyms_match_whole_words() {
        let content = Content::from_json("{}").unwrap();
        assert!(content.is_start_phrase("Start"));
        assert!(content.is_start_phrase("старт!"));
        assert!(content.is_start_phrase("Поехали скорее"));
        assert!(!content.is_start_phrase("startup idea"));
        assert!(!content.is_start_phrase("стартап"));
        assert!(!content.is_start_phrase("поехалиии"));
    }

    #[test]
    fn start_keyboard_defaults_and_overrides() {
        let content = Content::from_json("{}").unwrap();
        assert_eq!(content.start_keyboard(), DEFAULT_START_KEYBOARD);
        assert_eq!(content.start_prompt(), DEFAULT_START_PROMPT);

        let custom = Content::from_json(
            r#"{"settings": {"start_keyboard": ["Go!", " "], "start_prompt": "Ready?"}}"#,
        )
        .unwrap();
        assert_eq!(custom.start_keyboard(), ["Go!"]);
        assert_eq!(custom.start_prompt(), "Ready?");

        let disabled = Content::from_json(r#"{"settings": {"start_keyboard": []}}"#).unwrap();
        assert!(disabled.start_keyboard().is_empty());
    }

    #[test]
    fn unparseable_document_is_an_error() {
        assert!(matches!(
            Content::from_json("{ not json"),
            Err(ContentError::Parse(_))
        ));
        assert!(matches!(
            Content::from_json(r#"{"final_routes": {"t": {"range": "low"}}}"#),
            Err(ContentError::Parse(_))
        ));
    }

    #[test]
    fn locate_reports_every_candidate() {
        let tried = vec![
            PathBuf::from("/definitely/missing/content.json"),
            PathBuf::from("/also/missing.json"),
        ];
        match Content::locate(&tried) {
            Err(ContentError::NotFound { tried: reported }) => assert_eq!(reported, tried),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn bundled_content_is_playable() {
        let path = Content::locate(&[PathBuf::from("content.json")]).unwrap();
        let content = Content::load(&path).unwrap();
        assert!(!content.deck_pool().is_empty());
        for deck in content.deck_pool().iter().chain(content.debug_decks()) {
            assert!(deck.iter().all(|id| content.card(id).is_some()));
        }
        for score in 0..=content.q_total() {
            assert!(content.tier_for(score).is_some(), "no tier for {}", score);
        }
        assert!(content.screen("start").is_some());
    }

    #[test]
    fn feedback_variants_map_to_document_keys() {
        assert_eq!(FeedbackVariant::new(true, true).key(), "correct_last");
        assert_eq!(FeedbackVariant::new(true, false).key(), "correct_more");
        assert_eq!(FeedbackVariant::new(false, true).key(), "wrong_last");
        assert_eq!(FeedbackVariant::new(false, false).key(), "wrong_more");
    }
}
