use std::{sync::Arc, time::Duration};

use log::{debug, error, info, warn};
use teloxide::utils::html;

use super::{
    caption,
    content::{Card, Content, FeedbackVariant, Screen},
    deck::DeckSelector,
    session::{Session, SessionStore},
    template, Action, Choice, Control, Event, QuizCommand, Render,
};
use crate::analytics::{AnalyticsEvent, Reporter};

const START_SCREEN: &str = "start";
const START_ACK_DELAY: Duration = Duration::from_secs(3);

const DEFAULT_GREETING: &str = "Hi! Ready to test yourself? Press the button below to start.";
const DEFAULT_PLAY_LABEL: &str = "Start the game ▶️";
const DEFAULT_NEXT_LABEL: &str = "Next question ▶️";
const DEFAULT_FINISH_LABEL: &str = "See my result 🏁";
const DEFAULT_CORRECT: &str = "✅ Correct!\n\n{explain}";
const DEFAULT_WRONG: &str = "❌ Not quite, the right answer is {correct}.\n\n{explain}";
const LINK_CAPTION: &str = "Here you go 👇";
const LINK_LABEL: &str = "Open";
const UNAVAILABLE: &str = "The quiz is not available right now, please try again later.";

/// Drives the quiz: deck selection, questions, answers, scoring and the
/// final tier.
///
/// Each transition runs while holding the user's session slot, so events
/// from one user are applied one at a time.
pub struct QuizEngine {
    content: Arc<Content>,
    decks: DeckSelector,
    sessions: Arc<SessionStore>,
    reporter: Arc<dyn Reporter>,
}

impl QuizEngine {
    pub fn new(
        content: Arc<Content>,
        decks: DeckSelector,
        sessions: Arc<SessionStore>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            content,
            decks,
            sessions,
            reporter,
        }
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Applies one user interaction and returns what to show in response.
    /// An empty list means the interaction was ignored.
    pub async fn handle(&self, user: u64, event: Event) -> Vec<Render> {
        debug!("User {} sent {:?}", user, event);
        match event {
            Event::Start => self.welcome(user),
            Event::Text(text) if self.content.is_start_phrase(&text) => self.start_game(user).await,
            Event::Text(_) => Vec::new(),
            Event::Answer(choice) => self.submit_answer(user, choice).await,
            Event::Navigate(name) => self.show_screen(&name).into_iter().collect(),
            Event::Command(QuizCommand::Go) => self.start_game(user).await,
            Event::Command(QuizCommand::Next) => self.advance(user).await,
            Event::Command(QuizCommand::Final) => self.finish(user).await,
            Event::Link(kind) => self.follow_link(user, &kind).into_iter().collect(),
        }
    }

    /// The start screen, plus the start-phrase keyboard. A message carries
    /// one keyboard only, so the phrases go into a second message when the
    /// screen already has inline buttons.
    fn welcome(&self, user: u64) -> Vec<Render> {
        self.reporter.report(AnalyticsEvent::Join { user_id: user });
        let screen = self.show_screen(START_SCREEN).unwrap_or_else(|| {
            Render::text(DEFAULT_GREETING).with_row(vec![Control::new(
                DEFAULT_PLAY_LABEL,
                Action::Command(QuizCommand::Go),
            )])
        });

        let phrases = self.content.start_keyboard();
        if phrases.is_empty() {
            vec![screen]
        } else if screen.controls.is_empty() {
            vec![screen.with_reply_keyboard(phrases.to_vec())]
        } else {
            vec![
                screen,
                Render::text(self.content.start_prompt()).with_reply_keyboard(phrases.to_vec()),
            ]
        }
    }

    fn show_screen(&self, name: &str) -> Option<Render> {
        match self.content.screen(name) {
            Some(screen) => Some(screen_render(screen)),
            None => {
                debug!("Ignoring navigation to unknown screen {:?}", name);
                None
            }
        }
    }

    fn follow_link(&self, user: u64, kind: &str) -> Option<Render> {
        let Some(url) = self.content.link_url(kind) else {
            debug!("Ignoring unknown link {:?}", kind);
            return None;
        };
        self.reporter.report(AnalyticsEvent::Link {
            user_id: user,
            kind: kind.to_string(),
        });
        Some(Render::text(LINK_CAPTION).with_row(vec![Control::new(
            LINK_LABEL,
            Action::OpenUrl(url.to_string()),
        )]))
    }

    async fn start_game(&self, user: u64) -> Vec<Render> {
        let selected = self.decks.select(&self.content, &mut rand::thread_rng());
        let deck = match selected {
            Ok(deck) => deck,
            Err(err) => {
                error!("Cannot start a game for user {}: {}", user, err);
                return vec![Render::text(UNAVAILABLE)];
            }
        };

        let mut slot = self.sessions.lock(user).await;
        if let Some(previous) = slot.as_ref() {
            debug!(
                "User {} restarted, dropping progress at question {} with score {}",
                user, previous.index, previous.score
            );
        }
        *slot = Some(Session::new(deck));
        info!("User {} started a game", user);

        let mut renders = Vec::new();
        if let Some(ack) = self.content.start_ack() {
            renders.push(Render {
                dismiss_after: Some(START_ACK_DELAY),
                ..Render::text(ack)
            });
        }
        renders.extend(self.present(user, &mut slot));
        renders
    }

    /// Shows the question at the current index, skipping cards that no longer
    /// exist, or concludes the game once the deck is used up.
    fn present(&self, user: u64, slot: &mut Option<Session>) -> Vec<Render> {
        let q_total = self.content.q_total();

        loop {
            let session = match slot.as_mut() {
                Some(session) => session,
                None => return Vec::new(),
            };
            if session.is_exhausted(q_total) {
                break;
            }

            match self.content.card(&session.deck[session.index]) {
                Some(card) => {
                    session.awaiting = true;
                    return vec![question_render(card, session.index, session.total(q_total))];
                }
                None => {
                    warn!(
                        "User {}: card {:?} at position {} does not exist, skipping it",
                        user, session.deck[session.index], session.index
                    );
                    session.index += 1;
                }
            }
        }

        match slot.take() {
            Some(session) => self.conclude(user, session),
            None => Vec::new(),
        }
    }

    async fn submit_answer(&self, user: u64, choice: Choice) -> Vec<Render> {
        let q_total = self.content.q_total();
        let Some(mut slot) = self.sessions.lock_existing(user).await else {
            debug!("User {} answered {} without a game", user, choice);
            return Vec::new();
        };

        let session = match slot.as_mut() {
            Some(session) if session.awaiting => session,
            Some(_) => {
                debug!("User {} answered {} with no open question", user, choice);
                return Vec::new();
            }
            None => {
                debug!("User {} answered {} without a game", user, choice);
                return Vec::new();
            }
        };
        session.awaiting = false;

        let Some(card) = session.current_card().and_then(|id| self.content.card(id)) else {
            warn!("User {} answered a question that cannot be resolved", user);
            return Vec::new();
        };

        let correct = choice.label() == card.correct;
        session.answered += 1;
        if correct {
            session.score += 1;
        }
        debug!(
            "User {} answered {} on {:?} ({}), score {}",
            user,
            choice,
            card.id,
            if correct { "correct" } else { "wrong" },
            session.score
        );

        vec![self.feedback_render(
            card,
            correct,
            session.is_last(q_total),
            session.score,
            session.total(q_total),
        )]
    }

    async fn advance(&self, user: u64) -> Vec<Render> {
        let Some(mut slot) = self.sessions.lock_existing(user).await else {
            debug!("User {} asked for the next question without a game", user);
            return Vec::new();
        };
        match slot.as_mut() {
            Some(session) if session.awaiting => {
                debug!("User {} asked for the next question before answering", user);
                return Vec::new();
            }
            Some(session) => session.index += 1,
            None => {
                debug!("User {} asked for the next question without a game", user);
                return Vec::new();
            }
        }
        self.present(user, &mut slot)
    }

    async fn finish(&self, user: u64) -> Vec<Render> {
        let mut slot = match self.sessions.lock_existing(user).await {
            Some(slot) => slot,
            None => {
                debug!("User {} asked for a result without a game", user);
                return Vec::new();
            }
        };
        match slot.take() {
            Some(session) => self.conclude(user, session),
            None => {
                debug!("User {} asked for a result without a game", user);
                Vec::new()
            }
        }
    }

    /// Resolves the tier for a finished session. The session has already been
    /// taken out of the store.
    fn conclude(&self, user: u64, session: Session) -> Vec<Render> {
        let score = session.score;
        let total = session.total(self.content.q_total());
        let score_text = score.to_string();
        let total_text = total.to_string();
        let bindings = [
            ("score", score_text.as_str()),
            ("q_total", total_text.as_str()),
        ];

        let (render, tier) = match self.content.tier_for(score) {
            Some(tier) => {
                let render = Render {
                    controls: tier.control_rows(),
                    ..Render::text(caption(
                        &template::render(&tier.title, &bindings),
                        &template::render(&tier.text, &bindings),
                    ))
                    .with_image(tier.image.clone())
                };
                (render, Some(tier.name.clone()))
            }
            None => {
                warn!("No tier covers score {}, sending the plain result", score);
                (
                    Render::text(format!("Your result is {}/{}", score, total)),
                    None,
                )
            }
        };

        info!(
            "User {} finished with {}/{} ({})",
            user,
            score,
            total,
            tier.as_deref().unwrap_or("no tier")
        );
        self.reporter.report(AnalyticsEvent::Final {
            user_id: user,
            score,
            q_total: total,
            tier,
        });
        vec![render]
    }

    fn feedback_render(
        &self,
        card: &Card,
        correct: bool,
        last: bool,
        score: usize,
        total: usize,
    ) -> Render {
        let score_text = score.to_string();
        let total_text = total.to_string();
        let correct_text = html::escape(&card.correct);
        let explain = html::escape(card.explain.as_deref().unwrap_or_default());
        let bindings = [
            ("score", score_text.as_str()),
            ("q_total", total_text.as_str()),
            ("correct", correct_text.as_str()),
            ("explain", explain.as_str()),
        ];

        let (text, image, button) = match self.content.feedback(FeedbackVariant::new(correct, last)) {
            Some(block) => (
                caption(
                    &template::render(&block.title, &bindings),
                    &template::render(&block.text, &bindings),
                ),
                block.image.clone().or_else(|| card.image.clone()),
                block.button.clone(),
            ),
            None => {
                let fallback = if correct { DEFAULT_CORRECT } else { DEFAULT_WRONG };
                (
                    template::render(fallback, &bindings).trim_end().to_string(),
                    card.image.clone(),
                    None,
                )
            }
        };

        let control = if last {
            Control::new(
                button.unwrap_or_else(|| DEFAULT_FINISH_LABEL.to_string()),
                Action::Command(QuizCommand::Final),
            )
        } else {
            Control::new(
                button.unwrap_or_else(|| DEFAULT_NEXT_LABEL.to_string()),
                Action::Command(QuizCommand::Next),
            )
        };

        Render::text(text).with_image(image).with_row(vec![control])
    }
}

fn screen_render(screen: &Screen) -> Render {
    Render {
        controls: screen.control_rows(),
        ..Render::text(caption(&screen.title, &screen.text)).with_image(screen.image.clone())
    }
}

fn question_render(card: &Card, index: usize, total: usize) -> Render {
    let options = Choice::ALL
        .iter()
        .zip(&card.options)
        .map(|(choice, option)| format!("{}) {}", choice, html::escape(option)))
        .collect::<Vec<_>>()
        .join("\n");
    let text = format!(
        "Question {}/{}\n\n<b>{}</b>\n\n{}",
        index + 1,
        total,
        html::escape(&card.question),
        options
    );

    let answers = Choice::ALL
        .iter()
        .map(|choice| Control::new(choice.label(), Action::Answer(*choice)))
        .collect();

    Render::text(text)
        .with_image(card.image.clone())
        .with_row(answers)
}
