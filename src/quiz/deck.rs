use log::{debug, warn};
use rand::{seq::SliceRandom, Rng};

use super::content::Content;
use crate::error::DeckError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeckMode {
    #[default]
    Random,
    /// Replay a fixed debug deck, the indexed one if it exists.
    Debug { index: Option<usize> },
}

/// Chooses the card sequence for a new game.
///
/// Always hands out an owned copy so callers can never touch the catalog's
/// decks.
pub fn select_deck<R: Rng + ?Sized>(
    mode: DeckMode,
    pool: &[Vec<String>],
    debug_decks: &[Vec<String>],
    rng: &mut R,
) -> Result<Vec<String>, DeckError> {
    if let DeckMode::Debug { index } = mode {
        let indexed = index.and_then(|i| debug_decks.get(i));
        if index.is_some() && indexed.is_none() {
            warn!("Debug deck index {:?} is out of range, using the first debug deck", index);
        }
        if let Some(deck) = indexed.or_else(|| debug_decks.first()) {
            return Ok(deck.clone());
        }
        warn!("Debug mode is on but no debug decks are configured, drawing from the pool");
    }

    pool.choose(rng).cloned().ok_or(DeckError::EmptyPool)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeckSelector {
    mode: DeckMode,
}

impl DeckSelector {
    pub fn new(mode: DeckMode) -> Self {
        Self { mode }
    }

    pub fn select<R: Rng + ?Sized>(
        &self,
        content: &Content,
        rng: &mut R,
    ) -> Result<Vec<String>, DeckError> {
        let deck = select_deck(self.mode, content.deck_pool(), content.debug_decks(), rng)?;
        debug!("Selected deck {:?}", deck);
        Ok(deck)
    }

    /// Fails when this mode could never produce a deck from `content`.
    pub fn check(&self, content: &Content) -> Result<(), DeckError> {
        let has_debug_deck = matches!(self.mode, DeckMode::Debug { .. })
            && !content.debug_decks().is_empty();
        if has_debug_deck || !content.deck_pool().is_empty() {
            Ok(())
        } else {
            Err(DeckError::EmptyPool)
        }
    }
}
