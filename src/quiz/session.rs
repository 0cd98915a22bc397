use std::{
    ops::{Deref, DerefMut},
    sync::Arc,
};

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-user quiz progress.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub deck: Vec<String>,
    /// Zero-based position in `deck`.
    pub index: usize,
    pub score: usize,
    /// Questions answered so far; skipped cards do not count.
    pub answered: usize,
    /// A question is on screen and has not been answered yet.
    pub awaiting: bool,
}

impl Session {
    pub fn new(deck: Vec<String>) -> Self {
        Self {
            deck,
            ..Default::default()
        }
    }

    pub fn current_card(&self) -> Option<&str> {
        self.deck.get(self.index).map(String::as_str)
    }

    /// Number of questions this game can show.
    pub fn total(&self, q_total: usize) -> usize {
        q_total.min(self.deck.len())
    }

    pub fn is_exhausted(&self, q_total: usize) -> bool {
        self.index >= self.total(q_total)
    }

    pub fn is_last(&self, q_total: usize) -> bool {
        self.index + 1 >= self.total(q_total)
    }
}

type Slot = Arc<Mutex<Option<Session>>>;

/// Exclusive access to one user's session slot. `None` means no game.
///
/// Dropping a slot that holds no session removes it from the store unless
/// another task is already waiting for it.
pub struct SessionSlot {
    user: u64,
    slot: Slot,
    guard: OwnedMutexGuard<Option<Session>>,
    slots: Arc<DashMap<u64, Slot>>,
}

impl Deref for SessionSlot {
    type Target = Option<Session>;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl DerefMut for SessionSlot {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}

impl Drop for SessionSlot {
    fn drop(&mut self) {
        if self.guard.is_some() {
            return;
        }
        // the map, `self.slot` and the guard are the only owners
        self.slots.remove_if(&self.user, |_, slot| {
            Arc::ptr_eq(slot, &self.slot) && Arc::strong_count(slot) == 3
        });
    }
}

/// Maps users to their sessions.
///
/// Every user with a game has a slot behind its own async mutex. Holding the
/// slot guard serializes all transitions for that user while other users
/// proceed independently.
#[derive(Debug, Default)]
pub struct SessionStore {
    slots: Arc<DashMap<u64, Slot>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `user`'s slot, creating it if needed.
    pub async fn lock(&self, user: u64) -> SessionSlot {
        let slot = Arc::clone(&self.slots.entry(user).or_default());
        self.acquire(user, slot).await
    }

    /// Like [`SessionStore::lock`], but `None` when the user has no slot.
    pub async fn lock_existing(&self, user: u64) -> Option<SessionSlot> {
        let slot = self.slots.get(&user).map(|slot| Arc::clone(&slot))?;
        Some(self.acquire(user, slot).await)
    }

    async fn acquire(&self, user: u64, slot: Slot) -> SessionSlot {
        let guard = Arc::clone(&slot).lock_owned().await;
        SessionSlot {
            user,
            slot,
            guard,
            slots: Arc::clone(&self.slots),
        }
    }

    /// A copy of the user's current session.
    pub async fn snapshot(&self, user: u64) -> Option<Session> {
        let slot = self.slots.get(&user).map(|slot| Arc::clone(&slot))?;
        let guard = slot.lock().await;
        guard.clone()
    }

    pub async fn contains(&self, user: u64) -> bool {
        self.snapshot(user).await.is_some()
    }

    #[cfg(test)]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn unknown_users_have_no_session() {
        let store = SessionStore::new();
        assert!(store.snapshot(1).await.is_none());
        assert!(!store.contains(1).await);
        assert!(store.lock(1).await.is_none());
    }

    #[tokio::test]
    async fn writes_through_the_guard_are_visible() {
        let store = SessionStore::new();
        {
            let mut slot = store.lock(5).await;
            *slot = Some(Session::new(vec!["c1".into(), "c2".into()]));
        }
        let session = store.snapshot(5).await.unwrap();
        assert_eq!(session.index, 0);
        assert_eq!(session.current_card(), Some("c1"));

        store.lock(5).await.take();
        assert!(!store.contains(5).await);
        assert_eq!(store.slot_count(), 0);
    }

    #[tokio::test]
    async fn empty_slots_are_released() {
        let store = SessionStore::new();
        for user in 0..1000 {
            *store.lock(user).await = Some(Session::new(vec!["c1".into()]));
            store.lock(user).await.take();
        }
        assert_eq!(store.slot_count(), 0);

        assert!(store.lock(7).await.is_none());
        assert_eq!(store.slot_count(), 0);
    }

    #[tokio::test]
    async fn lock_existing_never_creates_slots() {
        let store = SessionStore::new();
        assert!(store.lock_existing(3).await.is_none());
        assert_eq!(store.slot_count(), 0);

        *store.lock(3).await = Some(Session::new(vec!["c1".into()]));
        let slot = store.lock_existing(3).await.unwrap();
        assert_eq!(slot.as_ref().unwrap().deck, vec!["c1".to_string()]);
    }

    #[tokio::test]
    async fn contended_slot_survives_until_the_last_holder() {
        let store = Arc::new(SessionStore::new());
        let first = store.lock(4).await;
        let waiter = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                *store.lock(4).await = Some(Session::new(vec!["c1".into()]));
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(first);
        waiter.await.unwrap();
        assert!(store.contains(4).await);
        assert_eq!(store.slot_count(), 1);
    }

    #[tokio::test]
    async fn same_user_is_serialized() {
        let store = Arc::new(SessionStore::new());
        *store.lock(9).await = Some(Session::new(vec!["c1".into()]));

        let first = store.lock(9).await;
        let waiter = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let mut slot = store.lock(9).await;
                if let Some(session) = slot.as_mut() {
                    session.score += 1;
                }
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        drop(first);
        waiter.await.unwrap();
        assert_eq!(store.snapshot(9).await.unwrap().score, 1);
    }

    #[tokio::test]
    async fn different_users_do_not_block_each_other() {
        let store = SessionStore::new();
        let _held = store.lock(1).await;
        let other = tokio::time::timeout(Duration::from_millis(100), store.lock(2)).await;
        assert!(other.is_ok());
    }

    #[test]
    fn totals_and_positions() {
        let mut session = Session::new(vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(session.total(10), 3);
        assert_eq!(session.total(2), 2);
        assert!(!session.is_last(10));
        session.index = 2;
        assert!(session.is_last(10));
        assert!(!session.is_exhausted(10));
        session.index = 3;
        assert!(session.is_exhausted(10));
        assert_eq!(session.current_card(), None);
    }
}
