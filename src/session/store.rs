use super::types::{Turn, UserId};
use dashmap::DashMap;
use std::collections::VecDeque;

/// Default number of turns kept per user.
pub const DEFAULT_WINDOW: usize = 10;

/// Bounded, in-memory conversation history keyed by user.
///
/// Each user's sequence holds at most `window` turns; the oldest are evicted
/// first. The window counts individual turns, so a window of 10 holds five
/// user/assistant exchanges. Sessions are created lazily and live for the
/// lifetime of the store.
///
/// The map is sharded, so appending for one user never takes a lock that a
/// different user's request is waiting on (barring a shard collision, which
/// only ever blocks for the duration of an in-memory push).
#[derive(Debug)]
pub struct HistoryStore {
    window: usize,
    sessions: DashMap<UserId, VecDeque<Turn>>,
}

impl HistoryStore {
    /// Create a store. A window of zero is raised to one.
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            sessions: DashMap::new(),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Append `turn` to the end of `user_id`'s sequence, trimming from the
    /// front until the sequence fits the window.
    pub fn append(&self, user_id: &UserId, turn: Turn) {
        let mut turns = self.sessions.entry(user_id.clone()).or_default();
        turns.push_back(turn);
        while turns.len() > self.window {
            turns.pop_front();
        }
    }

    /// Snapshot of `user_id`'s turns, oldest first. Empty if the user has
    /// never been seen. Never creates a session.
    pub fn turns(&self, user_id: &UserId) -> Vec<Turn> {
        self.sessions
            .get(user_id)
            .map(|turns| turns.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of users with a session.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;
    use std::sync::Arc;

    fn contents(turns: &[Turn]) -> Vec<&str> {
        turns.iter().map(Turn::content).collect()
    }

    #[test]
    fn unknown_user_has_empty_history() {
        let store = HistoryStore::default();
        assert!(store.turns(&UserId::from("nobody")).is_empty());
        assert_eq!(store.session_count(), 0, "read must not create a session");
    }

    #[test]
    fn append_preserves_insertion_order() {
        let store = HistoryStore::default();
        let user = UserId::from(1_i64);
        store.append(&user, Turn::user("Hello"));
        store.append(&user, Turn::assistant("Hi there"));

        let turns = store.turns(&user);
        assert_eq!(contents(&turns), vec!["Hello", "Hi there"]);
        assert_eq!(turns[0].role(), Role::User);
        assert_eq!(turns[1].role(), Role::Assistant);
    }

    #[test]
    fn length_is_min_of_appends_and_window() {
        for n in 0..25 {
            let store = HistoryStore::new(10);
            let user = UserId::from("u");
            for i in 0..n {
                store.append(&user, Turn::user(format!("m{i}")));
            }
            let turns = store.turns(&user);
            assert_eq!(turns.len(), n.min(10));

            let expected: Vec<String> = (n.saturating_sub(10)..n).map(|i| format!("m{i}")).collect();
            let actual: Vec<String> = turns.iter().map(|t| t.content().to_string()).collect();
            assert_eq!(actual, expected, "must keep the last turns in order (n={n})");
        }
    }

    #[test]
    fn eleventh_message_evicts_first() {
        let store = HistoryStore::new(10);
        let user = UserId::from("u");
        for i in 1..=11 {
            store.append(&user, Turn::user(format!("msg {i}")));
        }
        let turns = store.turns(&user);
        assert_eq!(turns.len(), 10);
        assert_eq!(turns[0].content(), "msg 2");
        assert_eq!(turns[9].content(), "msg 11");
    }

    #[test]
    fn window_counts_turns_not_exchanges() {
        let store = HistoryStore::new(4);
        let user = UserId::from("u");
        for i in 0..3 {
            store.append(&user, Turn::user(format!("q{i}")));
            store.append(&user, Turn::assistant(format!("a{i}")));
        }
        assert_eq!(contents(&store.turns(&user)), vec!["q1", "a1", "q2", "a2"]);
    }

    #[test]
    fn zero_window_is_raised_to_one() {
        let store = HistoryStore::new(0);
        let user = UserId::from("u");
        store.append(&user, Turn::user("a"));
        store.append(&user, Turn::user("b"));
        assert_eq!(store.window(), 1);
        assert_eq!(contents(&store.turns(&user)), vec!["b"]);
    }

    #[test]
    fn repeated_reads_are_identical() {
        let store = HistoryStore::default();
        let user = UserId::from("u");
        store.append(&user, Turn::user("x"));
        store.append(&user, Turn::assistant("y"));
        let first = store.turns(&user);
        let second = store.turns(&user);
        assert_eq!(first, second);
    }

    #[test]
    fn users_are_isolated() {
        let store = HistoryStore::default();
        let alice = UserId::from("alice");
        let bob = UserId::from("bob");
        store.append(&alice, Turn::user("from alice"));
        store.append(&bob, Turn::user("from bob"));

        assert_eq!(contents(&store.turns(&alice)), vec!["from alice"]);
        assert_eq!(contents(&store.turns(&bob)), vec!["from bob"]);
        assert_eq!(store.session_count(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_for_different_users_do_not_interfere() {
        let store = Arc::new(HistoryStore::new(10));
        let mut handles = Vec::new();
        for u in 0..16_i64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let user = UserId::from(u);
                for i in 0..20 {
                    store.append(&user, Turn::user(format!("{u}-{i}")));
                    tokio::task::yield_now().await;
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        for u in 0..16_i64 {
            let turns = store.turns(&UserId::from(u));
            assert_eq!(turns.len(), 10);
            assert_eq!(turns[0].content(), format!("{u}-10"));
            assert_eq!(turns[9].content(), format!("{u}-19"));
        }
    }
}
