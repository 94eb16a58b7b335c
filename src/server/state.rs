use crate::config::Config;
use crate::session::BrowsingSession;
use crate::store::RecordStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

/// Sessions for callers that don't name one.
pub const DEFAULT_SESSION: &str = "default";

struct Slot {
    session: BrowsingSession,
    last_used: Instant,
}

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn RecordStore>,
    sessions: Mutex<HashMap<String, Slot>>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn RecordStore>) -> Self {
        Self { config, store, sessions: Mutex::new(HashMap::new()) }
    }

    fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.config.session_ttl_secs)
    }

    /// Run `f` on the named session, creating it on first use.
    ///
    /// Sessions idle longer than the configured TTL are dropped first.
    /// The lock is held only for the duration of `f`; never call the
    /// store from inside it.
    pub fn with_session<R>(&self, key: &str, f: impl FnOnce(&mut BrowsingSession) -> R) -> R {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        evict_idle(&mut sessions, now, self.idle_ttl());
        let slot = sessions.entry(key.to_string()).or_insert_with(|| Slot {
            session: BrowsingSession::new(self.config.session_options()),
            last_used: now,
        });
        slot.last_used = now;
        f(&mut slot.session)
    }

    /// Run `f` on the named session if it exists. Never creates one.
    pub fn read_session<R>(&self, key: &str, f: impl FnOnce(&BrowsingSession) -> R) -> Option<R> {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        evict_idle(&mut sessions, now, self.idle_ttl());
        let slot = sessions.get_mut(key)?;
        slot.last_used = now;
        Some(f(&slot.session))
    }

    /// Drop sessions not used since `now - ttl`. Returns how many went.
    pub fn evict_idle_at(&self, now: Instant) -> usize {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        evict_idle(&mut sessions, now, self.idle_ttl())
    }

    /// Drop a session. Returns whether it existed.
    pub fn remove_session(&self, key: &str) -> bool {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.remove(key).is_some()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

fn evict_idle(sessions: &mut HashMap<String, Slot>, now: Instant, ttl: Duration) -> usize {
    let before = sessions.len();
    sessions.retain(|_, slot| now.saturating_duration_since(slot.last_used) <= ttl);
    let evicted = before - sessions.len();
    if evicted > 0 {
        debug!(evicted, remaining = sessions.len(), "dropped idle sessions");
    }
    evicted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn state(ttl: u64) -> AppState {
        let config = Config { session_ttl_secs: ttl, ..Config::default() };
        AppState::new(config, Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_read_does_not_create() {
        let state = state(60);
        assert_eq!(state.read_session("ghost", |s| s.records().len()), None);
        assert_eq!(state.session_count(), 0);

        state.with_session("a", |_| ());
        assert_eq!(state.read_session("a", |s| s.records().len()), Some(0));
        assert_eq!(state.session_count(), 1);
    }

    #[test]
    fn test_idle_sessions_are_evicted() {
        let state = state(60);
        state.with_session("a", |_| ());
        state.with_session("b", |_| ());
        assert_eq!(state.evict_idle_at(Instant::now()), 0);
        assert_eq!(state.session_count(), 2);

        let later = Instant::now() + Duration::from_secs(61);
        assert_eq!(state.evict_idle_at(later), 2);
        assert_eq!(state.session_count(), 0);
    }

    #[test]
    fn test_use_refreshes_idle_clock() {
        let state = state(60);
        state.with_session("a", |_| ());
        state.with_session("b", |_| ());
        std::thread::sleep(Duration::from_millis(20));
        let touched = Instant::now();
        state.read_session("a", |_| ());

        // Only "b" has been idle longer than the TTL at this point.
        let cutoff = touched + Duration::from_secs(60);
        assert_eq!(state.evict_idle_at(cutoff), 1);
        assert_eq!(state.read_session("a", |_| ()), Some(()));
        assert_eq!(state.read_session("b", |_| ()), None);
    }
}
