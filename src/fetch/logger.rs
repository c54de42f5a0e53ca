//! Session-scoped dedup of resource-failure warnings.

use std::collections::HashMap;

use std::sync::Mutex;

use crate::fetch::{AsKind, origin_of};
use crate::util::{lock_unpoisoned, now_ms};

/// A repeated failure logs again only after this much time.
const DEDUP_WINDOW_MS: u64 = 30_000;
/// Hard cap on warnings emitted per session.
const SESSION_CAP: usize = 50;

/// Forwards fetch failures through `log::warn!`, at most once per
/// `(reason, kind, origin)` within the dedup window and capped per session.
#[derive(Default)]
pub struct SessionLogger {
    state: Mutex<LoggerState>,
}

#[derive(Default)]
struct LoggerState {
    seen: HashMap<(String, AsKind, String), u64>,
    emitted: usize,
}

impl SessionLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn_failure(&self, reason: &str, kind: AsKind, url: &str) {
        let origin = origin_of(url);
        let now = now_ms();
        let mut state = lock_unpoisoned(&self.state);
        if state.emitted >= SESSION_CAP {
            return;
        }
        let key = (reason.to_string(), kind, origin.clone());
        if let Some(&last) = state.seen.get(&key)
            && now.saturating_sub(last) < DEDUP_WINDOW_MS
        {
            return;
        }
        state.seen.insert(key, now);
        state.emitted += 1;
        log::warn!("resource fetch failed ({reason}) as {kind:?} from {origin}");
    }

    /// Forget dedup history, starting a fresh session window.
    pub fn reset(&self) {
        let mut state = lock_unpoisoned(&self.state);
        state.seen.clear();
        state.emitted = 0;
    }

    #[cfg(test)]
    pub(crate) fn emitted(&self) -> usize {
        lock_unpoisoned(&self.state).emitted
    }
}
