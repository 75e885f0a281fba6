//! Debounced search with stale-response suppression.
//!
//! Each submission takes a sequence number. It waits out the settle delay
//! and only fires if no newer submission arrived meanwhile; its response is
//! only used if it is still the newest when it comes back.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use taskboard_proto::task::UserRef;
use tracing::debug;

use crate::api::{ApiError, BoardApi};

/// Default settle delay for user search.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Default minimum query length (in characters, after trimming).
pub const DEFAULT_MIN_QUERY_LEN: usize = 2;

/// Result of a debounced call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Debounced<T> {
    /// The call ran and is still the newest.
    Ready(T),
    /// A newer submission replaced this one; nothing to show.
    Superseded,
}

impl<T> Debounced<T> {
    /// The value, if the call was not superseded.
    pub fn ready(self) -> Option<T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::Superseded => None,
        }
    }
}

/// Sequence-numbered debouncer shared by concurrent submissions.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    seq: AtomicU64,
}

impl Debouncer {
    /// A debouncer with the given settle delay.
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self {
            delay,
            seq: AtomicU64::new(0),
        }
    }

    /// The settle delay.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Invalidates every pending submission.
    pub fn cancel(&self) {
        self.seq.fetch_add(1, Ordering::SeqCst);
    }

    fn is_current(&self, ticket: u64) -> bool {
        self.seq.load(Ordering::SeqCst) == ticket
    }

    /// Waits out the delay, then runs `call` unless superseded. Errors from
    /// superseded calls are swallowed along with their results.
    ///
    /// # Errors
    ///
    /// Returns the call's error when it is still the newest submission.
    pub async fn run<T, E, F, Fut>(&self, call: F) -> Result<Debounced<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let ticket = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.delay).await;
        if !self.is_current(ticket) {
            debug!(ticket, "debounced call superseded before firing");
            return Ok(Debounced::Superseded);
        }
        let result = call().await;
        if !self.is_current(ticket) {
            debug!(ticket, "stale debounced response discarded");
            return Ok(Debounced::Superseded);
        }
        result.map(Debounced::Ready)
    }
}

/// Debounced user lookup for the assignee picker.
pub struct UserSearch<A> {
    api: Arc<A>,
    debouncer: Debouncer,
    min_len: usize,
}

impl<A: BoardApi> UserSearch<A> {
    /// Creates a search over `api`.
    pub const fn new(api: Arc<A>, delay: Duration, min_len: usize) -> Self {
        Self {
            api,
            debouncer: Debouncer::new(delay),
            min_len,
        }
    }

    /// Searches users by username. Queries shorter than the minimum resolve
    /// to an empty list at once, without a request, and cancel pending ones.
    ///
    /// # Errors
    ///
    /// Returns the API error of the newest query.
    pub async fn search(&self, query: &str) -> Result<Debounced<Vec<UserRef>>, ApiError> {
        let query = query.trim();
        if query.chars().count() < self.min_len {
            self.debouncer.cancel();
            return Ok(Debounced::Ready(Vec::new()));
        }
        self.debouncer.run(|| self.api.search_users(query)).await
    }
}
