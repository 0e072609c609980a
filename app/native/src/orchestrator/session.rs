//! Fetch sessions and supersession.

use std::fmt;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// Monotonically increasing id of a fetch session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SessionId(u64);

impl SessionId {
    #[must_use]
    pub const fn get(self) -> u64 { self.0 }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "#{}", self.0) }
}

/// One in-flight fetch: who runs it and how to stop it.
#[derive(Debug, Clone)]
pub struct FetchSession {
    pub id: SessionId,
    pub source: String,
    pub cancel: CancellationToken,
}

/// Tracks the current session. Only the current session may cause effects.
#[derive(Debug, Default)]
pub struct SessionTracker {
    last: u64,
    current: Option<FetchSession>,
}

impl SessionTracker {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Starts a new session for `source`, cancelling the current one.
    ///
    /// Returns the superseded session, if any, so the caller can tell its
    /// provider to stop.
    pub fn begin(&mut self, source: &str) -> (FetchSession, Option<FetchSession>) {
        let superseded = self.cancel();
        self.last += 1;
        let session = FetchSession {
            id: SessionId(self.last),
            source: source.to_string(),
            cancel: CancellationToken::new(),
        };
        self.current = Some(session.clone());
        (session, superseded)
    }

    /// Cancels the current session, if any, and returns it.
    pub fn cancel(&mut self) -> Option<FetchSession> {
        let session = self.current.take()?;
        session.cancel.cancel();
        Some(session)
    }

    /// `true` if `id` is the session whose results are still wanted.
    #[must_use]
    pub fn is_current(&self, id: SessionId) -> bool {
        self.current.as_ref().is_some_and(|session| session.id == id)
    }

    /// Ends session `id` without cancelling it. Stale ids are ignored.
    pub fn finish(&mut self, id: SessionId) {
        if self.is_current(id) {
            self.current = None;
        }
    }

    #[must_use]
    pub const fn current(&self) -> Option<&FetchSession> { self.current.as_ref() }

    /// Id of the most recently started session.
    #[must_use]
    pub const fn last_id(&self) -> Option<SessionId> {
        if self.last == 0 { None } else { Some(SessionId(self.last)) }
    }
}
