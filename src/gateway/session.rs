//! Session storage and navigation used after a successful login.

use parking_lot::RwLock;
use std::sync::Arc;

/// Holds the access token of the current user.
pub trait SessionStore: Send + Sync {
    /// Stores the token issued by a successful login.
    fn save_token(&self, token: &str);

    /// Returns the stored token, if any.
    fn token(&self) -> Option<String>;

    /// Forgets everything about the current user.
    fn clear(&self);
}

/// Moves the user to another route.
pub trait Navigator: Send + Sync {
    /// Navigates to the named route.
    fn push(&self, route: &str);
}

/// Process-local session store. Clones share the same session.
#[derive(Debug, Clone, Default)]
pub struct InMemorySession {
    token: Arc<RwLock<Option<String>>>,
}

impl InMemorySession {
    /// Creates an empty session.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySession {
    fn save_token(&self, token: &str) {
        *self.token.write() = Some(token.to_string());
    }

    fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    fn clear(&self) {
        *self.token.write() = None;
    }
}

/// Navigator for headless callers that have nowhere to go.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn push(&self, _route: &str) {}
}
