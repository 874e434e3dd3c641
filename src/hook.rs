//! Hook registry for guard events.

use crate::error::OpenError;
use crate::state::GuardState;
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

type TransitionFn = Arc<dyn Fn(GuardState, GuardState) + Send + Sync + 'static>;
type RefusalFn = Arc<dyn Fn(&OpenError) + Send + Sync + 'static>;
type EventFn = Arc<dyn Fn() + Send + Sync + 'static>;

type Listeners<F> = RwLock<SmallVec<[F; 2]>>;

/// A registry for guard event hooks.
///
/// Any number of listeners can be attached to each event. Listeners run on
/// the calling task after the guard has released its lock, in registration
/// order, so they may safely read the guard or register more hooks.
pub struct HookRegistry {
    on_transition: Listeners<TransitionFn>,
    on_refusal: Listeners<RefusalFn>,
    on_success: Listeners<EventFn>,
    on_failure: Listeners<EventFn>,
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("on_transition", &self.on_transition.read().len())
            .field("on_refusal", &self.on_refusal.read().len())
            .field("on_success", &self.on_success.read().len())
            .field("on_failure", &self.on_failure.read().len())
            .finish()
    }
}

impl HookRegistry {
    /// Creates a new empty hook registry.
    pub fn new() -> Self {
        Self {
            on_transition: RwLock::new(SmallVec::new()),
            on_refusal: RwLock::new(SmallVec::new()),
            on_success: RwLock::new(SmallVec::new()),
            on_failure: RwLock::new(SmallVec::new()),
        }
    }

    /// Adds a listener for every state change, called with `(from, to)`.
    pub fn on_transition<F>(&self, f: F)
    where
        F: Fn(GuardState, GuardState) + Send + Sync + 'static,
    {
        self.on_transition.write().push(Arc::new(f));
    }

    /// Adds a listener for transitions into open.
    pub fn on_open<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_entering(GuardState::Open, f);
    }

    /// Adds a listener for transitions into closed.
    pub fn on_close<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_entering(GuardState::Closed, f);
    }

    /// Adds a listener for transitions into half-open.
    pub fn on_half_open<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_entering(GuardState::HalfOpen, f);
    }

    /// Adds a listener for refused calls.
    pub fn on_refusal<F>(&self, f: F)
    where
        F: Fn(&OpenError) + Send + Sync + 'static,
    {
        self.on_refusal.write().push(Arc::new(f));
    }

    /// Adds a listener for successful operations.
    pub fn on_success<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_success.write().push(Arc::new(f));
    }

    /// Adds a listener for failed operations.
    pub fn on_failure<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_failure.write().push(Arc::new(f));
    }

    fn on_entering<F>(&self, target: GuardState, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_transition(move |_, to| {
            if to == target {
                f();
            }
        });
    }

    pub(crate) fn execute_transition(&self, from: GuardState, to: GuardState) {
        let hooks = self.on_transition.read().clone();
        for hook in &hooks {
            hook(from, to);
        }
    }

    pub(crate) fn execute_refusal(&self, error: &OpenError) {
        let hooks = self.on_refusal.read().clone();
        for hook in &hooks {
            hook(error);
        }
    }

    pub(crate) fn execute_success(&self) {
        let hooks = self.on_success.read().clone();
        for hook in &hooks {
            hook();
        }
    }

    pub(crate) fn execute_failure(&self) {
        let hooks = self.on_failure.read().clone();
        for hook in &hooks {
            hook();
        }
    }
}
