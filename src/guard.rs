//! Core guard implementation.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::{GuardBuilder, GuardConfig};
use crate::error::{GuardError, GuardResult, OpenError};
use crate::hook::HookRegistry;
use crate::metrics::MetricSink;
use crate::state::{Admission, Decision, Event, GuardState, GuardStatus, Outcome, Record};

/// Inner state of the guard, shared between clones.
struct GuardInner<C: Clock> {
    name: String,
    config: GuardConfig,
    record: Mutex<Record>,
    clock: C,
    metric_sink: Arc<dyn MetricSink>,
    hooks: Arc<HookRegistry>,
}

impl<C: Clock> GuardInner<C> {
    /// Runs one transition step under the record lock. The state change, if
    /// any, is returned for reporting once the caller is ready.
    fn update<R>(
        &self,
        step: impl FnOnce(Record, Instant, &GuardConfig) -> (Record, R),
    ) -> (R, Option<Transition>) {
        let (previous, next, result) = {
            let mut record = self.record.lock();
            let previous = *record;
            let (next, result) = step(previous, self.clock.now(), &self.config);
            *record = next;
            (previous, next, result)
        };

        let change = (previous.state != next.state).then_some(Transition {
            from: previous.state,
            to: next.state,
            failures: next.failure_count,
        });

        (result, change)
    }

    fn transition(&self, event: Event) -> Outcome {
        let (outcome, change) =
            self.update(|record, now, config| record.apply(event, now, config));
        self.report(change);
        outcome
    }

    fn report(&self, change: Option<Transition>) {
        if let Some(Transition { from, to, failures }) = change {
            self.report_transition(from, to, failures);
        }
    }

    fn report_transition(&self, from: GuardState, to: GuardState, failures: u32) {
        match to {
            GuardState::Open => warn!(
                guard = %self.name,
                %from,
                %to,
                failures,
                reset_timeout_ms = self.config.reset_timeout().as_millis() as u64,
                "guard opened"
            ),
            _ => info!(guard = %self.name, %from, %to, failures, "guard state changed"),
        }

        self.hooks.execute_transition(from, to);
        self.metric_sink.record_transition(&self.name, from, to);
    }
}

/// A state change observed by one transition step.
#[derive(Debug, Clone, Copy)]
struct Transition {
    from: GuardState,
    to: GuardState,
    failures: u32,
}

/// Proof that a call was admitted. Settling it records the outcome; dropping
/// it unsettled releases a trial slot.
struct Ticket<'a, C: Clock> {
    inner: &'a GuardInner<C>,
    admission: Admission,
    started: Instant,
    settled: bool,
}

impl<'a, C: Clock> Ticket<'a, C> {
    fn settle<T, E>(mut self, result: &Result<T, E>) {
        self.settled = true;
        let duration = self.started.elapsed();

        let event = match result {
            Ok(_) => Event::Succeeded(self.admission),
            Err(_) => Event::Failed(self.admission),
        };
        self.inner.transition(event);

        let success = result.is_ok();
        self.inner
            .metric_sink
            .record_call(&self.inner.name, success, duration);
        if success {
            self.inner.hooks.execute_success();
        } else {
            self.inner.hooks.execute_failure();
        }
    }
}

impl<'a, C: Clock> Drop for Ticket<'a, C> {
    fn drop(&mut self) {
        if !self.settled {
            debug!(guard = %self.inner.name, admission = ?self.admission, "guarded call abandoned");
            self.inner.transition(Event::Abandoned(self.admission));
        }
    }
}

/// A guard that gates calls to one dependency.
///
/// Cloning is cheap; clones share the same state.
pub struct Guard<E, C = SystemClock>
where
    E: std::error::Error + 'static,
    C: Clock,
{
    inner: Arc<GuardInner<C>>,
    _error_type: PhantomData<fn() -> E>,
}

impl<E> Guard<E, SystemClock>
where
    E: std::error::Error + 'static,
{
    /// Creates a new builder for customizing a guard.
    pub fn builder() -> GuardBuilder<E, SystemClock> {
        GuardBuilder::new()
    }
}

impl<E, C> Guard<E, C>
where
    E: std::error::Error + 'static,
    C: Clock,
{
    pub(crate) fn new(
        name: String,
        config: GuardConfig,
        clock: C,
        metric_sink: Arc<dyn MetricSink>,
        hooks: Arc<HookRegistry>,
    ) -> Self {
        let inner = GuardInner {
            name,
            config,
            record: Mutex::new(Record::new()),
            clock,
            metric_sink,
            hooks,
        };

        Self {
            inner: Arc::new(inner),
            _error_type: PhantomData,
        }
    }

    /// Name used in log events and metric labels.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Settings the guard was built with.
    pub fn config(&self) -> GuardConfig {
        self.inner.config
    }

    /// Gets the current state.
    ///
    /// This is the stored label. An open guard whose window has elapsed still
    /// reports open until the next call reassesses it.
    pub fn state(&self) -> GuardState {
        self.inner.record.lock().state
    }

    /// Gets the current consecutive-failure count.
    pub fn failure_count(&self) -> u32 {
        self.inner.record.lock().failure_count
    }

    /// Returns `true` if the guard is open.
    pub fn is_open(&self) -> bool {
        self.state() == GuardState::Open
    }

    /// Returns `true` if the guard is closed.
    pub fn is_closed(&self) -> bool {
        self.state() == GuardState::Closed
    }

    /// Returns `true` if the guard is half-open.
    pub fn is_half_open(&self) -> bool {
        self.state() == GuardState::HalfOpen
    }

    /// Takes a consistent snapshot of state and failure count.
    pub fn status(&self) -> GuardStatus {
        GuardStatus::of(&self.inner.record.lock())
    }

    /// Executes a function wrapped by the guard.
    pub fn call<F, T>(&self, f: F) -> GuardResult<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let ticket = self.admit()?;
        let result = f();
        ticket.settle(&result);

        result.map_err(GuardError::Operation)
    }

    /// Executes an async function wrapped by the guard.
    ///
    /// Admission happens before `f` is called. If the returned future is
    /// dropped before the operation resolves, nothing is counted and a trial
    /// slot it held is released.
    pub async fn call_async<F, Fut, T>(&self, f: F) -> GuardResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let ticket = self.admit()?;
        let result = f().await;
        ticket.settle(&result);

        result.map_err(GuardError::Operation)
    }

    /// Decides whether a call may run.
    fn admit(&self) -> Result<Ticket<'_, C>, GuardError<E>> {
        let (decision, change) = self
            .inner
            .update(|record, now, config| record.attempt(now, config));

        match decision {
            Decision::Admit(admission) => {
                // The ticket must exist before any listener runs, so a
                // panicking hook still releases the trial slot on unwind.
                let ticket = Ticket {
                    inner: &self.inner,
                    admission,
                    started: Instant::now(),
                    settled: false,
                };

                self.inner.report(change);
                if let Admission::Trial(_) = admission {
                    debug!(guard = %self.inner.name, "admitting recovery trial");
                    self.inner.metric_sink.record_trial(&self.inner.name);
                }
                Ok(ticket)
            }
            Decision::Refuse { retry_after } => {
                self.inner.report(change);
                let error = OpenError::new(retry_after);
                debug!(
                    guard = %self.inner.name,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "call refused"
                );
                self.inner.metric_sink.record_refusal(&self.inner.name);
                self.inner.hooks.execute_refusal(&error);
                Err(GuardError::Open(error))
            }
        }
    }

    /// Forces the guard open, starting a fresh reset window.
    ///
    /// Returns `false` if the guard was already open.
    pub fn trip(&self) -> bool {
        self.inner.transition(Event::Trip) == Outcome::Recorded
    }

    /// Forces the guard closed and clears its failure history.
    ///
    /// Returns `false` if the guard was already closed with no failures.
    pub fn reset(&self) -> bool {
        self.inner.transition(Event::Reset) == Outcome::Recorded
    }
}

// Allow cloning of guards - cheap because inner state is Arc'd
impl<E, C> Clone for Guard<E, C>
where
    E: std::error::Error + 'static,
    C: Clock,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _error_type: PhantomData,
        }
    }
}

impl<E, C> fmt::Debug for Guard<E, C>
where
    E: std::error::Error + 'static,
    C: Clock,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guard")
            .field("name", &self.inner.name)
            .field("config", &self.inner.config)
            .field("status", &self.status())
            .finish()
    }
}
