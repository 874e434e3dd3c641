//! Guard state machine.
//!
//! The whole state of a guard is a small `Copy` record. Every decision is made
//! by a pure function of the record, the current instant and the
//! configuration: [`Record::attempt`] decides whether a new call runs, and
//! [`Record::apply`] folds in everything else. The guard handle calls them
//! under a single lock, so admission and the bookkeeping that goes with it can
//! never be observed half-done.

use std::fmt::{self, Display, Formatter};
use std::time::{Duration, Instant};

use crate::config::GuardConfig;
use crate::policy::should_trip;

/// Represents the possible states of a guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GuardState {
    /// Calls flow through to the dependency.
    Closed = 0,

    /// Calls are refused without touching the dependency.
    Open = 1,

    /// A single trial call is allowed through to test recovery.
    HalfOpen = 2,
}

impl GuardState {
    /// Stable name of the state, as used in status payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            GuardState::Closed => "Closed",
            GuardState::Open => "Open",
            GuardState::HalfOpen => "HalfOpen",
        }
    }
}

impl Display for GuardState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only snapshot of a guard for health and diagnostics surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct GuardStatus {
    /// Current state.
    pub state: GuardState,
    /// Current consecutive-failure count.
    pub failures: u32,
    /// `state == Open`.
    pub is_open: bool,
    /// `state == Closed`.
    pub is_closed: bool,
    /// `state == HalfOpen`.
    pub is_half_open: bool,
}

impl GuardStatus {
    pub(crate) fn of(record: &Record) -> Self {
        Self {
            state: record.state,
            failures: record.failure_count,
            is_open: record.state == GuardState::Open,
            is_closed: record.state == GuardState::Closed,
            is_half_open: record.state == GuardState::HalfOpen,
        }
    }
}

/// How a call was let through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    /// Ordinary call admitted while closed.
    Normal,

    /// Recovery trial. The epoch ties the outcome to the trial that was
    /// admitted, so a trial overtaken by a manual reset cannot settle a later
    /// one.
    Trial(u64),
}

/// Verdict on a new call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Decision {
    /// Run the operation.
    Admit(Admission),
    /// Do not run the operation.
    Refuse { retry_after: Duration },
}

/// Events recorded after admission, plus manual control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Event {
    /// An admitted call returned `Ok`.
    Succeeded(Admission),
    /// An admitted call returned `Err`.
    Failed(Admission),
    /// An admitted call was dropped before it resolved.
    Abandoned(Admission),
    /// Manual trip to open.
    Trip,
    /// Manual reset to closed.
    Reset,
}

/// Whether [`Record::apply`] changed anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// The event was recorded.
    Recorded,
    /// The event had no effect.
    Unchanged,
}

/// The full mutable state of one guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Record {
    pub(crate) state: GuardState,
    pub(crate) failure_count: u32,
    pub(crate) last_failure: Option<Instant>,
    pub(crate) trial_in_flight: bool,
    pub(crate) trial_epoch: u64,
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

impl Record {
    /// A fresh, closed record.
    pub(crate) const fn new() -> Self {
        Self {
            state: GuardState::Closed,
            failure_count: 0,
            last_failure: None,
            trial_in_flight: false,
            trial_epoch: 0,
        }
    }

    /// Applies `event` at `now` and returns the next record with the outcome.
    pub(crate) fn apply(self, event: Event, now: Instant, config: &GuardConfig) -> (Self, Outcome) {
        match event {
            Event::Succeeded(admission) => self.succeeded(admission),
            Event::Failed(admission) => self.failed(admission, now, config),
            Event::Abandoned(admission) => {
                if self.is_current_trial(admission) {
                    let next = Self {
                        trial_in_flight: false,
                        ..self
                    };
                    (next, Outcome::Recorded)
                } else {
                    (self, Outcome::Unchanged)
                }
            }
            Event::Trip => {
                if self.state == GuardState::Open {
                    return (self, Outcome::Unchanged);
                }
                let next = Self {
                    state: GuardState::Open,
                    last_failure: Some(now),
                    trial_in_flight: false,
                    ..self
                };
                (next, Outcome::Recorded)
            }
            Event::Reset => {
                if self.state == GuardState::Closed && self.failure_count == 0 {
                    return (self, Outcome::Unchanged);
                }
                let next = Self {
                    state: GuardState::Closed,
                    failure_count: 0,
                    last_failure: None,
                    trial_in_flight: false,
                    ..self
                };
                (next, Outcome::Recorded)
            }
        }
    }

    /// Decides whether a call arriving at `now` may run.
    pub(crate) fn attempt(self, now: Instant, config: &GuardConfig) -> (Self, Decision) {
        match self.state {
            GuardState::Closed => (self, Decision::Admit(Admission::Normal)),
            GuardState::Open => {
                let elapsed = self
                    .last_failure
                    .map(|at| now.saturating_duration_since(at));

                match elapsed {
                    Some(elapsed) if elapsed < config.reset_timeout() => {
                        let retry_after = config.reset_timeout() - elapsed;
                        (self, Decision::Refuse { retry_after })
                    }
                    // The window has elapsed: this call is the trial.
                    _ => {
                        let epoch = self.trial_epoch.wrapping_add(1);
                        let next = Self {
                            state: GuardState::HalfOpen,
                            failure_count: 0,
                            trial_in_flight: true,
                            trial_epoch: epoch,
                            ..self
                        };
                        (next, Decision::Admit(Admission::Trial(epoch)))
                    }
                }
            }
            GuardState::HalfOpen => {
                if self.trial_in_flight {
                    return (
                        self,
                        Decision::Refuse {
                            retry_after: Duration::ZERO,
                        },
                    );
                }
                let epoch = self.trial_epoch.wrapping_add(1);
                let next = Self {
                    trial_in_flight: true,
                    trial_epoch: epoch,
                    ..self
                };
                (next, Decision::Admit(Admission::Trial(epoch)))
            }
        }
    }

    fn succeeded(self, admission: Admission) -> (Self, Outcome) {
        if self.is_current_trial(admission) {
            let next = Self {
                state: GuardState::Closed,
                failure_count: 0,
                trial_in_flight: false,
                ..self
            };
            return (next, Outcome::Recorded);
        }

        // Successes that resolve after the guard left closed are stale.
        if self.state == GuardState::Closed {
            let next = Self {
                failure_count: 0,
                ..self
            };
            (next, Outcome::Recorded)
        } else {
            (self, Outcome::Unchanged)
        }
    }

    fn failed(self, admission: Admission, now: Instant, config: &GuardConfig) -> (Self, Outcome) {
        let failure_count = self.failure_count.saturating_add(1);
        let mut next = Self {
            failure_count,
            last_failure: Some(now),
            ..self
        };

        if self.is_current_trial(admission) {
            next.trial_in_flight = false;
            if config
                .trial_policy()
                .reopens(failure_count, config.max_failures())
            {
                next.state = GuardState::Open;
            }
        } else if self.state == GuardState::Closed
            && should_trip(failure_count, config.max_failures())
        {
            next.state = GuardState::Open;
        }

        (next, Outcome::Recorded)
    }

    fn is_current_trial(&self, admission: Admission) -> bool {
        match admission {
            Admission::Trial(epoch) => {
                self.state == GuardState::HalfOpen
                    && self.trial_in_flight
                    && self.trial_epoch == epoch
            }
            Admission::Normal => false,
        }
    }
}
