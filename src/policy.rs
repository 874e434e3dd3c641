//! Trip and reopen decisions.

/// What a failed recovery trial does to the guard.
///
/// Entering half-open resets the failure counter, so the two policies only
/// differ when `max_failures > 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TrialFailurePolicy {
    /// Any failed trial sends the guard straight back to open.
    #[default]
    Reopen,

    /// A failed trial counts like a closed-state failure. The guard reopens
    /// only once the counter reaches `max_failures`; until then every new call
    /// is admitted as another trial, one at a time.
    CountTowardThreshold,
}

impl TrialFailurePolicy {
    /// Decides whether a failed trial reopens the guard, given the failure
    /// count after the failure was recorded.
    pub(crate) fn reopens(self, failures: u32, max_failures: u32) -> bool {
        match self {
            TrialFailurePolicy::Reopen => true,
            TrialFailurePolicy::CountTowardThreshold => should_trip(failures, max_failures),
        }
    }
}

/// The only condition that trips a closed guard.
pub(crate) fn should_trip(failures: u32, max_failures: u32) -> bool {
    failures >= max_failures
}
