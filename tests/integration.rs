use authgate_rs::{
    Guard, GuardError, GuardState, HookRegistry, ManualClock, MetricSink, TrialFailurePolicy,
};
use parking_lot::Mutex;
use std::error::Error;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

// Custom error type that implements Error trait
#[derive(Debug)]
struct TestError(String);

impl TestError {
    fn new(msg: &str) -> Self {
        TestError(msg.to_string())
    }
}

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Test error: {}", self.0)
    }
}

impl Error for TestError {}

fn guard_with_clock(
    max_failures: u32,
    reset_ms: u64,
) -> (Guard<TestError, ManualClock>, ManualClock) {
    let clock = ManualClock::new();
    let guard = Guard::<TestError>::builder()
        .name("test")
        .max_failures(max_failures)
        .reset_timeout(Duration::from_millis(reset_ms))
        .clock(clock.clone())
        .build()
        .unwrap();
    (guard, clock)
}

fn fail(guard: &Guard<TestError, ManualClock>) -> Result<String, GuardError<TestError>> {
    guard.call(|| -> Result<String, TestError> { Err(TestError::new("error")) })
}

fn succeed(guard: &Guard<TestError, ManualClock>) -> Result<String, GuardError<TestError>> {
    guard.call(|| -> Result<String, TestError> { Ok("success".to_string()) })
}

#[test]
fn test_scenario_trial_success_closes() {
    let (guard, clock) = guard_with_clock(3, 1000);
    let calls = AtomicUsize::new(0);

    for _ in 0..3 {
        assert!(matches!(fail(&guard), Err(GuardError::Operation(_))));
    }
    assert_eq!(guard.state(), GuardState::Open);

    clock.advance(Duration::from_millis(500));
    let result = guard.call(|| -> Result<String, TestError> {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok("success".to_string())
    });
    match result {
        Err(GuardError::Open(refusal)) => {
            assert_eq!(refusal.retry_after(), Duration::from_millis(500))
        }
        other => panic!("expected refusal, got {:?}", other),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    clock.advance(Duration::from_millis(1000));
    let result = guard.call(|| -> Result<String, TestError> {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok("success".to_string())
    });
    assert_eq!(result.unwrap(), "success");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(guard.state(), GuardState::Closed);
    assert_eq!(guard.failure_count(), 0);
}

#[test]
fn test_scenario_trial_failure_restarts_window() {
    let (guard, clock) = guard_with_clock(3, 1000);

    for _ in 0..3 {
        let _ = fail(&guard);
    }

    clock.advance(Duration::from_millis(1500));
    assert!(matches!(fail(&guard), Err(GuardError::Operation(_))));
    assert_eq!(guard.state(), GuardState::Open);

    // The window now counts from the failed trial, not the original trip.
    clock.advance(Duration::from_millis(500));
    match succeed(&guard) {
        Err(GuardError::Open(refusal)) => {
            assert_eq!(refusal.retry_after(), Duration::from_millis(500))
        }
        other => panic!("expected refusal, got {:?}", other),
    }

    clock.advance(Duration::from_millis(500));
    assert!(succeed(&guard).is_ok());
    assert_eq!(guard.state(), GuardState::Closed);
}

#[test]
fn test_below_threshold_stays_closed() {
    let (guard, _clock) = guard_with_clock(3, 1000);
    let calls = AtomicUsize::new(0);

    for expected in 1..3 {
        let result = guard.call(|| -> Result<(), TestError> {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TestError::new("error"))
        });
        assert!(matches!(result, Err(GuardError::Operation(_))));
        assert_eq!(guard.state(), GuardState::Closed);
        assert_eq!(guard.failure_count(), expected);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_success_resets_failure_count() {
    let (guard, _clock) = guard_with_clock(3, 1000);

    let _ = fail(&guard);
    let _ = fail(&guard);
    assert_eq!(guard.failure_count(), 2);

    assert!(succeed(&guard).is_ok());
    assert_eq!(guard.failure_count(), 0);

    // Two more failures are not enough after the reset.
    let _ = fail(&guard);
    let _ = fail(&guard);
    assert!(guard.is_closed());
}

#[test]
fn test_open_never_invokes_operation() {
    let (guard, clock) = guard_with_clock(1, 1000);
    let calls = AtomicUsize::new(0);

    let _ = fail(&guard);
    assert!(guard.is_open());

    for _ in 0..10 {
        clock.advance(Duration::from_millis(99));
        let result = guard.call(|| -> Result<(), TestError> {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert!(result.unwrap_err().is_open());
    }

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(guard.failure_count(), 1);
}

#[test]
fn test_observers_do_not_reassess() {
    let (guard, clock) = guard_with_clock(1, 1000);
    let _ = fail(&guard);

    clock.advance(Duration::from_secs(5));
    let before = guard.status();
    for _ in 0..3 {
        assert_eq!(guard.state(), GuardState::Open);
        assert_eq!(guard.failure_count(), 1);
        assert!(guard.is_open());
        assert!(!guard.is_closed());
        assert!(!guard.is_half_open());
    }
    assert_eq!(guard.status(), before);
}

#[test]
fn test_operation_error_passes_through() {
    let (guard, _clock) = guard_with_clock(3, 1000);

    let result = guard.call(|| -> Result<String, TestError> { Err(TestError::new("boom")) });
    let err = result.unwrap_err();
    assert_eq!(err.to_string(), "Operation error: Test error: boom");
    assert_eq!(err.into_operation().unwrap().0, "boom");
}

#[test]
fn test_count_toward_threshold_policy() {
    let clock = ManualClock::new();
    let guard = Guard::<TestError>::builder()
        .max_failures(2)
        .reset_timeout(Duration::from_millis(100))
        .trial_policy(TrialFailurePolicy::CountTowardThreshold)
        .clock(clock.clone())
        .build()
        .unwrap();

    let _ = fail(&guard);
    let _ = fail(&guard);
    assert!(guard.is_open());

    clock.advance(Duration::from_millis(100));
    let _ = fail(&guard);
    assert!(guard.is_half_open());
    assert_eq!(guard.failure_count(), 1);

    let _ = fail(&guard);
    assert!(guard.is_open());
}

#[test]
fn test_zero_reset_timeout_admits_trial_immediately() {
    let (guard, _clock) = guard_with_clock(1, 0);

    let _ = fail(&guard);
    assert!(guard.is_open());

    assert!(succeed(&guard).is_ok());
    assert!(guard.is_closed());
}

#[test]
fn test_guard_manual_control() {
    let (guard, clock) = guard_with_clock(3, 1000);

    // Force open
    assert!(guard.trip());
    assert_eq!(guard.state(), GuardState::Open);
    assert!(succeed(&guard).unwrap_err().is_open());

    // Trying to open again should return false (no change)
    assert!(!guard.trip());

    // Force closed
    assert!(guard.reset());
    assert_eq!(guard.state(), GuardState::Closed);
    assert!(!guard.reset());

    // A trip starts a full window of its own
    guard.trip();
    clock.advance(Duration::from_millis(999));
    assert!(succeed(&guard).unwrap_err().is_open());
    clock.advance(Duration::from_millis(1));
    assert!(succeed(&guard).is_ok());
}

#[test]
fn test_guard_builder() {
    let result = Guard::<TestError>::builder().max_failures(0).build();
    assert!(result.is_err());

    let guard = Guard::<TestError>::builder().build().unwrap();
    assert_eq!(guard.config().max_failures(), 3);
    assert_eq!(guard.config().reset_timeout(), Duration::from_secs(30));
    assert_eq!(guard.name(), "guard");
}

#[derive(Clone, Default)]
struct RecordingSink {
    transitions: Arc<Mutex<Vec<(GuardState, GuardState)>>>,
    refusals: Arc<AtomicUsize>,
    trials: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

impl MetricSink for RecordingSink {
    fn record_transition(&self, _guard: &str, from: GuardState, to: GuardState) {
        self.transitions.lock().push((from, to));
    }

    fn record_refusal(&self, _guard: &str) {
        self.refusals.fetch_add(1, Ordering::SeqCst);
    }

    fn record_trial(&self, _guard: &str) {
        self.trials.fetch_add(1, Ordering::SeqCst);
    }

    fn record_call(&self, _guard: &str, _success: bool, _duration: Duration) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_hooks_and_metrics_follow_the_lifecycle() {
    let clock = ManualClock::new();
    let sink = RecordingSink::default();
    let hooks = HookRegistry::new();
    let failures = Arc::new(AtomicUsize::new(0));
    let refused = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&failures);
    hooks.on_failure(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let counter = Arc::clone(&refused);
    hooks.on_refusal(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let guard = Guard::<TestError>::builder()
        .max_failures(2)
        .reset_timeout(Duration::from_secs(1))
        .metric_sink(sink.clone())
        .hooks(hooks)
        .clock(clock.clone())
        .build()
        .unwrap();

    let _ = fail(&guard);
    let _ = fail(&guard);
    let _ = succeed(&guard);
    clock.advance(Duration::from_secs(1));
    let _ = succeed(&guard);

    assert_eq!(
        *sink.transitions.lock(),
        vec![
            (GuardState::Closed, GuardState::Open),
            (GuardState::Open, GuardState::HalfOpen),
            (GuardState::HalfOpen, GuardState::Closed),
        ]
    );
    assert_eq!(sink.refusals.load(Ordering::SeqCst), 1);
    assert_eq!(sink.trials.load(Ordering::SeqCst), 1);
    assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
    assert_eq!(failures.load(Ordering::SeqCst), 2);
    assert_eq!(refused.load(Ordering::SeqCst), 1);
}

#[test]
fn test_parallel_callers_admit_a_single_trial() {
    let (guard, clock) = guard_with_clock(1, 1000);
    let executed = Arc::new(AtomicUsize::new(0));

    let _ = fail(&guard);
    clock.advance(Duration::from_secs(1));

    // The clock is frozen, so a failed trial reopens the guard for good and
    // every other caller must be refused, whatever the interleaving.
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let guard = guard.clone();
            let executed = Arc::clone(&executed);
            thread::spawn(move || {
                guard.call(|| -> Result<(), TestError> {
                    executed.fetch_add(1, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(20));
                    Err(TestError::new("still down"))
                })
            })
        })
        .collect();

    let refusals = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .filter(|result| matches!(result, Err(GuardError::Open(_))))
        .count();

    assert_eq!(executed.load(Ordering::SeqCst), 1);
    assert_eq!(refusals, 7);
    assert!(guard.is_open());
}

#[test]
fn test_panicking_hook_does_not_hold_the_trial_slot() {
    let clock = ManualClock::new();
    let hooks = HookRegistry::new();
    let armed = Arc::new(AtomicBool::new(true));
    let hook_armed = Arc::clone(&armed);
    hooks.on_half_open(move || {
        if hook_armed.swap(false, Ordering::SeqCst) {
            panic!("listener failed");
        }
    });

    let guard = Guard::<TestError>::builder()
        .max_failures(1)
        .reset_timeout(Duration::from_millis(1000))
        .hooks(hooks)
        .clock(clock.clone())
        .build()
        .unwrap();

    let _ = fail(&guard);
    clock.advance(Duration::from_millis(1000));

    let calls = AtomicUsize::new(0);
    let unwound = panic::catch_unwind(AssertUnwindSafe(|| {
        guard.call(|| -> Result<String, TestError> {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok("success".to_string())
        })
    }));
    assert!(unwound.is_err());
    assert!(!armed.load(Ordering::SeqCst));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(guard.state(), GuardState::HalfOpen);

    assert_eq!(succeed(&guard).unwrap(), "success");
    assert_eq!(guard.state(), GuardState::Closed);
    assert_eq!(guard.failure_count(), 0);
}

mod async_tests {
    use super::*;
    use tokio::sync::oneshot;
    use tokio_test::{assert_pending, assert_ready, task};

    #[tokio::test]
    async fn test_async_guard() {
        let (guard, _clock) = guard_with_clock(2, 1000);

        // Test successful async calls
        for _ in 0..5 {
            let result = guard
                .call_async(|| async { Result::<String, TestError>::Ok("success".to_string()) })
                .await;
            assert!(result.is_ok());
        }

        // Make 2 failing calls to trip the guard
        for _ in 0..2 {
            let result = guard
                .call_async(|| async { Result::<String, TestError>::Err(TestError::new("error")) })
                .await;
            assert!(matches!(result, Err(GuardError::Operation(_))));
        }
        assert_eq!(guard.state(), GuardState::Open);

        // Calls should be rejected
        let result = guard
            .call_async(|| async { Result::<String, TestError>::Ok("success".to_string()) })
            .await;
        assert!(matches!(result, Err(GuardError::Open(_))));
    }

    #[test]
    fn test_second_call_during_trial_is_refused() {
        let (guard, clock) = guard_with_clock(1, 1000);
        let _ = fail(&guard);
        clock.advance(Duration::from_secs(1));

        let (tx, rx) = oneshot::channel::<Result<(), TestError>>();
        let mut trial = task::spawn(guard.call_async(|| async move { rx.await.unwrap() }));
        assert_pending!(trial.poll());
        assert!(guard.is_half_open());

        let calls = AtomicUsize::new(0);
        let result = guard.call(|| -> Result<(), TestError> {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        match result {
            Err(GuardError::Open(refusal)) => assert_eq!(refusal.retry_after(), Duration::ZERO),
            other => panic!("expected refusal, got {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        tx.send(Ok(())).unwrap();
        assert!(assert_ready!(trial.poll()).is_ok());
        assert!(guard.is_closed());
    }

    #[test]
    fn test_dropped_trial_releases_slot() {
        let (guard, clock) = guard_with_clock(1, 1000);
        let _ = fail(&guard);
        clock.advance(Duration::from_secs(1));

        let mut trial = task::spawn(
            guard.call_async(|| std::future::pending::<Result<(), TestError>>()),
        );
        assert_pending!(trial.poll());
        drop(trial);

        assert!(guard.is_half_open());
        assert!(succeed(&guard).is_ok());
        assert!(guard.is_closed());
    }

    #[test]
    fn test_overlapping_failures_trip_together() {
        let (guard, _clock) = guard_with_clock(2, 1000);

        let (tx1, rx1) = oneshot::channel::<Result<(), TestError>>();
        let (tx2, rx2) = oneshot::channel::<Result<(), TestError>>();
        let mut first = task::spawn(guard.call_async(|| async move { rx1.await.unwrap() }));
        let mut second = task::spawn(guard.call_async(|| async move { rx2.await.unwrap() }));

        // Both are admitted while closed.
        assert_pending!(first.poll());
        assert_pending!(second.poll());
        assert!(guard.is_closed());

        tx1.send(Err(TestError::new("first"))).unwrap();
        tx2.send(Err(TestError::new("second"))).unwrap();
        assert!(matches!(
            assert_ready!(first.poll()),
            Err(GuardError::Operation(_))
        ));
        assert!(matches!(
            assert_ready!(second.poll()),
            Err(GuardError::Operation(_))
        ));

        assert!(guard.is_open());
        assert_eq!(guard.failure_count(), 2);
    }

    #[test]
    fn test_stale_success_does_not_close() {
        let (guard, _clock) = guard_with_clock(1, 1000);

        let (tx, rx) = oneshot::channel::<Result<(), TestError>>();
        let mut slow = task::spawn(guard.call_async(|| async move { rx.await.unwrap() }));
        assert_pending!(slow.poll());

        let _ = fail(&guard);
        assert!(guard.is_open());

        tx.send(Ok(())).unwrap();
        assert!(assert_ready!(slow.poll()).is_ok());
        assert!(guard.is_open());
        assert_eq!(guard.failure_count(), 1);
    }
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_below_threshold_always_executes(
            max_failures in 1u32..8,
            outcomes in proptest::collection::vec(any::<bool>(), 0..64),
        ) {
            let (guard, _clock) = guard_with_clock(max_failures, 1000);
            let calls = AtomicUsize::new(0);
            let mut consecutive = 0u32;

            for (i, wants_failure) in outcomes.into_iter().enumerate() {
                // Never let the run reach the threshold.
                let failure = wants_failure && consecutive + 1 < max_failures;
                let result = guard.call(|| -> Result<(), TestError> {
                    calls.fetch_add(1, Ordering::SeqCst);
                    if failure { Err(TestError::new("error")) } else { Ok(()) }
                });

                consecutive = if failure { consecutive + 1 } else { 0 };
                prop_assert_eq!(result.is_ok(), !failure);
                prop_assert_eq!(calls.load(Ordering::SeqCst), i + 1);
                prop_assert_eq!(guard.state(), GuardState::Closed);
                prop_assert_eq!(guard.failure_count(), consecutive);
            }
        }
    }
}
