//! Guard walkthrough.
//!
//! Drives a guard through a full outage and recovery against a simulated
//! service, printing every state change from hooks.
//!
//! Run with `cargo run --example basic`.

use authgate_rs::{Guard, GuardError, HookRegistry};
use std::error::Error;
use std::fmt;
use std::thread;
use std::time::Duration;

// Custom error type that implements Error trait
#[derive(Debug)]
struct ServiceError(String);

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Service error: {}", self.0)
    }
}

impl Error for ServiceError {}

// Succeeds for 3 calls, fails for the next 5, then recovers for good.
fn users_service(call: u32) -> Result<String, ServiceError> {
    match call {
        1..=3 => Ok("user list".to_string()),
        4..=8 => Err(ServiceError("connection refused".to_string())),
        _ => Ok("user list (recovered)".to_string()),
    }
}

fn main() {
    let hooks = HookRegistry::new();
    hooks.on_transition(|from, to| println!("  state change: {} -> {}", from, to));
    hooks.on_refusal(|refusal| println!("  refused, retry in {:?}", refusal.retry_after()));

    let guard = Guard::<ServiceError>::builder()
        .name("users-api")
        .max_failures(3)
        .reset_timeout(Duration::from_millis(1500))
        .hooks(hooks)
        .build()
        .expect("valid guard settings");

    println!("Initial state: {}", guard.state());

    let mut attempts = 0;
    for i in 1..=14 {
        println!("\nCall {}:", i);

        let result = guard.call(|| {
            attempts += 1;
            users_service(attempts)
        });

        match result {
            Ok(response) => println!("  response: {}", response),
            Err(GuardError::Open(_)) => println!("  guard open, service not called"),
            Err(GuardError::Operation(err)) => println!("  {}", err),
        }

        let status = guard.status();
        println!("  state={}, failures={}", status.state, status.failures);

        thread::sleep(Duration::from_millis(400));
    }
}
