//! Bounded retry policy
//!
//! Hardware buses drop the occasional transaction, so most device accesses
//! want a "try again a couple of times, then give up" wrapper. `RetryPolicy`
//! expresses that policy once (attempt count plus a fixed backoff) rather
//! than inlining the loop at every call site.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::trace;
use std::fmt::Display;
use std::thread;
use std::time::Duration;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A bounded retry policy: up to `max_attempts` tries with a fixed `backoff`
/// sleep between consecutive attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first. Zero attempts is
    /// treated as one.
    pub max_attempts: u32,

    /// Sleep between consecutive attempts.
    pub backoff: Duration,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl RetryPolicy {
    /// Create a new policy.
    pub const fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Run the operation under this policy, returning the first success or
    /// the last error.
    ///
    /// The backoff sleep happens between attempts only, never after the
    /// final one.
    pub fn run<T, E, F>(&self, mut op: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Result<T, E>,
    {
        let attempts = self.max_attempts.max(1);

        let mut attempt = 1;
        loop {
            match op() {
                Ok(t) => return Ok(t),
                Err(e) => {
                    if attempt >= attempts {
                        return Err(e);
                    }
                    trace!(
                        "Attempt {}/{} failed ({}), retrying in {:?}",
                        attempt,
                        attempts,
                        e,
                        self.backoff
                    );
                    thread::sleep(self.backoff);
                    attempt += 1;
                }
            }
        }
    }

    /// Run a success-flag operation under this policy, returning `true` on
    /// the first attempt reporting success.
    pub fn run_bool<F>(&self, mut op: F) -> bool
    where
        F: FnMut() -> bool,
    {
        self.run(|| if op() { Ok(()) } else { Err(AttemptFailed) })
            .is_ok()
    }
}

/// Marker error used by `run_bool`.
struct AttemptFailed;

impl Display for AttemptFailed {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "attempt failed")
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {

    use super::*;
    use std::time::Instant;

    #[test]
    fn test_first_success_is_immediate() {
        let policy = RetryPolicy::new(3, Duration::from_millis(50));
        let mut calls = 0;

        let start = Instant::now();
        let res: Result<u32, &str> = policy.run(|| {
            calls += 1;
            Ok(42)
        });

        assert_eq!(res, Ok(42));
        assert_eq!(calls, 1);
        // No backoff should have been taken
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn test_retries_until_success() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10));
        let mut calls = 0;

        let res: Result<u32, &str> = policy.run(|| {
            calls += 1;
            if calls < 3 {
                Err("not yet")
            } else {
                Ok(7)
            }
        });

        assert_eq!(res, Ok(7));
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_exhausted_returns_last_error() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10));
        let mut calls = 0;

        let start = Instant::now();
        let res: Result<(), String> = policy.run(|| {
            calls += 1;
            Err(format!("fail {}", calls))
        });

        assert_eq!(res, Err(String::from("fail 3")));
        assert_eq!(calls, 3);
        // Two backoffs between the three attempts
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_run_bool() {
        let policy = RetryPolicy::new(2, Duration::from_millis(1));

        let mut calls = 0;
        assert!(policy.run_bool(|| {
            calls += 1;
            calls == 2
        }));
        assert_eq!(calls, 2);

        assert!(!policy.run_bool(|| false));
    }

    #[test]
    fn test_zero_attempts_still_runs_once() {
        let policy = RetryPolicy::new(0, Duration::from_millis(1));
        let mut calls = 0;

        let _: Result<(), &str> = policy.run(|| {
            calls += 1;
            Err("no")
        });

        assert_eq!(calls, 1);
    }
}
