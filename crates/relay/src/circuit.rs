//! Per-route circuit breaker (§4.4): CLOSED/OPEN/HALF_OPEN, failure
//! threshold 5, reset window 60s. Keyed by route name in a
//! `RwLock<HashMap<_, Mutex<_>>>`, matching the sharded-map
//! fast-read/slow-write-insert idiom used for per-key state elsewhere in
//! this codebase.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

const FAILURE_THRESHOLD: u32 = 5;
const RESET_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Closed,
    Open,
    HalfOpen,
}

struct CircuitState {
    state: State,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
}

impl Default for CircuitState {
    fn default() -> Self {
        Self {
            state: State::Closed,
            consecutive_failures: 0,
            last_failure: None,
        }
    }
}

#[derive(Default)]
pub struct CircuitBreaker {
    routes: RwLock<HashMap<String, Mutex<CircuitState>>>,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entry<R>(&self, route: &str, f: impl FnOnce(&mut CircuitState) -> R) -> R {
        if let Ok(map) = self.routes.read()
            && let Some(lock) = map.get(route)
        {
            return f(&mut lock.lock().unwrap());
        }
        let mut map = self.routes.write().unwrap();
        let lock = map.entry(route.to_string()).or_default();
        f(&mut lock.lock().unwrap())
    }

    /// Evaluate (lazily advancing OPEN → HALF_OPEN on elapsed reset window)
    /// whether a send may proceed for this route.
    pub fn allow(&self, route: &str) -> bool {
        self.with_entry(route, |s| {
            if s.state == State::Open
                && let Some(last) = s.last_failure
                && last.elapsed() >= RESET_WINDOW
            {
                s.state = State::HalfOpen;
            }
            s.state != State::Open
        })
    }

    pub fn record_success(&self, route: &str) {
        self.with_entry(route, |s| {
            s.state = State::Closed;
            s.consecutive_failures = 0;
            s.last_failure = None;
        });
    }

    pub fn record_failure(&self, route: &str) {
        self.with_entry(route, |s| {
            s.last_failure = Some(Instant::now());
            match s.state {
                State::HalfOpen => {
                    s.state = State::Open;
                }
                _ => {
                    s.consecutive_failures += 1;
                    if s.consecutive_failures >= FAILURE_THRESHOLD {
                        s.state = State::Open;
                    }
                }
            }
        });
    }

    pub fn state(&self, route: &str) -> State {
        self.with_entry(route, |s| s.state)
    }
}
