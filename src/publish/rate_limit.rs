//! Minimum-interval gating for the publish action
//!
//! Two things can hold publishing back: the configured interval since the last
//! successful publish, and a countdown started from a server-imposed wait. Only
//! one countdown is active per limiter; starting another replaces it.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Known phrasings of a wait hint, tried in order
static WAIT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\bafter\s+(\d+)\s+seconds?\b",
        r"(?i)\bwait\s+(\d+)\s+seconds?\b",
        r"(?i)\bin\s+(\d+)\s+seconds?\b",
        r"(?i)\b(\d+)\s+seconds?\s+remaining\b",
        r"(?i)\bretry\s+in\s+(\d+)\s+seconds?\b",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("wait pattern compiles"))
    .collect()
});

/// Extract a wait in seconds from free-form error text
///
/// Best effort only: a structured wait value from the service always wins.
pub fn parse_wait_from_message(message: &str) -> Option<u64> {
    WAIT_PATTERNS.iter().find_map(|re| {
        re.captures(message)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    })
}

pub type CountdownCallback = Box<dyn FnOnce() + Send + 'static>;

struct Countdown {
    remaining: u64,
    generation: u64,
    on_complete: Option<CountdownCallback>,
    ticker: Option<JoinHandle<()>>,
}

struct LimiterState {
    last_action_at: Option<DateTime<Utc>>,
    min_interval_seconds: u64,
    countdown: Option<Countdown>,
    generation: u64,
}

/// Shared rate-limit state; clones observe the same limiter
#[derive(Clone)]
pub struct RateLimiter {
    state: Arc<Mutex<LimiterState>>,
}

impl RateLimiter {
    pub fn new(min_interval_seconds: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(LimiterState {
                last_action_at: None,
                min_interval_seconds,
                countdown: None,
                generation: 0,
            })),
        }
    }

    /// Seed the last action, e.g. from recorded publications
    pub fn with_last_action(self, at: Option<DateTime<Utc>>) -> Self {
        self.lock().last_action_at = at;
        self
    }

    fn lock(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn min_interval_seconds(&self) -> u64 {
        self.lock().min_interval_seconds
    }

    pub fn last_action_at(&self) -> Option<DateTime<Utc>> {
        self.lock().last_action_at
    }

    pub fn record_action(&self, at: DateTime<Utc>) {
        self.lock().last_action_at = Some(at);
    }

    /// Seconds left of the minimum interval: `max(0, min - (now - last))`
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> u64 {
        let state = self.lock();
        Self::interval_remaining(&state, now)
    }

    fn interval_remaining(state: &LimiterState, now: DateTime<Utc>) -> u64 {
        match state.last_action_at {
            None => 0,
            Some(last) => {
                let elapsed = (now - last).num_seconds();
                let remaining = state.min_interval_seconds as i64 - elapsed;
                remaining.max(0) as u64
            }
        }
    }

    /// No prior action, or the interval has fully elapsed, and no countdown pending
    pub fn can_act_now(&self, now: DateTime<Utc>) -> bool {
        let state = self.lock();
        Self::interval_remaining(&state, now) == 0 && state.countdown.is_none()
    }

    /// Longest of the interval remainder and the active countdown
    pub fn wait_seconds(&self, now: DateTime<Utc>) -> u64 {
        let state = self.lock();
        let countdown = state.countdown.as_ref().map_or(0, |c| c.remaining);
        Self::interval_remaining(&state, now).max(countdown)
    }

    pub fn countdown_remaining(&self) -> Option<u64> {
        self.lock().countdown.as_ref().map(|c| c.remaining)
    }

    pub fn parse_wait_from_message(message: &str) -> Option<u64> {
        parse_wait_from_message(message)
    }

    /// Start a per-second countdown, replacing any active one
    ///
    /// `on_complete` fires exactly once when the counter reaches zero. A
    /// replaced countdown's callback never fires. Inside a tokio runtime a
    /// background ticker drives the countdown; otherwise call [`tick`](Self::tick).
    pub fn start_countdown<F>(&self, seconds: u64, on_complete: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.lock();
        if let Some(ticker) = state.countdown.take().and_then(|c| c.ticker) {
            ticker.abort();
        }
        state.generation += 1;
        let generation = state.generation;

        if seconds == 0 {
            drop(state);
            on_complete();
            return;
        }

        let ticker = tokio::runtime::Handle::try_current().ok().map(|handle| {
            let limiter = self.clone();
            handle.spawn(async move {
                let period = Duration::from_secs(1);
                let mut interval =
                    tokio::time::interval_at(tokio::time::Instant::now() + period, period);
                loop {
                    interval.tick().await;
                    match limiter.advance(Some(generation)) {
                        Some(remaining) if remaining > 0 => {}
                        _ => break,
                    }
                }
            })
        });

        tracing::info!(seconds, "Started rate-limit countdown");
        state.countdown = Some(Countdown {
            remaining: seconds,
            generation,
            on_complete: Some(Box::new(on_complete)),
            ticker,
        });
    }

    /// Drop the active countdown without firing its callback
    pub fn cancel_countdown(&self) {
        if let Some(ticker) = self.lock().countdown.take().and_then(|c| c.ticker) {
            ticker.abort();
        }
    }

    /// Advance the active countdown by one second; returns what is left
    pub fn tick(&self) -> Option<u64> {
        self.advance(None)
    }

    fn advance(&self, generation: Option<u64>) -> Option<u64> {
        let callback = {
            let mut state = self.lock();
            let countdown = state.countdown.as_mut()?;
            if generation.is_some_and(|g| g != countdown.generation) {
                return None;
            }

            countdown.remaining = countdown.remaining.saturating_sub(1);
            if countdown.remaining > 0 {
                return Some(countdown.remaining);
            }

            state.countdown.take().and_then(|c| c.on_complete)
        };

        tracing::info!("Rate-limit countdown finished");
        if let Some(callback) = callback {
            callback();
        }
        Some(0)
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("RateLimiter")
            .field("last_action_at", &state.last_action_at)
            .field("min_interval_seconds", &state.min_interval_seconds)
            .field("countdown", &state.countdown.as_ref().map(|c| c.remaining))
            .finish()
    }
}
