//! Serialized outbound calls with randomized pacing
//!
//! Every call made through one [`RequestScheduler`] runs alone. Before each
//! call except the first, the scheduler waits a delay drawn from its
//! [`Delay`] so consecutive requests never hit the provider back to back.
//! Exponential delays grow with the gaps of the current batch and start over
//! at each [`RequestScheduler::run_serialized`].

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::PacingSettings;
use crate::error::Result;

/// Delay strategy between consecutive calls
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Delay {
    /// No wait
    None,
    /// Constant wait
    Fixed(Duration),
    /// Uniformly random wait in `[min, max]`
    Uniform { min: Duration, max: Duration },
    /// `base * factor^n`, capped at `max`; `n` is clamped to [`MAX_EXPONENT`]
    Exponential {
        base: Duration,
        factor: f64,
        max: Duration,
    },
}

/// Largest exponent an [`Delay::Exponential`] is raised to
pub const MAX_EXPONENT: u32 = 16;

impl Default for Delay {
    fn default() -> Self {
        Self::Uniform {
            min: Duration::from_millis(1000),
            max: Duration::from_millis(2500),
        }
    }
}

impl Delay {
    /// Delay for the `n`-th gap (0-based)
    pub fn sample(self, n: u32) -> Duration {
        match self {
            Self::None => Duration::ZERO,
            Self::Fixed(delay) => delay,
            Self::Uniform { min, max } => {
                if max <= min {
                    return min;
                }
                let ms = rand::thread_rng().gen_range(min.as_millis()..=max.as_millis());
                Duration::from_millis(ms as u64)
            }
            Self::Exponential { base, factor, max } => {
                let exponent = n.min(MAX_EXPONENT) as i32;
                let seconds = base.as_secs_f64() * factor.powi(exponent);
                Duration::from_secs_f64(seconds.min(max.as_secs_f64()).max(0.0))
            }
        }
    }
}

#[derive(Debug, Default)]
struct SchedulerState {
    calls: u32,
    /// Gaps waited since the current batch started
    streak: u32,
}

/// Runs async calls one at a time with a delay between them
#[derive(Debug)]
pub struct RequestScheduler {
    delay: Delay,
    state: Mutex<SchedulerState>,
}

impl Default for RequestScheduler {
    fn default() -> Self {
        Self::new(Delay::default())
    }
}

impl RequestScheduler {
    /// Create a scheduler
    pub fn new(delay: Delay) -> Self {
        Self {
            delay,
            state: Mutex::new(SchedulerState::default()),
        }
    }

    /// Uniform jitter from pacing settings
    pub fn from_pacing(pacing: &PacingSettings) -> Self {
        Self::new(Delay::Uniform {
            min: pacing.jitter_min,
            max: pacing.jitter_max,
        })
    }

    /// Scheduler that never waits
    pub fn immediate() -> Self {
        Self::new(Delay::None)
    }

    /// Number of calls started so far
    pub async fn calls(&self) -> u32 {
        self.state.lock().await.calls
    }

    /// Run one call, waiting first unless it is this scheduler's first call
    ///
    /// The lock is held for the whole call, so concurrent callers queue up.
    pub async fn run<F, Fut, T>(&self, label: &str, call: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut state = self.state.lock().await;
        if state.calls > 0 {
            let wait = self.delay.sample(state.streak);
            state.streak = state.streak.saturating_add(1);
            if !wait.is_zero() {
                debug!(label, wait_ms = wait.as_millis() as u64, "pacing request");
                tokio::time::sleep(wait).await;
            }
        }
        state.calls = state.calls.saturating_add(1);
        call().await
    }

    /// Run thunks in order, one at a time, collecting every outcome
    ///
    /// A failing thunk does not stop the rest; its error lands at its index.
    pub async fn run_serialized<I, F, Fut, T>(&self, label: &str, thunks: I) -> Vec<Result<T>>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.state.lock().await.streak = 0;
        let mut results = Vec::new();
        for (index, thunk) in thunks.into_iter().enumerate() {
            let outcome = self.run(label, thunk).await;
            if let Err(e) = &outcome {
                warn!(label, index, error = %e, "serialized call failed");
            }
            results.push(outcome);
        }
        results
    }
}
