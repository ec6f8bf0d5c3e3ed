//! Circuit breaker for remote store calls.
//!
//! A breaker wraps one named operation. Consecutive failures open it; while open,
//! calls short-circuit without touching the operation. After the reset timeout the
//! next call is let through as a single half-open trial that either closes the
//! breaker again or re-opens it.
//!
//! Breakers are shared per operation name through a [`BreakerRegistry`] that is
//! passed explicitly to whatever needs protection.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Breaker behaviour for one operation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakerConfig {
    /// Consecutive failures that open the breaker
    pub failure_threshold: u32,
    /// Time spent open before a half-open trial is allowed
    pub reset_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

impl BreakerConfig {
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        };
        f.write_str(s)
    }
}

/// Notification emitted on every state change
#[derive(Debug, Clone, PartialEq)]
pub struct StateTransition {
    pub name: String,
    pub from: CircuitState,
    pub to: CircuitState,
    pub failure_count: u32,
}

pub type StateChangeHook = Arc<dyn Fn(&StateTransition) + Send + Sync>;

#[derive(Debug, Error)]
pub enum BreakerError<E> {
    #[error("circuit breaker '{name}' is open")]
    Open { name: String },

    #[error(transparent)]
    Inner(E),
}

/// Point-in-time view of a breaker, for health and admin output
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    #[serde(rename = "failureCount")]
    pub failure_count: u32,
    #[serde(rename = "lastFailureAt")]
    pub last_failure_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    opened_at: Option<Instant>,
    last_failure_at: Option<chrono::DateTime<chrono::Utc>>,
    trial_in_flight: bool,
}

enum Admission {
    Allowed { trial: bool },
    Rejected,
}

pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
    on_state_change: Option<StateChangeHook>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                opened_at: None,
                last_failure_at: None,
                trial_in_flight: false,
            }),
            on_state_change: None,
        }
    }

    /// Attach a hook called after every state transition
    pub fn with_state_change_hook(mut self, hook: StateChangeHook) -> Self {
        self.on_state_change = Some(hook);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> BreakerConfig {
        self.config
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            last_failure_at: inner.last_failure_at,
        }
    }

    /// Run `operation` under the breaker
    ///
    /// Returns [`BreakerError::Open`] without invoking the operation while the
    /// breaker is open or while another half-open trial is in flight.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let trial = match self.admit() {
            Admission::Allowed { trial } => trial,
            Admission::Rejected => {
                tracing::warn!(breaker = %self.name, "Circuit open, short-circuiting call");
                return Err(BreakerError::Open {
                    name: self.name.clone(),
                });
            }
        };

        let mut guard = TrialGuard {
            breaker: self,
            armed: trial,
        };
        let outcome = operation().await;
        guard.armed = false;

        match outcome {
            Ok(value) => {
                self.record_success(trial);
                Ok(value)
            }
            Err(e) => {
                self.record_failure(trial);
                Err(BreakerError::Inner(e))
            }
        }
    }

    /// Run `operation`, substituting `fallback` when the breaker is open or the
    /// operation fails
    pub async fn execute_with_fallback<T, E, F, Fut, FB, FbFut>(&self, operation: F, fallback: FB) -> T
    where
        E: fmt::Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        FB: FnOnce() -> FbFut,
        FbFut: Future<Output = T>,
    {
        match self.execute(operation).await {
            Ok(value) => value,
            Err(BreakerError::Open { .. }) => fallback().await,
            Err(BreakerError::Inner(e)) => {
                tracing::debug!(breaker = %self.name, error = %e, "Operation failed, using fallback");
                fallback().await
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn admit(&self) -> Admission {
        let mut transition = None;
        let admission = {
            let mut inner = self.lock();
            match inner.state {
                CircuitState::Closed => Admission::Allowed { trial: false },
                CircuitState::Open => {
                    let elapsed = inner
                        .opened_at
                        .map(|at| at.elapsed() >= self.config.reset_timeout)
                        .unwrap_or(true);
                    if elapsed {
                        inner.state = CircuitState::HalfOpen;
                        inner.trial_in_flight = true;
                        transition = Some(self.transition(CircuitState::Open, &inner));
                        Admission::Allowed { trial: true }
                    } else {
                        Admission::Rejected
                    }
                }
                CircuitState::HalfOpen => {
                    if inner.trial_in_flight {
                        Admission::Rejected
                    } else {
                        inner.trial_in_flight = true;
                        Admission::Allowed { trial: true }
                    }
                }
            }
        };

        if let Some(t) = transition {
            self.notify(&t);
        }
        admission
    }

    fn record_success(&self, trial: bool) {
        let mut transition = None;
        {
            let mut inner = self.lock();
            match inner.state {
                CircuitState::Closed => inner.failure_count = 0,
                CircuitState::HalfOpen if trial => {
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.opened_at = None;
                    inner.trial_in_flight = false;
                    transition = Some(self.transition(CircuitState::HalfOpen, &inner));
                }
                // Late completions from calls admitted before a transition do not vote
                _ => {}
            }
        }
        if let Some(t) = transition {
            self.notify(&t);
        }
    }

    fn record_failure(&self, trial: bool) {
        let mut transition = None;
        {
            let mut inner = self.lock();
            inner.last_failure_at = Some(chrono::Utc::now());
            match inner.state {
                CircuitState::Closed => {
                    inner.failure_count = inner.failure_count.saturating_add(1);
                    if inner.failure_count >= self.config.failure_threshold {
                        inner.state = CircuitState::Open;
                        inner.opened_at = Some(Instant::now());
                        transition = Some(self.transition(CircuitState::Closed, &inner));
                    }
                }
                CircuitState::HalfOpen if trial => {
                    inner.failure_count = inner.failure_count.saturating_add(1);
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    inner.trial_in_flight = false;
                    transition = Some(self.transition(CircuitState::HalfOpen, &inner));
                }
                _ => {}
            }
        }
        if let Some(t) = transition {
            self.notify(&t);
        }
    }

    fn release_trial(&self) {
        self.lock().trial_in_flight = false;
    }

    fn transition(&self, from: CircuitState, inner: &BreakerInner) -> StateTransition {
        StateTransition {
            name: self.name.clone(),
            from,
            to: inner.state,
            failure_count: inner.failure_count,
        }
    }

    fn notify(&self, t: &StateTransition) {
        if t.to == CircuitState::Open {
            tracing::warn!(
                breaker = %t.name,
                from = %t.from,
                failures = t.failure_count,
                "Circuit breaker opened"
            );
        } else {
            tracing::info!(breaker = %t.name, from = %t.from, to = %t.to, "Circuit breaker state change");
        }

        if let Some(hook) = &self.on_state_change {
            hook(t);
        }
    }
}

/// Frees the half-open trial slot if the trial future is dropped before finishing
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.release_trial();
        }
    }
}

/// Keyed registry of breakers, one per protected operation name
pub struct BreakerRegistry {
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
    default_config: BreakerConfig,
    overrides: HashMap<String, BreakerConfig>,
    on_state_change: Option<StateChangeHook>,
}

impl BreakerRegistry {
    pub fn new(default_config: BreakerConfig) -> Self {
        Self {
            breakers: Mutex::new(HashMap::new()),
            default_config,
            overrides: HashMap::new(),
            on_state_change: None,
        }
    }

    /// Use a specific config for breakers created under `name`
    pub fn with_override(mut self, name: impl Into<String>, config: BreakerConfig) -> Self {
        self.overrides.insert(name.into(), config);
        self
    }

    /// Hook shared by every breaker this registry creates
    pub fn with_state_change_hook(mut self, hook: StateChangeHook) -> Self {
        self.on_state_change = Some(hook);
        self
    }

    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().unwrap_or_else(PoisonError::into_inner);
        breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                let config = self.overrides.get(name).copied().unwrap_or(self.default_config);
                let mut breaker = CircuitBreaker::new(name, config);
                if let Some(hook) = &self.on_state_change {
                    breaker = breaker.with_state_change_hook(Arc::clone(hook));
                }
                Arc::new(breaker)
            })
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Snapshots of every breaker, sorted by name
    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        let breakers: Vec<Arc<CircuitBreaker>> = self
            .breakers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        let mut snapshots: Vec<BreakerSnapshot> = breakers.iter().map(|b| b.snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}
