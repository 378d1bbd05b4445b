//! The breaker state machine.
//!
//! A [`Breaker`] guards an async operation. It counts failures inside a
//! window that starts at the first failure, opens once the failure rate and
//! absolute thresholds are met, rejects calls until the reset timeout passes,
//! then lets a single trial outcome decide between closing and reopening.
//!
//! There are no timers. Time-based transitions happen lazily at the top of
//! each call, against the injected [`Clock`].

use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::clock::{duration_millis, Clock, SystemClock};
use crate::config::{BreakerConfig, ConfigError};
use crate::error::{BreakerError, CircuitOpenError};
use crate::events::{BreakerEvent, EventKind, EventRegistry, SubscriptionId};
use crate::state::{BreakerState, Phase};

/// Circuit breaker around async operations.
///
/// State sits behind a mutex that is never held across an `.await`, so calls
/// sharing a breaker interleave freely while the operation runs. Listeners are
/// called after the lock is released.
pub struct Breaker {
    name: Option<String>,
    config: BreakerConfig,
    state: Mutex<BreakerState>,
    clock: Arc<dyn Clock>,
    events: EventRegistry,
}

impl Breaker {
    /// Create a breaker, optionally seeded from an exported snapshot.
    ///
    /// The snapshot is taken verbatim. The system clock is used until
    /// [`with_clock`](Self::with_clock) replaces it.
    pub fn new(config: BreakerConfig, initial: Option<BreakerState>) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            name: None,
            config,
            state: Mutex::new(initial.unwrap_or_default()),
            clock: Arc::new(SystemClock),
            events: EventRegistry::new(),
        })
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Name the breaker for logs and rejection errors.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Run `operation` under the breaker.
    ///
    /// Returns [`BreakerError::Open`] without calling `operation` while the
    /// circuit is open. Otherwise the operation runs, its outcome is recorded,
    /// and its result or error is handed back as is. The breaker imposes no
    /// timeout: an operation that never settles keeps this future pending.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.admit()?;

        match operation().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(BreakerError::Operation(err))
            }
        }
    }

    /// Reconcile against the clock and decide whether a call may proceed.
    ///
    /// This is the first half of [`execute`](Self::execute), for callers that
    /// drive the operation themselves and report back with
    /// [`record_success`](Self::record_success) or
    /// [`record_failure`](Self::record_failure). Returns the phase the call
    /// runs under.
    pub fn admit(&self) -> Result<Phase, CircuitOpenError> {
        let now = self.clock.now_millis();
        let mut events = Vec::new();

        let admitted = {
            let mut state = self.state.lock();
            self.reconcile(&mut state, now, &mut events);

            match state.phase {
                Phase::Open => {
                    let next_attempt = state.next_attempt.unwrap_or(now);
                    tracing::debug!(
                        breaker = self.label(),
                        next_attempt,
                        "Call rejected, circuit open"
                    );
                    events.push(BreakerEvent::OpenCircuit { next_attempt });
                    Err(CircuitOpenError {
                        breaker: self.name.clone(),
                        next_attempt,
                    })
                }
                phase => Ok(phase),
            }
        };

        self.publish(&events);
        admitted
    }

    /// Record a successful outcome.
    pub fn record_success(&self) {
        let mut events = Vec::with_capacity(2);

        {
            let mut state = self.state.lock();
            state.success_count = state.success_count.saturating_add(1);
            let success_count = state.success_count;

            if state.phase == Phase::HalfOpen {
                *state = BreakerState::closed();
                tracing::info!(breaker = self.label(), "Circuit closed after successful trial");
                events.push(BreakerEvent::CloseCircuit);
            }

            tracing::debug!(breaker = self.label(), success_count, "Recorded success");
            events.push(BreakerEvent::Success { success_count });
        }

        self.publish(&events);
    }

    /// Record a failed outcome.
    pub fn record_failure(&self) {
        let now = self.clock.now_millis();
        let mut events = Vec::with_capacity(2);

        {
            let mut state = self.state.lock();
            state.failure_count = state.failure_count.saturating_add(1);
            state.last_failure_time = Some(now);
            let failure_count = state.failure_count;

            match state.phase {
                Phase::Closed => {
                    let window_start = *state.first_failure_time.get_or_insert(now);
                    if self.threshold_breached(&state, window_start, now) {
                        self.trip(&mut state, now, &mut events);
                    }
                }
                Phase::HalfOpen => {
                    tracing::warn!(breaker = self.label(), "Trial call failed");
                    self.trip(&mut state, now, &mut events);
                }
                // A call admitted before another one opened the circuit.
                Phase::Open => {}
            }

            tracing::debug!(breaker = self.label(), failure_count, "Recorded failure");
            events.push(BreakerEvent::Failure { failure_count });
        }

        self.publish(&events);
    }

    /// Current phase, without reconciling against the clock.
    ///
    /// Right after the reset timeout elapses this still reports
    /// [`Phase::Open`]; the move to half-open happens on the next call.
    pub fn state(&self) -> Phase {
        self.state.lock().phase
    }

    /// Copy of the full state for external persistence.
    pub fn export_state(&self) -> BreakerState {
        *self.state.lock()
    }

    /// Force the breaker back to a fresh CLOSED state.
    pub fn reset(&self) {
        let was = {
            let mut state = self.state.lock();
            std::mem::replace(&mut *state, BreakerState::closed()).phase
        };

        tracing::info!(breaker = self.label(), from = %was, "Circuit reset");
        if was != Phase::Closed {
            self.publish(&[BreakerEvent::CloseCircuit]);
        }
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Listen on one event channel.
    pub fn subscribe<F>(&self, kind: EventKind, listener: F) -> SubscriptionId
    where
        F: Fn(&BreakerEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(kind, listener)
    }

    /// Listen on every event channel.
    pub fn subscribe_all<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&BreakerEvent) + Send + Sync + 'static,
    {
        self.events.subscribe_all(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Apply time-based transitions.
    fn reconcile(&self, state: &mut BreakerState, now: u64, events: &mut Vec<BreakerEvent>) {
        match state.phase {
            Phase::Open if now >= state.next_attempt.unwrap_or(0) => {
                state.phase = Phase::HalfOpen;
                state.failure_count = 0;
                state.success_count = 0;
                tracing::info!(breaker = self.label(), "Circuit half-open, allowing trial call");
                events.push(BreakerEvent::HalfOpen);
            }
            Phase::Closed => {
                if let Some(window_start) = state.first_failure_time {
                    if now.saturating_sub(window_start) > duration_millis(self.config.time_window) {
                        tracing::debug!(
                            breaker = self.label(),
                            failure_count = state.failure_count,
                            "Window expired without opening, counters reset"
                        );
                        *state = BreakerState::closed();
                    }
                }
            }
            _ => {}
        }

        if let Some(ceiling) = self.config.max_failure_count {
            if state.failure_count >= ceiling {
                let was = state.phase;
                *state = BreakerState::closed();
                tracing::warn!(
                    breaker = self.label(),
                    ceiling,
                    from = %was,
                    "Failure ceiling reached, state reset"
                );
                if was != Phase::Closed {
                    events.push(BreakerEvent::CloseCircuit);
                }
            }
        }
    }

    /// All of the open conditions, evaluated after a failure while CLOSED.
    fn threshold_breached(&self, state: &BreakerState, window_start: u64, now: u64) -> bool {
        let failures = state.failure_count;
        let attempts = state.attempts();
        let failure_rate = f64::from(failures) / f64::from(attempts.max(1));
        let elapsed = now.saturating_sub(window_start);

        failures >= self.config.min_failures
            && failure_rate >= self.config.failure_threshold
            && attempts >= self.config.min_attempts
            && elapsed >= duration_millis(self.config.min_evaluation_time)
            && now < window_start.saturating_add(duration_millis(self.config.time_window))
    }

    fn trip(&self, state: &mut BreakerState, now: u64, events: &mut Vec<BreakerEvent>) {
        let next_attempt = now.saturating_add(duration_millis(self.config.reset_timeout));
        state.phase = Phase::Open;
        state.next_attempt = Some(next_attempt);

        tracing::warn!(
            breaker = self.label(),
            failures = state.failure_count,
            attempts = state.attempts(),
            next_attempt,
            "Circuit opened"
        );
        events.push(BreakerEvent::OpenCircuit { next_attempt });
    }

    fn publish(&self, events: &[BreakerEvent]) {
        for event in events {
            self.events.emit(event);
        }
    }

    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("unnamed")
    }
}

impl fmt::Debug for Breaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Breaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &*self.state.lock())
            .field("events", &self.events)
            .finish()
    }
}
