//! Generic circuit breaker used to guard the vector store, LLM and task
//! store adapters against a misbehaving dependency (spec §5 C3 Circuit
//! Breaker).

use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime};

use crate::behavior::CircuitBreakerBehavior;
use crate::metrics::CircuitBreakerMetrics;
use crate::state::CircuitState;

/// Tunables for a single circuit breaker instance.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in `Closed` before the circuit opens.
    pub failure_threshold: u32,
    /// How long the circuit stays `Open` before allowing a probe call.
    pub recovery_timeout: Duration,
    /// Consecutive successes in `HalfOpen` required to close the circuit.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    half_open_calls: u64,
    opened_at: Option<Instant>,
    total_calls: u64,
    success_count: u64,
    failure_count: u64,
    total_duration: Duration,
    last_failure: Option<SystemTime>,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            half_open_successes: 0,
            half_open_calls: 0,
            opened_at: None,
            total_calls: 0,
            success_count: 0,
            failure_count: 0,
            total_duration: Duration::ZERO,
            last_failure: None,
        }
    }
}

/// A named circuit breaker guarding one dependency.
///
/// Cloning is cheap in the sense that callers are expected to hold this
/// behind an `Arc`; the breaker itself owns its state in a [`Mutex`].
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner::new()),
        }
    }

    /// Pre-flight gate. Transitions `Open -> HalfOpen` as a side effect once
    /// the recovery timeout has elapsed.
    pub fn should_allow(&self) -> bool {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.config.recovery_timeout {
                    self.transition(&mut inner, CircuitState::HalfOpen);
                    inner.half_open_calls = 0;
                    inner.half_open_successes = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success_manual(&self, duration: Duration) {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        inner.total_calls += 1;
        inner.success_count += 1;
        inner.total_duration += duration;
        inner.consecutive_failures = 0;
        match inner.state {
            CircuitState::Closed => {}
            CircuitState::HalfOpen => {
                inner.half_open_calls += 1;
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.success_threshold {
                    self.transition(&mut inner, CircuitState::Closed);
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure_manual(&self, duration: Duration) {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        inner.total_calls += 1;
        inner.failure_count += 1;
        inner.total_duration += duration;
        inner.last_failure = Some(SystemTime::now());
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                inner.half_open_calls += 1;
                self.transition(&mut inner, CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    pub fn current_state(&self) -> CircuitState {
        self.inner.lock().expect("circuit breaker mutex poisoned").state
    }

    pub fn force_open_internal(&self) {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        self.transition(&mut inner, CircuitState::Open);
    }

    pub fn force_closed_internal(&self) {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        inner.consecutive_failures = 0;
        self.transition(&mut inner, CircuitState::Closed);
    }

    pub fn metrics_snapshot(&self) -> CircuitBreakerMetrics {
        let inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        let failure_rate = if inner.total_calls == 0 {
            0.0
        } else {
            inner.failure_count as f64 / inner.total_calls as f64
        };
        let success_rate = if inner.total_calls == 0 {
            0.0
        } else {
            inner.success_count as f64 / inner.total_calls as f64
        };
        let average_duration = if inner.total_calls == 0 {
            Duration::ZERO
        } else {
            inner.total_duration / inner.total_calls as u32
        };
        CircuitBreakerMetrics {
            total_calls: inner.total_calls,
            success_count: inner.success_count,
            failure_count: inner.failure_count,
            consecutive_failures: inner.consecutive_failures,
            half_open_calls: inner.half_open_calls,
            total_duration: inner.total_duration,
            current_state: inner.state,
            failure_rate,
            success_rate,
            average_duration,
            threshold: self.config.failure_threshold,
            recovery_timeout: self.config.recovery_timeout,
            last_failure: inner.last_failure,
        }
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState) {
        if inner.state == to {
            return;
        }
        tracing::info!(circuit_breaker = %self.name, from = %inner.state, to = %to, "circuit breaker transition");
        if to == CircuitState::Open {
            inner.opened_at = Some(Instant::now());
        }
        inner.state = to;
    }
}

impl CircuitBreakerBehavior for CircuitBreaker {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> CircuitState {
        self.current_state()
    }

    fn should_allow(&self) -> bool {
        CircuitBreaker::should_allow(self)
    }

    fn record_success(&self, duration: Duration) {
        self.record_success_manual(duration)
    }

    fn record_failure(&self, duration: Duration) {
        self.record_failure_manual(duration)
    }

    fn is_healthy(&self) -> bool {
        self.metrics_snapshot().is_healthy()
    }

    fn force_open(&self) {
        self.force_open_internal()
    }

    fn force_closed(&self) {
        self.force_closed_internal()
    }

    fn metrics(&self) -> CircuitBreakerMetrics {
        self.metrics_snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            recovery_timeout: Duration::from_millis(20),
            success_threshold: 2,
        }
    }

    #[test]
    fn starts_closed_and_allows_calls() {
        let cb = CircuitBreaker::new("vector", fast_config());
        assert_eq!(cb.current_state(), CircuitState::Closed);
        assert!(cb.should_allow());
    }

    #[test]
    fn opens_after_reaching_failure_threshold() {
        let cb = CircuitBreaker::new("vector", fast_config());
        for _ in 0..3 {
            cb.record_failure_manual(Duration::from_millis(1));
        }
        assert_eq!(cb.current_state(), CircuitState::Open);
        assert!(!cb.should_allow());
    }

    #[test]
    fn success_resets_consecutive_failure_count() {
        let cb = CircuitBreaker::new("vector", fast_config());
        cb.record_failure_manual(Duration::from_millis(1));
        cb.record_failure_manual(Duration::from_millis(1));
        cb.record_success_manual(Duration::from_millis(1));
        cb.record_failure_manual(Duration::from_millis(1));
        cb.record_failure_manual(Duration::from_millis(1));
        assert_eq!(cb.current_state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_closes_after_success_threshold() {
        let cb = CircuitBreaker::new("vector", fast_config());
        for _ in 0..3 {
            cb.record_failure_manual(Duration::from_millis(1));
        }
        std::thread::sleep(Duration::from_millis(25));
        assert!(cb.should_allow());
        assert_eq!(cb.current_state(), CircuitState::HalfOpen);
        cb.record_success_manual(Duration::from_millis(1));
        cb.record_success_manual(Duration::from_millis(1));
        assert_eq!(cb.current_state(), CircuitState::Closed);
    }

    #[test]
    fn failure_in_half_open_reopens_immediately() {
        let cb = CircuitBreaker::new("vector", fast_config());
        for _ in 0..3 {
            cb.record_failure_manual(Duration::from_millis(1));
        }
        std::thread::sleep(Duration::from_millis(25));
        assert!(cb.should_allow());
        cb.record_failure_manual(Duration::from_millis(1));
        assert_eq!(cb.current_state(), CircuitState::Open);
    }

    #[test]
    fn force_open_and_force_closed_override_state() {
        let cb = CircuitBreaker::new("vector", fast_config());
        cb.force_open_internal();
        assert_eq!(cb.current_state(), CircuitState::Open);
        cb.force_closed_internal();
        assert_eq!(cb.current_state(), CircuitState::Closed);
    }

    #[test]
    fn conforms_to_behavior_trait() {
        let cb = CircuitBreaker::new("vector", fast_config());
        let behavior: &dyn CircuitBreakerBehavior = &cb;
        assert_eq!(behavior.name(), "vector");
        assert!(behavior.should_allow());
        assert!(behavior.is_healthy());
    }

    #[test]
    fn open_circuit_does_not_allow_before_timeout() {
        let cb = CircuitBreaker::new("vector", fast_config());
        for _ in 0..3 {
            cb.record_failure_manual(Duration::from_millis(1));
        }
        assert!(!cb.should_allow());
    }
}
