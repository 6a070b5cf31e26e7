//! Circuit breaker metrics, observability-facing.

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::state::CircuitState;

/// Point-in-time metrics snapshot for a single circuit breaker instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    pub total_calls: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub consecutive_failures: u32,
    pub half_open_calls: u64,
    pub total_duration: Duration,
    pub current_state: CircuitState,
    pub failure_rate: f64,
    pub success_rate: f64,
    pub average_duration: Duration,
    /// Consecutive failures in `Closed` that would trip the circuit open.
    pub threshold: u32,
    /// How long an `Open` circuit waits before allowing a probe call.
    pub recovery_timeout: Duration,
    /// Wall-clock time of the most recent recorded failure, if any.
    pub last_failure: Option<SystemTime>,
}

impl CircuitBreakerMetrics {
    pub fn new() -> Self {
        Self {
            total_calls: 0,
            success_count: 0,
            failure_count: 0,
            consecutive_failures: 0,
            half_open_calls: 0,
            total_duration: Duration::ZERO,
            current_state: CircuitState::Closed,
            failure_rate: 0.0,
            success_rate: 0.0,
            average_duration: Duration::ZERO,
            threshold: 0,
            recovery_timeout: Duration::ZERO,
            last_failure: None,
        }
    }

    pub fn calls_per_second(&self) -> f64 {
        if self.total_duration.is_zero() {
            return 0.0;
        }
        self.total_calls as f64 / self.total_duration.as_secs_f64()
    }

    /// Closed is healthy below a 10% failure rate; Open is never healthy;
    /// HalfOpen is always considered healthy (it is actively recovering).
    pub fn is_healthy(&self) -> bool {
        match self.current_state {
            CircuitState::Closed => self.failure_rate < 0.1,
            CircuitState::Open => false,
            CircuitState::HalfOpen => true,
        }
    }

    pub fn state_description(&self) -> &'static str {
        match self.current_state {
            CircuitState::Closed => "healthy - normal operation",
            CircuitState::Open => "failing - rejecting all calls",
            CircuitState::HalfOpen => "recovering - testing dependency health",
        }
    }

    pub fn format_summary(&self) -> String {
        format!(
            "state: {} | calls: {} | success: {:.1}% | failures: {} | avg: {:.2}ms",
            self.state_description(),
            self.total_calls,
            self.success_rate * 100.0,
            self.failure_count,
            self.average_duration.as_millis()
        )
    }
}

impl Default for CircuitBreakerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Sink for circuit breaker observability events. The default implementation
/// logs via `tracing`; a real metrics backend can be plugged in behind this
/// trait without touching breaker internals.
pub trait MetricsCollector: Send + Sync + std::fmt::Debug {
    fn record_metrics(&self, name: &str, metrics: &CircuitBreakerMetrics);
    fn record_state_transition(&self, name: &str, from: CircuitState, to: CircuitState);
}

#[derive(Debug, Default)]
pub struct TracingMetricsCollector;

impl MetricsCollector for TracingMetricsCollector {
    fn record_metrics(&self, name: &str, metrics: &CircuitBreakerMetrics) {
        tracing::debug!(
            circuit_breaker = name,
            total_calls = metrics.total_calls,
            failure_rate = metrics.failure_rate,
            state = %metrics.current_state,
            "circuit breaker metrics"
        );
    }

    fn record_state_transition(&self, name: &str, from: CircuitState, to: CircuitState) {
        tracing::info!(
            circuit_breaker = name,
            from = %from,
            to = %to,
            "circuit breaker state transition"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_metrics_are_closed_and_healthy() {
        let metrics = CircuitBreakerMetrics::new();
        assert_eq!(metrics.current_state, CircuitState::Closed);
        assert!(metrics.is_healthy());
    }

    #[test]
    fn closed_unhealthy_above_ten_percent_failure_rate() {
        let mut metrics = CircuitBreakerMetrics::new();
        metrics.failure_rate = 0.15;
        assert!(!metrics.is_healthy());
    }

    #[test]
    fn open_is_never_healthy() {
        let mut metrics = CircuitBreakerMetrics::new();
        metrics.current_state = CircuitState::Open;
        metrics.failure_rate = 0.0;
        assert!(!metrics.is_healthy());
    }

    #[test]
    fn half_open_is_healthy() {
        let mut metrics = CircuitBreakerMetrics::new();
        metrics.current_state = CircuitState::HalfOpen;
        assert!(metrics.is_healthy());
    }

    #[test]
    fn calls_per_second_is_zero_with_no_duration() {
        let metrics = CircuitBreakerMetrics::new();
        assert_eq!(metrics.calls_per_second(), 0.0);
    }
}
