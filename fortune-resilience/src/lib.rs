//! Circuit breaker primitives used to guard external dependencies.

pub mod behavior;
pub mod breaker;
pub mod metrics;
pub mod state;

pub use behavior::CircuitBreakerBehavior;
pub use breaker::{CircuitBreaker, CircuitBreakerConfig};
pub use metrics::{CircuitBreakerMetrics, MetricsCollector, TracingMetricsCollector};
pub use state::CircuitState;
