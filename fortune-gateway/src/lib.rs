//! Stream gateway (spec §4.9 C9): translates a task's progress-bus stream
//! into a per-connection SSE feed for the owning client.

mod auth;
mod routes;
mod wire;

pub use auth::{AuthenticatedOwner, OWNER_HEADER};
pub use routes::{router, GatewayConfig, GatewayState};
