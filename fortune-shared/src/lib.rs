//! Shared types, error taxonomy and configuration for the fortune-interpretation core.

pub mod cache;
pub mod config;
pub mod deity;
pub mod errors;
pub mod event;
pub mod i18n;
pub mod poem;
pub mod status;
pub mod task;

pub use cache::{CacheEntry, CacheKey};
pub use config::FortuneConfig;
pub use deity::DeityMap;
pub use errors::{ErrorCategory, FortuneError, FortuneResult};
pub use event::{EventKind, ProgressEvent};
pub use i18n::message_for;
pub use poem::{PoemChunk, ScoredChunk};
pub use status::{HeartbeatPhase, StatusCode};
pub use task::{Language, Task, TaskState, TaskSummary};
