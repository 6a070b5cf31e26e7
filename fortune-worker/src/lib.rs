//! Worker pool (spec §4.6 C6) and pipeline orchestrator (spec §4.8 C8):
//! claims queued tasks from the store and runs them through the
//! RAG -> prompt -> LLM -> validate sequence, publishing progress as it goes.

mod pipeline;
mod pool;

pub use pipeline::{PipelineOrchestrator, RollingAverage};
pub use pool::{WorkerPool, WorkerPoolConfig, WorkerPoolMetrics};
