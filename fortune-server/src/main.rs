//! Entry point: wires the task store, vector/LLM adapters, cache, progress
//! bus, worker pool and stream gateway into one running service, then waits
//! for a shutdown signal.

mod routes;

use std::sync::Arc;
use std::time::Duration;

use fortune_bus::ProgressBus;
use fortune_cache::ResultCache;
use fortune_llm::{GenerationParams, OpenAiLlmAdapter};
use fortune_resilience::{CircuitBreaker, CircuitBreakerConfig};
use fortune_shared::{DeityMap, FortuneConfig};
use fortune_store::TaskStore;
use fortune_vector::ChromaVectorStore;
use fortune_worker::{PipelineOrchestrator, RollingAverage, WorkerPool, WorkerPoolConfig};
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use routes::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting fortune-interpretation server...");
    info!(version = env!("CARGO_PKG_VERSION"));

    let config_path = std::env::var("FORTUNE_CONFIG_PATH").ok();
    let config = FortuneConfig::load(config_path.as_deref())?;

    let store = Arc::new(TaskStore::connect(&config.database.url, config.database.max_connections).await?);
    store.migrate().await?;

    let bus = Arc::new(ProgressBus::new());
    let cache = Arc::new(ResultCache::new(config.cache.max_entries, Duration::from_secs(config.cache.ttl_s)));
    let deities = Arc::new(DeityMap::new(config.deity.mapping.clone()));

    let vector_breaker = Arc::new(CircuitBreaker::new(
        "vector-store",
        CircuitBreakerConfig {
            failure_threshold: config.breaker.vector.failure_threshold,
            recovery_timeout: Duration::from_secs(config.breaker.vector.recovery_timeout_s),
            success_threshold: config.breaker.vector.success_threshold,
        },
    ));
    let vector: Arc<dyn fortune_vector::VectorStore> = Arc::new(ChromaVectorStore::new(
        config.rag.base_url.clone(),
        config.rag.collection.clone(),
        vector_breaker,
    ));

    let llm_breaker = Arc::new(CircuitBreaker::new(
        "llm",
        CircuitBreakerConfig {
            failure_threshold: config.breaker.llm.failure_threshold,
            recovery_timeout: Duration::from_secs(config.breaker.llm.recovery_timeout_s),
            success_threshold: config.breaker.llm.success_threshold,
        },
    ));
    let llm: Arc<dyn fortune_llm::LlmAdapter> = match &config.llm.base_url {
        Some(base_url) => Arc::new(OpenAiLlmAdapter::with_base_url(config.llm.model.clone(), base_url.clone(), llm_breaker)),
        None => Arc::new(OpenAiLlmAdapter::new(config.llm.model.clone(), llm_breaker)),
    };

    let orchestrator = Arc::new(PipelineOrchestrator {
        store: store.clone(),
        cache,
        vector,
        llm,
        bus: bus.clone(),
        deities: deities.clone(),
        rag_top_k: config.rag.top_k,
        llm_params: GenerationParams {
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
            timeout: Duration::from_secs(config.llm.timeout_s),
        },
        llm_duration_estimate: Arc::new(RollingAverage::new(Duration::from_secs(20))),
    });

    let mut worker_pool = WorkerPool::new(
        store.clone(),
        orchestrator,
        WorkerPoolConfig {
            worker_count: config.workers.max_workers,
            total_timeout: Duration::from_secs(config.workers.total_timeout_s),
            stuck_after: Duration::from_secs(config.workers.stuck_after_s),
            backstop_poll: Duration::from_secs(config.queue.backstop_poll_s),
            monitor_interval: Duration::from_secs(config.queue.backstop_poll_s),
        },
    );
    worker_pool.start();
    let worker_pool = Arc::new(worker_pool);

    let sweep_bus = bus.clone();
    let sweep_period = Duration::from_secs(config.stream.max_connection_s);
    let sweep_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_period);
        loop {
            interval.tick().await;
            let swept = sweep_bus.sweep_idle();
            if swept > 0 {
                tracing::debug!(swept, "dropped idle progress-bus channels");
            }
        }
    });

    let gateway_state = fortune_gateway::GatewayState {
        store: store.clone(),
        bus: bus.clone(),
        config: fortune_gateway::GatewayConfig {
            ping_interval: Duration::from_secs(config.stream.ping_s),
            max_connection: Duration::from_secs(config.stream.max_connection_s),
        },
    };
    let app_state = AppState {
        store: store.clone(),
        bus: bus.clone(),
        pool: worker_pool.clone(),
        deities,
        stream_base_url: config.server.public_base_url.clone(),
    };

    let app = routes::router(app_state)
        .merge(fortune_gateway::router(gateway_state))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr).await?;
    info!(addr = %config.server.bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutdown signal received, draining worker pool...");
    sweep_handle.abort();
    match Arc::try_unwrap(worker_pool) {
        Ok(pool) => pool.shutdown().await,
        Err(_) => tracing::warn!("worker pool still has outstanding references, skipping clean shutdown"),
    }
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C"),
        _ = terminate => info!("received SIGTERM"),
    }
}
