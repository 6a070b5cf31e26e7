//! Runtime configuration surface (spec §6 Configuration).
//!
//! Loaded via the `config` crate: defaults, then an optional TOML file, then
//! `FORTUNE_*` environment variables, in that precedence order (lowest to
//! highest).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The `deity_id -> temple` injection (spec §6 "Deity -> temple mapping").
/// Loading the backing metadata is out of scope for this core; this section
/// only carries whatever table the deployment configures.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeitySection {
    pub mapping: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSection {
    pub max_workers: usize,
    pub total_timeout_s: u64,
    pub stuck_after_s: u64,
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            max_workers: 3,
            total_timeout_s: 120,
            stuck_after_s: 180,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSection {
    pub backstop_poll_s: u64,
}

impl Default for QueueSection {
    fn default() -> Self {
        Self { backstop_poll_s: 30 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub max_entries: u64,
    pub ttl_s: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            max_entries: 1_000,
            ttl_s: 3_600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagSection {
    pub top_k: usize,
    pub timeout_s: u64,
    pub base_url: String,
    pub collection: String,
}

impl Default for RagSection {
    fn default() -> Self {
        Self {
            top_k: 5,
            timeout_s: 30,
            base_url: "http://localhost:8100".to_string(),
            collection: "fortune_poems".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub timeout_s: u64,
    pub temperature: f32,
    pub max_tokens: u32,
    pub model: String,
    pub base_url: Option<String>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            timeout_s: 120,
            temperature: 0.7,
            max_tokens: 2_500,
            model: "gpt-4o-mini".to_string(),
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub recovery_timeout_s: u64,
    pub success_threshold: u32,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout_s: 30,
            success_threshold: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSection {
    pub rag: BreakerSettings,
    pub llm: BreakerSettings,
    pub vector: BreakerSettings,
}

impl Default for BreakerSection {
    fn default() -> Self {
        Self {
            rag: BreakerSettings {
                failure_threshold: 3,
                recovery_timeout_s: 30,
                success_threshold: 2,
            },
            llm: BreakerSettings {
                failure_threshold: 5,
                recovery_timeout_s: 60,
                success_threshold: 2,
            },
            vector: BreakerSettings {
                failure_threshold: 3,
                recovery_timeout_s: 45,
                success_threshold: 2,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSection {
    pub max_connection_s: u64,
    pub ping_s: u64,
    pub backlog: usize,
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            max_connection_s: 300,
            ping_s: 30,
            backlog: 128,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/fortune".to_string(),
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind_addr: String,
    /// Base URL clients use to reach this instance, embedded in `stream_url`
    /// on submission responses (spec §6 "Submission request").
    pub public_base_url: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            public_base_url: "http://localhost:8080".to_string(),
        }
    }
}

/// Top-level configuration for the fortune-interpretation service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FortuneConfig {
    pub deity: DeitySection,
    pub workers: WorkerSection,
    pub queue: QueueSection,
    pub cache: CacheSection,
    pub rag: RagSection,
    pub llm: LlmSection,
    pub breaker: BreakerSection,
    pub stream: StreamSection,
    pub database: DatabaseSection,
    pub server: ServerSection,
}

impl FortuneConfig {
    /// Load configuration by layering defaults, an optional TOML file at
    /// `path`, and `FORTUNE_*` environment variables on top, in that order.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?);
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("FORTUNE")
                .separator("__")
                .try_parsing(true),
        );
        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_values() {
        let config = FortuneConfig::default();
        assert_eq!(config.workers.max_workers, 3);
        assert_eq!(config.workers.total_timeout_s, 120);
        assert_eq!(config.cache.ttl_s, 3_600);
        assert_eq!(config.cache.max_entries, 1_000);
        assert_eq!(config.llm.max_tokens, 2_500);
        assert_eq!(config.stream.ping_s, 30);
        assert_eq!(config.stream.max_connection_s, 300);
    }

    #[test]
    fn llm_breaker_recovers_slower_but_tolerates_more_failures() {
        let config = BreakerSection::default();
        assert!(config.llm.recovery_timeout_s > config.vector.recovery_timeout_s);
        assert!(config.llm.failure_threshold > config.vector.failure_threshold);
    }

    #[test]
    fn load_without_file_falls_back_to_defaults() {
        let config = FortuneConfig::load(None).expect("defaults should always deserialize");
        assert_eq!(config.rag.top_k, 5);
    }

    #[test]
    fn toml_round_trips_a_partial_override() {
        let toml_str = r#"
            [workers]
            max_workers = 8
        "#;
        let parsed: FortuneConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(parsed.workers.max_workers, 8);
        assert_eq!(parsed.workers.total_timeout_s, 120);
    }
}
