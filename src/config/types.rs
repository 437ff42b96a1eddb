use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub first_pass: FirstPassConfig,
    pub second_pass: SecondPassConfig,
    pub catalog: CatalogSettings,
    pub safety: SafetySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FirstPassConfig {
    pub read_chunk_lines: usize,
    pub micro_batch_size: usize,
    pub match_workers_per_batch: usize,
    pub buffer: BufferSettings,
    pub committee: CommitteeSettings,
}

impl Default for FirstPassConfig {
    fn default() -> Self {
        Self {
            read_chunk_lines: 5000,
            micro_batch_size: 15,
            match_workers_per_batch: 4,
            buffer: BufferSettings::default(),
            committee: CommitteeSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferSettings {
    pub size_threshold: usize,
    pub max_per_micro_batch: usize,
}

impl Default for BufferSettings {
    fn default() -> Self {
        Self {
            size_threshold: 100,
            max_per_micro_batch: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitteeSettings {
    /// `stub`, `langchain`, or `langgraph`; the agents YAML may override.
    pub backend: String,
    pub config_path: Option<PathBuf>,
    pub secrets_path: Option<PathBuf>,
}

impl Default for CommitteeSettings {
    fn default() -> Self {
        Self {
            backend: "stub".to_string(),
            config_path: None,
            secrets_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecondPassConfig {
    pub read_chunk_lines: usize,
    pub micro_batch_size: usize,
    pub match_workers_per_batch: usize,
    pub flush_lines: usize,
}

impl Default for SecondPassConfig {
    fn default() -> Self {
        Self {
            read_chunk_lines: 10_000,
            micro_batch_size: 20,
            match_workers_per_batch: 4,
            flush_lines: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSettings {
    /// Overridden by `LOG_ANALYZER_DB` when set.
    pub path: PathBuf,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/logloom.duckdb"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetySettings {
    pub treat_warning_as_danger: bool,
    pub dynamic_budget_ms: u64,
}

impl Default for SafetySettings {
    fn default() -> Self {
        Self {
            treat_warning_as_danger: false,
            dynamic_budget_ms: 500,
        }
    }
}
