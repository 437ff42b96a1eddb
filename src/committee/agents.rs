use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Orchestration knobs from the agents YAML (`committee.orchestration`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestrationConfig {
    pub max_templates: usize,
    pub max_chars_per_call: usize,
    pub max_items_per_call: usize,
    pub adversary_unmatched_limit: usize,
    /// Fraction of the adversary corpus a candidate may match and still
    /// pass. Zero reproduces the strict any-hit-rejects policy.
    pub adversary_max_hit_rate: f64,
    pub trace_conversations: bool,
    pub trace_dir: PathBuf,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            max_templates: 20,
            max_chars_per_call: 32_000,
            max_items_per_call: 120,
            adversary_unmatched_limit: 100,
            adversary_max_hit_rate: 0.0,
            trace_conversations: false,
            trace_dir: PathBuf::from("data/agent_traces"),
        }
    }
}

/// Per-agent model selection; clusterer/drafter/adversary/regressor/arbiter
/// may each point at a different model.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AgentEntry {
    pub model: ModelConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub provider: Option<String>,
    pub model_name: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model_name_ref: Option<String>,
    pub base_url_ref: Option<String>,
    pub api_key_ref: Option<String>,
    pub timeout_s: Option<u64>,
    pub temperature: Option<f64>,
}

/// The `committee:` section of the agents YAML. The section may also sit at
/// the document root; loading accepts both shapes.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    pub backend: Option<String>,
    pub orchestration: OrchestrationConfig,
    pub agents: HashMap<String, AgentEntry>,
}

impl AgentsConfig {
    pub fn agent_model(&self, name: &str) -> ModelConfig {
        self.agents
            .get(name)
            .map(|a| a.model.clone())
            .unwrap_or_default()
    }
}

/// Everything the chat backend needs after ref/env resolution.
#[derive(Debug, Clone)]
pub struct ResolvedModel {
    pub model_name: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub temperature: f64,
}

pub fn default_agents_path() -> PathBuf {
    std::env::var("LOG_ANALYZER_AGENTS_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("configs/agents.yaml"))
}

pub fn default_secrets_path() -> PathBuf {
    std::env::var("LOG_ANALYZER_SECRETS_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("configs/secrets.yaml"))
}

/// Load the agents config; a missing or unreadable file degrades to the
/// defaults so the stub backend keeps working without any setup.
pub fn load_agents_config(path: &Path) -> AgentsConfig {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(_) => return AgentsConfig::default(),
    };
    let value: serde_yaml::Value = match serde_yaml::from_str(&text) {
        Ok(v) => v,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "agents config unparsable, using defaults");
            return AgentsConfig::default();
        }
    };
    // Accept either `committee: {...}` or the section at the root.
    let section = value.get("committee").cloned().unwrap_or(value);
    match serde_yaml::from_value(section) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "agents config invalid, using defaults");
            AgentsConfig::default()
        }
    }
}

/// Load the secrets YAML; missing or broken files resolve to an empty map.
pub fn load_secrets(path: &Path) -> serde_yaml::Value {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|t| serde_yaml::from_str(&t).ok())
        .unwrap_or(serde_yaml::Value::Null)
}

fn dot_get<'a>(root: &'a serde_yaml::Value, path: &str) -> Option<&'a serde_yaml::Value> {
    let mut cur = root;
    for part in path.split('.') {
        cur = cur.get(part)?;
    }
    Some(cur)
}

fn value_to_string(v: &serde_yaml::Value) -> Option<String> {
    match v {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Field precedence: direct value in the agents YAML, then its `*_ref`
/// resolved through the secrets YAML by dot path, then environment
/// variables, then the default.
fn resolve_field(
    direct: &Option<String>,
    ref_path: &Option<String>,
    secrets: &serde_yaml::Value,
    env_keys: &[&str],
) -> Option<String> {
    if let Some(v) = direct {
        if !v.is_empty() {
            return Some(v.clone());
        }
    }
    if let Some(rp) = ref_path {
        if let Some(v) = dot_get(secrets, rp).and_then(value_to_string) {
            return Some(v);
        }
    }
    for key in env_keys {
        if let Ok(v) = std::env::var(key) {
            if !v.is_empty() {
                return Some(v);
            }
        }
    }
    None
}

/// Resolve one agent's model config into connection parameters.
pub fn resolve_model(model: &ModelConfig, secrets: &serde_yaml::Value) -> ResolvedModel {
    let model_name = resolve_field(
        &model.model_name,
        &model.model_name_ref,
        secrets,
        &["LLM_MODEL"],
    )
    .unwrap_or_else(|| "gpt-4o-mini".to_string());

    let base_url = resolve_field(
        &model.base_url,
        &model.base_url_ref,
        secrets,
        &["OPENAI_BASE_URL", "OPENAI_API_BASE", "LLM_API_BASE"],
    );

    let api_key = resolve_field(
        &model.api_key,
        &model.api_key_ref,
        secrets,
        &["OPENAI_API_KEY", "LLM_API_KEY"],
    );

    let timeout_s = model.timeout_s.unwrap_or(600);

    ResolvedModel {
        model_name,
        base_url,
        api_key,
        timeout: Duration::from_secs(timeout_s),
        temperature: model.temperature.unwrap_or(0.0),
    }
}
