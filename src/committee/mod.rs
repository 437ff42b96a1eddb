pub mod agents;
pub mod backend;
pub mod trace;

use crate::catalog::{substitute_numnum, CandidateTemplate, Catalog, CatalogError};
use crate::config::types::CommitteeSettings;
use agents::{
    default_agents_path, default_secrets_path, load_agents_config, load_secrets, resolve_model,
    OrchestrationConfig,
};
use backend::{ChatBackend, DraftBackend, DraftCandidate, StubBackend};
use regex::Regex;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use trace::TraceWriter;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum CommitteeError {
    #[error("llm error: {0}")]
    Llm(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

/// Identifies the triggering run for trace records.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub file_id: String,
    pub run_id: i64,
}

/// The LLM committee: truncate the sample set, draft candidate patterns,
/// run the adversary and regression filters against catalog corpora, then
/// arbitrate. A failed firing yields zero candidates; it never fails the
/// pipeline.
pub struct Committee {
    backend: Box<dyn DraftBackend>,
    orchestration: OrchestrationConfig,
    catalog: Arc<dyn Catalog>,
}

impl Committee {
    /// Build a committee from application settings. Agents/secrets files are
    /// optional; unknown or unbuildable backends degrade to the stub.
    pub fn from_settings(settings: &CommitteeSettings, catalog: Arc<dyn Catalog>) -> Self {
        let agents_path = settings
            .config_path
            .clone()
            .unwrap_or_else(default_agents_path);
        let secrets_path = settings
            .secrets_path
            .clone()
            .unwrap_or_else(default_secrets_path);

        let agents_cfg = load_agents_config(&agents_path);
        let backend_name = agents_cfg
            .backend
            .clone()
            .unwrap_or_else(|| settings.backend.clone())
            .to_lowercase();

        let backend: Box<dyn DraftBackend> = match backend_name.as_str() {
            "langchain" | "langgraph" => {
                let tag: &'static str = if backend_name == "langgraph" {
                    "langgraph"
                } else {
                    "langchain"
                };
                let secrets = load_secrets(&secrets_path);
                let model = resolve_model(&agents_cfg.agent_model("drafter"), &secrets);
                match ChatBackend::new(tag, model) {
                    Ok(chat) => Box::new(chat),
                    Err(e) => {
                        warn!(error = %e, "chat backend unavailable, falling back to stub");
                        Box::new(StubBackend)
                    }
                }
            }
            "stub" => Box::new(StubBackend),
            other => {
                warn!(backend = other, "unknown committee backend, using stub");
                Box::new(StubBackend)
            }
        };

        Self {
            backend,
            orchestration: agents_cfg.orchestration,
            catalog,
        }
    }

    #[cfg(test)]
    fn with_backend(
        backend: Box<dyn DraftBackend>,
        orchestration: OrchestrationConfig,
        catalog: Arc<dyn Catalog>,
    ) -> Self {
        Self {
            backend,
            orchestration,
            catalog,
        }
    }

    /// Run one committee firing over a locked sample batch.
    pub async fn run(&self, samples: &[String], ctx: &RunContext) -> Vec<CandidateTemplate> {
        let samples = truncate_samples(
            samples,
            self.orchestration.max_chars_per_call,
            self.orchestration.max_items_per_call,
        );
        if samples.is_empty() {
            return Vec::new();
        }

        let trace = if self.orchestration.trace_conversations {
            TraceWriter::new(&self.orchestration.trace_dir, &ctx.file_id, ctx.run_id)
        } else {
            TraceWriter::disabled()
        };
        trace.write(
            "init",
            json!({
                "samples_cnt": samples.len(),
                "max_templates": self.orchestration.max_templates,
            }),
        );

        let drafts = match self.backend.draft(&samples).await {
            Ok(drafts) => drafts,
            Err(e) => {
                warn!(error = %e, "committee draft failed, firing yields no candidates");
                trace.write("draft.error", json!({ "error": e.to_string() }));
                return Vec::new();
            }
        };
        let drafts: Vec<DraftCandidate> = drafts
            .into_iter()
            .filter(|d| !d.pattern.trim().is_empty())
            .collect();
        trace.write("draft.output", json!({ "count": drafts.len() }));
        if drafts.is_empty() {
            return Vec::new();
        }

        let negatives = self
            .catalog
            .get_recent_unmatched(self.orchestration.adversary_unmatched_limit)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "adversary corpus unavailable");
                Vec::new()
            });
        let positives = self
            .catalog
            .get_template_samples(100)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "regression corpus unavailable");
                Vec::new()
            });
        trace.write(
            "hist.loaded",
            json!({ "negatives": negatives.len(), "matched_hist": positives.len() }),
        );

        let mut passed = Vec::new();
        for draft in drafts {
            let effective = substitute_numnum(&draft.pattern);
            let compiled = match Regex::new(&effective) {
                Ok(re) => re,
                Err(e) => {
                    trace.write(
                        "filter.compile_error",
                        json!({ "pattern": draft.pattern, "error": e.to_string() }),
                    );
                    continue;
                }
            };

            let adv = adversary_ok(
                &compiled,
                &negatives,
                self.orchestration.adversary_max_hit_rate,
            );
            trace.write(
                "adversary.result",
                json!({ "pattern": draft.pattern, "neg_checked": negatives.len(), "ok": adv }),
            );
            if !adv {
                continue;
            }

            let reg = regression_ok(&compiled, &positives);
            trace.write(
                "regression.result",
                json!({ "pattern": draft.pattern, "checked": positives.len(), "passed": reg }),
            );
            if !reg {
                continue;
            }

            passed.push(draft);
        }

        let mut finals = arbitrate(passed);
        finals.truncate(self.orchestration.max_templates);
        trace.write("final", json!({ "kept": finals.len() }));
        info!(kept = finals.len(), backend = self.backend.name(), "committee firing complete");

        let source = self.backend.name().to_string();
        finals
            .into_iter()
            .map(|d| CandidateTemplate {
                pattern: d.pattern,
                sample_log: d.sample_log,
                semantic_info: d.semantic_info,
                advise: d.advise,
                source: source.clone(),
            })
            .collect()
    }
}

/// Bound the LLM input: dedup, favor diverse short samples, cap item count
/// and total characters.
pub fn truncate_samples(samples: &[String], max_chars: usize, max_items: usize) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut uniq: Vec<&String> = Vec::new();
    for s in samples {
        if !s.trim().is_empty() && seen.insert(s.as_str()) {
            uniq.push(s);
        }
    }
    uniq.sort_by_key(|s| s.len());

    let mut out = Vec::new();
    let mut total = 0usize;
    for s in uniq.into_iter().take(max_items) {
        if total + s.len() + 1 > max_chars {
            break;
        }
        total += s.len() + 1;
        out.push(s.clone());
    }
    out
}

/// A candidate must not absorb lines the catalog intentionally left
/// unmatched; `max_hit_rate` zero rejects on any hit.
fn adversary_ok(pattern: &Regex, negatives: &[String], max_hit_rate: f64) -> bool {
    if negatives.is_empty() {
        return true;
    }
    let hits = negatives.iter().filter(|n| pattern.find(n).is_some()).count();
    (hits as f64 / negatives.len() as f64) <= max_hit_rate
}

/// A candidate must stay consistent with historical positive samples: at
/// least 60% coverage, or an empty corpus.
fn regression_ok(pattern: &Regex, positives: &[String]) -> bool {
    if positives.is_empty() {
        return true;
    }
    let hits = positives.iter().filter(|p| pattern.find(p).is_some()).count();
    hits >= std::cmp::max(1, (positives.len() as f64 * 0.6) as usize)
}

/// Pass-through for now; the hook for inter-candidate deduplication and
/// scoring.
fn arbitrate(drafts: Vec<DraftCandidate>) -> Vec<DraftCandidate> {
    drafts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DuckDbCatalog;

    fn ctx() -> RunContext {
        RunContext {
            file_id: "testfile".to_string(),
            run_id: 1,
        }
    }

    async fn empty_catalog() -> Arc<DuckDbCatalog> {
        let c = Arc::new(DuckDbCatalog::in_memory().unwrap());
        c.init_schema().await.unwrap();
        c
    }

    fn stub_committee(catalog: Arc<DuckDbCatalog>) -> Committee {
        Committee::with_backend(
            Box::new(StubBackend),
            OrchestrationConfig::default(),
            catalog,
        )
    }

    #[test]
    fn test_truncate_dedups_and_prefers_short() {
        let samples = vec![
            "a longer sample text".to_string(),
            "short".to_string(),
            "short".to_string(),
            "mid size".to_string(),
        ];
        let out = truncate_samples(&samples, 1000, 10);
        assert_eq!(out, vec!["short", "mid size", "a longer sample text"]);
    }

    #[test]
    fn test_truncate_caps_items_and_chars() {
        let samples: Vec<String> = (10..30).map(|i| format!("sample number {}", i)).collect();
        assert_eq!(truncate_samples(&samples, 10_000, 5).len(), 5);

        let out = truncate_samples(&samples, 40, 100);
        let total: usize = out.iter().map(|s| s.len() + 1).sum();
        assert!(total <= 40);
        assert!(!out.is_empty());
    }

    #[test]
    fn test_truncate_drops_blank_samples() {
        let samples = vec!["  ".to_string(), String::new(), "real".to_string()];
        assert_eq!(truncate_samples(&samples, 1000, 10), vec!["real"]);
    }

    #[tokio::test]
    async fn test_stub_firing_produces_candidates() {
        let catalog = empty_catalog().await;
        let committee = stub_committee(catalog);

        let samples = vec![
            "sensor error code 42".to_string(),
            "link down on port 3".to_string(),
        ];
        let out = committee.run(&samples, &ctx()).await;
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|c| c.source == "stub"));
        // Stub patterns must cover their own sample.
        for c in &out {
            let re = Regex::new(&substitute_numnum(&c.pattern)).unwrap();
            assert!(re.find(&c.sample_log).is_some());
        }
    }

    #[tokio::test]
    async fn test_empty_samples_yield_nothing() {
        let catalog = empty_catalog().await;
        let committee = stub_committee(catalog);
        assert!(committee.run(&[], &ctx()).await.is_empty());
    }

    #[tokio::test]
    async fn test_adversary_rejects_overlap_with_unmatched() {
        let catalog = empty_catalog().await;
        // A historical miss that the stub's generalization would absorb.
        catalog
            .write_unmatched(1, "f", "sensor error code 99", "raw", "")
            .await
            .unwrap();

        let committee = stub_committee(catalog);
        let out = committee
            .run(&["sensor error code 42".to_string()], &ctx())
            .await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_regression_rejects_inconsistent_candidate() {
        let catalog = empty_catalog().await;
        // Historical positives that the new candidate will not cover.
        catalog
            .write_templates(&[
                CandidateTemplate {
                    pattern: "^alpha$".to_string(),
                    sample_log: "alpha".to_string(),
                    source: "stub".to_string(),
                    ..Default::default()
                },
                CandidateTemplate {
                    pattern: "^beta$".to_string(),
                    sample_log: "beta".to_string(),
                    source: "stub".to_string(),
                    ..Default::default()
                },
            ])
            .await
            .unwrap();

        let committee = stub_committee(catalog);
        let out = committee.run(&["gamma delta".to_string()], &ctx()).await;
        assert!(out.is_empty());
    }

    #[test]
    fn test_adversary_hit_rate_policy() {
        let re = Regex::new("^hit").unwrap();
        let negatives: Vec<String> = vec![
            "hit one".to_string(),
            "miss one".to_string(),
            "miss two".to_string(),
            "miss three".to_string(),
        ];
        assert!(!adversary_ok(&re, &negatives, 0.0));
        assert!(adversary_ok(&re, &negatives, 0.25));
        assert!(adversary_ok(&re, &[], 0.0));
    }

    #[test]
    fn test_regression_threshold() {
        let re = Regex::new("^cov").unwrap();
        let mostly: Vec<String> = vec![
            "cov a".to_string(),
            "cov b".to_string(),
            "cov c".to_string(),
            "other".to_string(),
        ];
        assert!(regression_ok(&re, &mostly));

        let mostly_not: Vec<String> = vec![
            "cov a".to_string(),
            "other b".to_string(),
            "other c".to_string(),
            "other d".to_string(),
        ];
        assert!(!regression_ok(&re, &mostly_not));
        assert!(regression_ok(&re, &[]));
    }
}
