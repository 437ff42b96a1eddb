pub mod duckdb;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use self::duckdb::DuckDbCatalog;

/// The numeric regex every `NUMNUM` placeholder expands to at persistence
/// time.
pub const NUMERIC_PATTERN: &str = r"[-+]?(?:\d+\.\d*|\.\d+|\d+)";

/// Materialize the effective pattern from its model-authored form. Patterns
/// without the placeholder pass through unchanged, byte for byte.
pub fn substitute_numnum(pattern_nomal: &str) -> String {
    pattern_nomal.replace("NUMNUM", NUMERIC_PATTERN)
}

/// Resolve the catalog path: `LOG_ANALYZER_DB` wins over the configured one.
pub fn resolve_catalog_path(configured: &Path) -> PathBuf {
    match std::env::var("LOG_ANALYZER_DB") {
        Ok(p) if !p.is_empty() => PathBuf::from(p),
        _ => configured.to_path_buf(),
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("database error: {0}")]
    Database(#[from] ::duckdb::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("task join error: {0}")]
    Join(String),
}

/// Active template row, fetched in ascending id order.
#[derive(Debug, Clone)]
pub struct TemplateRow {
    pub template_id: i64,
    pub pattern: String,
    pub pattern_nomal: String,
    pub sample_log: String,
}

/// Committee output queued for persistence. `pattern` is the model-authored
/// (`pattern_nomal`) form; `NUMNUM` is expanded on write.
#[derive(Debug, Clone, Default)]
pub struct CandidateTemplate {
    pub pattern: String,
    pub sample_log: String,
    pub semantic_info: String,
    pub advise: String,
    pub source: String,
}

/// One aggregation row for `log_match_summary`.
#[derive(Debug, Clone)]
pub struct SummaryRow {
    pub run_id: i64,
    pub file_id: String,
    pub template_id: i64,
    pub module: String,
    pub submodule: String,
    pub classification: String,
    pub level: String,
    pub thread_id: String,
    pub first_ts: String,
    pub last_ts: String,
    pub line_count: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunTotals {
    pub total_lines: u64,
    pub preprocessed_lines: u64,
    pub matched_lines: u64,
    pub unmatched_lines: u64,
}

/// Gateway to the persistent template catalog.
///
/// Every call opens its own unit of work; writes are transactional at the
/// call granularity and no transaction is held across component boundaries.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn init_schema(&self) -> Result<(), CatalogError>;

    /// Idempotent upsert; the first `ingested_at` survives re-registration.
    async fn register_file(
        &self,
        file_id: &str,
        path: &str,
        size_bytes: u64,
        mtime: &str,
    ) -> Result<(), CatalogError>;

    async fn create_run_session(
        &self,
        file_id: &str,
        pass_type: &str,
        config_json: &str,
    ) -> Result<i64, CatalogError>;

    async fn complete_run_session(
        &self,
        run_id: i64,
        totals: RunTotals,
        status: &str,
    ) -> Result<(), CatalogError>;

    async fn upsert_modules(&self, modules: &[String]) -> Result<(), CatalogError>;

    async fn upsert_submodules(&self, pairs: &[(String, String)]) -> Result<(), CatalogError>;

    /// Active templates in ascending `template_id` order.
    async fn fetch_active_templates(&self) -> Result<Vec<TemplateRow>, CatalogError>;

    /// Write candidates, skipping empty or batch-duplicate `pattern_nomal`
    /// values, expanding `NUMNUM`, and appending the initial history row.
    /// Returns the ids actually inserted.
    async fn write_templates(
        &self,
        candidates: &[CandidateTemplate],
    ) -> Result<Vec<i64>, CatalogError>;

    /// Poisoned-catalog recovery: flip a template inactive. Returns whether
    /// a row changed.
    async fn deactivate_template(&self, template_id: i64) -> Result<bool, CatalogError>;

    async fn write_unmatched(
        &self,
        run_id: i64,
        file_id: &str,
        key_text: &str,
        raw_log: &str,
        reason: &str,
    ) -> Result<(), CatalogError>;

    async fn batch_upsert_log_match_summary(&self, rows: &[SummaryRow])
        -> Result<(), CatalogError>;

    /// Adversary corpus: most recently written unmatched key-texts.
    async fn get_recent_unmatched(&self, limit: usize) -> Result<Vec<String>, CatalogError>;

    /// Regression corpus: sample logs of the most recently updated templates.
    async fn get_template_samples(&self, limit: usize) -> Result<Vec<String>, CatalogError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numnum_substitution() {
        assert_eq!(
            substitute_numnum("^val NUMNUM end$"),
            format!("^val {} end$", NUMERIC_PATTERN)
        );
        assert_eq!(
            substitute_numnum("NUMNUM NUMNUM"),
            format!("{} {}", NUMERIC_PATTERN, NUMERIC_PATTERN)
        );
    }

    #[test]
    fn test_numnum_identity_without_placeholder() {
        assert_eq!(substitute_numnum(r"^plain \d+ pattern$"), r"^plain \d+ pattern$");
        assert_eq!(substitute_numnum(""), "");
    }

    #[test]
    fn test_escaping_preserved_around_substitution() {
        assert_eq!(
            substitute_numnum(r"\(NUMNUM\)"),
            format!(r"\({}\)", NUMERIC_PATTERN)
        );
    }
}
