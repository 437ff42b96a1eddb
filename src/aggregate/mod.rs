use crate::catalog::{Catalog, CatalogError, SummaryRow};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

type SummaryKey = (i64, String, String, String, String, String);

/// Second-pass aggregation of match hits, keyed by
/// `(template_id, module, submodule, classification, level, thread_id)`.
///
/// `first_ts`/`last_ts` are lexicographic min/max over the
/// `"YYYYMMDD HHMMSS"` form, which orders the same as time. Rows flush to
/// the catalog every `flush_lines` observed lines and once at the end.
pub struct Aggregator {
    run_id: i64,
    file_id: String,
    flush_lines: usize,
    catalog: Arc<dyn Catalog>,
    summary: HashMap<SummaryKey, SummaryRow>,
    line_acc: usize,
}

impl Aggregator {
    pub fn new(run_id: i64, file_id: &str, flush_lines: usize, catalog: Arc<dyn Catalog>) -> Self {
        Self {
            run_id,
            file_id: file_id.to_string(),
            flush_lines: flush_lines.max(1),
            catalog,
            summary: HashMap::new(),
            line_acc: 0,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn add_match(
        &mut self,
        template_id: i64,
        module: &str,
        submodule: &str,
        classification: &str,
        level: &str,
        thread_id: &str,
        ts: &str,
    ) -> Result<(), CatalogError> {
        let key: SummaryKey = (
            template_id,
            module.to_string(),
            submodule.to_string(),
            classification.to_string(),
            level.to_string(),
            thread_id.to_string(),
        );

        let row = self.summary.entry(key).or_insert_with(|| SummaryRow {
            run_id: self.run_id,
            file_id: self.file_id.clone(),
            template_id,
            module: module.to_string(),
            submodule: submodule.to_string(),
            classification: classification.to_string(),
            level: level.to_string(),
            thread_id: thread_id.to_string(),
            first_ts: ts.to_string(),
            last_ts: ts.to_string(),
            line_count: 0,
        });

        if ts < row.first_ts.as_str() {
            row.first_ts = ts.to_string();
        }
        if ts > row.last_ts.as_str() {
            row.last_ts = ts.to_string();
        }
        row.line_count += 1;
        self.line_acc += 1;

        if self.line_acc >= self.flush_lines {
            self.flush().await?;
        }
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<(), CatalogError> {
        if self.summary.is_empty() {
            self.line_acc = 0;
            return Ok(());
        }
        let rows: Vec<SummaryRow> = self.summary.values().cloned().collect();
        debug!(rows = rows.len(), "flushing match summary");
        self.catalog.batch_upsert_log_match_summary(&rows).await?;
        self.summary.clear();
        self.line_acc = 0;
        Ok(())
    }
}
