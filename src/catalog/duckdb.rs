use super::{
    substitute_numnum, CandidateTemplate, Catalog, CatalogError, RunTotals, SummaryRow,
    TemplateRow,
};
use async_trait::async_trait;
use chrono::Utc;
use duckdb::Connection;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

const SCHEMA: &str = r#"
CREATE SEQUENCE IF NOT EXISTS seq_run_id START 1;
CREATE SEQUENCE IF NOT EXISTS seq_template_id START 1;
CREATE SEQUENCE IF NOT EXISTS seq_history_id START 1;
CREATE SEQUENCE IF NOT EXISTS seq_um_id START 1;

CREATE TABLE IF NOT EXISTS file_registry (
    file_id VARCHAR PRIMARY KEY,
    path VARCHAR NOT NULL,
    size_bytes UBIGINT NOT NULL,
    gz_mtime VARCHAR NOT NULL,
    ingested_at VARCHAR NOT NULL,
    status VARCHAR NOT NULL
);

CREATE TABLE IF NOT EXISTS run_session (
    run_id BIGINT PRIMARY KEY,
    file_id VARCHAR NOT NULL,
    pass_type VARCHAR NOT NULL,
    config_json VARCHAR NOT NULL,
    started_at VARCHAR NOT NULL,
    ended_at VARCHAR,
    total_lines UBIGINT NOT NULL DEFAULT 0,
    preprocessed_lines UBIGINT NOT NULL DEFAULT 0,
    matched_lines UBIGINT NOT NULL DEFAULT 0,
    unmatched_lines UBIGINT NOT NULL DEFAULT 0,
    status VARCHAR NOT NULL
);

CREATE TABLE IF NOT EXISTS module (
    "mod" VARCHAR PRIMARY KEY,
    description VARCHAR NOT NULL DEFAULT '',
    created_at VARCHAR NOT NULL,
    updated_at VARCHAR NOT NULL
);

CREATE TABLE IF NOT EXISTS submodule (
    smod VARCHAR PRIMARY KEY,
    "mod" VARCHAR NOT NULL,
    description VARCHAR NOT NULL DEFAULT '',
    created_at VARCHAR NOT NULL,
    updated_at VARCHAR NOT NULL
);

CREATE TABLE IF NOT EXISTS regex_template (
    template_id BIGINT PRIMARY KEY,
    pattern VARCHAR NOT NULL,
    pattern_nomal VARCHAR NOT NULL,
    sample_log VARCHAR NOT NULL DEFAULT '',
    semantic_info VARCHAR NOT NULL DEFAULT '',
    advise VARCHAR NOT NULL DEFAULT '',
    version INTEGER NOT NULL DEFAULT 1,
    is_active BOOLEAN NOT NULL DEFAULT TRUE,
    source VARCHAR NOT NULL DEFAULT '',
    created_at VARCHAR NOT NULL,
    updated_at VARCHAR NOT NULL
);

CREATE TABLE IF NOT EXISTS template_history (
    history_id BIGINT PRIMARY KEY,
    template_id BIGINT NOT NULL,
    pattern VARCHAR NOT NULL,
    sample_log VARCHAR NOT NULL DEFAULT '',
    version INTEGER NOT NULL DEFAULT 1,
    created_at VARCHAR NOT NULL,
    source VARCHAR NOT NULL DEFAULT '',
    note VARCHAR NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS unmatched_log (
    um_id BIGINT PRIMARY KEY,
    run_id BIGINT NOT NULL,
    file_id VARCHAR NOT NULL,
    key_text VARCHAR NOT NULL,
    raw_log VARCHAR NOT NULL,
    buffered BOOLEAN NOT NULL DEFAULT FALSE,
    reason VARCHAR NOT NULL DEFAULT '',
    created_at VARCHAR NOT NULL
);

CREATE TABLE IF NOT EXISTS log_match_summary (
    run_id BIGINT NOT NULL,
    file_id VARCHAR NOT NULL,
    template_id BIGINT NOT NULL,
    "mod" VARCHAR NOT NULL DEFAULT '',
    smod VARCHAR NOT NULL DEFAULT '',
    classification VARCHAR NOT NULL DEFAULT '',
    level VARCHAR NOT NULL DEFAULT '',
    thread_id VARCHAR NOT NULL DEFAULT '',
    first_ts VARCHAR NOT NULL DEFAULT '',
    last_ts VARCHAR NOT NULL DEFAULT '',
    line_count UBIGINT NOT NULL DEFAULT 0,
    updated_at VARCHAR NOT NULL
);
"#;

fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

/// DuckDB implementation of the [`Catalog`] trait.
pub struct DuckDbCatalog {
    conn: Arc<Mutex<Connection>>,
}

impl DuckDbCatalog {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory catalog for tests.
    pub fn in_memory() -> Result<Self, CatalogError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) async fn with_conn<T, F>(&self, f: F) -> Result<T, CatalogError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, CatalogError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().unwrap();
            f(&mut conn)
        })
        .await
        .map_err(|e| CatalogError::Join(e.to_string()))?
    }
}

#[async_trait]
impl Catalog for DuckDbCatalog {
    async fn init_schema(&self) -> Result<(), CatalogError> {
        self.with_conn(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await
    }

    async fn register_file(
        &self,
        file_id: &str,
        path: &str,
        size_bytes: u64,
        mtime: &str,
    ) -> Result<(), CatalogError> {
        let (file_id, path, mtime) = (file_id.to_string(), path.to_string(), mtime.to_string());
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO file_registry (file_id, path, size_bytes, gz_mtime, ingested_at, status)
                 VALUES (?, ?, ?, ?, ?, 'new')
                 ON CONFLICT (file_id) DO UPDATE SET
                     path = excluded.path,
                     size_bytes = excluded.size_bytes,
                     gz_mtime = excluded.gz_mtime",
                duckdb::params![file_id, path, size_bytes, mtime, now_iso()],
            )?;
            Ok(())
        })
        .await
    }

    async fn create_run_session(
        &self,
        file_id: &str,
        pass_type: &str,
        config_json: &str,
    ) -> Result<i64, CatalogError> {
        let (file_id, pass_type, config_json) = (
            file_id.to_string(),
            pass_type.to_string(),
            config_json.to_string(),
        );
        self.with_conn(move |conn| {
            let run_id = conn.query_row(
                "INSERT INTO run_session (run_id, file_id, pass_type, config_json, started_at, status)
                 VALUES (nextval('seq_run_id'), ?, ?, ?, ?, 'running')
                 RETURNING run_id",
                duckdb::params![file_id, pass_type, config_json, now_iso()],
                |row| row.get::<_, i64>(0),
            )?;
            Ok(run_id)
        })
        .await
    }

    async fn complete_run_session(
        &self,
        run_id: i64,
        totals: RunTotals,
        status: &str,
    ) -> Result<(), CatalogError> {
        let status = status.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE run_session SET
                     total_lines = ?, preprocessed_lines = ?, matched_lines = ?,
                     unmatched_lines = ?, status = ?, ended_at = ?
                 WHERE run_id = ?",
                duckdb::params![
                    totals.total_lines,
                    totals.preprocessed_lines,
                    totals.matched_lines,
                    totals.unmatched_lines,
                    status,
                    now_iso(),
                    run_id
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn upsert_modules(&self, modules: &[String]) -> Result<(), CatalogError> {
        let modules: Vec<String> = modules
            .iter()
            .filter(|m| !m.is_empty())
            .cloned()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let now = now_iso();
            for module in &modules {
                tx.execute(
                    "INSERT INTO module (\"mod\", description, created_at, updated_at)
                     VALUES (?, '', ?, ?)
                     ON CONFLICT (\"mod\") DO UPDATE SET updated_at = excluded.updated_at",
                    duckdb::params![module, now, now],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn upsert_submodules(&self, pairs: &[(String, String)]) -> Result<(), CatalogError> {
        let pairs: Vec<(String, String)> = pairs
            .iter()
            .filter(|(m, s)| !m.is_empty() && !s.is_empty())
            .cloned()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let now = now_iso();
            for (module, submodule) in &pairs {
                tx.execute(
                    "INSERT INTO submodule (smod, \"mod\", description, created_at, updated_at)
                     VALUES (?, ?, '', ?, ?)
                     ON CONFLICT (smod) DO UPDATE SET
                         \"mod\" = excluded.\"mod\",
                         updated_at = excluded.updated_at",
                    duckdb::params![submodule, module, now, now],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn fetch_active_templates(&self) -> Result<Vec<TemplateRow>, CatalogError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT template_id, pattern, pattern_nomal, sample_log
                 FROM regex_template WHERE is_active ORDER BY template_id",
            )?;
            let mut rows = stmt.query([])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(TemplateRow {
                    template_id: row.get(0)?,
                    pattern: row.get(1)?,
                    pattern_nomal: row.get(2)?,
                    sample_log: row.get(3)?,
                });
            }
            Ok(out)
        })
        .await
    }

    async fn write_templates(
        &self,
        candidates: &[CandidateTemplate],
    ) -> Result<Vec<i64>, CatalogError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let candidates = candidates.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let now = now_iso();

            // pattern_nomal is unique among active templates; an existing row
            // turns the write into a dedup skip.
            let mut seen_nomal: HashSet<String> = {
                let mut stmt =
                    tx.prepare("SELECT pattern_nomal FROM regex_template WHERE is_active")?;
                let mut rows = stmt.query([])?;
                let mut existing = HashSet::new();
                while let Some(row) = rows.next()? {
                    existing.insert(row.get::<_, String>(0)?);
                }
                existing
            };
            let mut ids = Vec::new();

            for c in &candidates {
                let pattern_nomal = c.pattern.trim();
                if pattern_nomal.is_empty() || !seen_nomal.insert(pattern_nomal.to_string()) {
                    continue;
                }
                let pattern_real = substitute_numnum(pattern_nomal);

                let template_id = tx.query_row(
                    "INSERT INTO regex_template (template_id, pattern, pattern_nomal, sample_log,
                                                 semantic_info, advise, version, is_active, source,
                                                 created_at, updated_at)
                     VALUES (nextval('seq_template_id'), ?, ?, ?, ?, ?, 1, TRUE, ?, ?, ?)
                     RETURNING template_id",
                    duckdb::params![
                        pattern_real,
                        pattern_nomal,
                        c.sample_log,
                        c.semantic_info,
                        c.advise,
                        c.source,
                        now,
                        now
                    ],
                    |row| row.get::<_, i64>(0),
                )?;
                ids.push(template_id);

                tx.execute(
                    "INSERT INTO template_history (history_id, template_id, pattern, sample_log,
                                                   version, created_at, source, note)
                     VALUES (nextval('seq_history_id'), ?, ?, ?, 1, ?, ?, 'initial')",
                    duckdb::params![template_id, pattern_real, c.sample_log, now, c.source],
                )?;
            }

            tx.commit()?;
            Ok(ids)
        })
        .await
    }

    async fn deactivate_template(&self, template_id: i64) -> Result<bool, CatalogError> {
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE regex_template SET is_active = FALSE, updated_at = ?
                 WHERE template_id = ? AND is_active",
                duckdb::params![now_iso(), template_id],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn write_unmatched(
        &self,
        run_id: i64,
        file_id: &str,
        key_text: &str,
        raw_log: &str,
        reason: &str,
    ) -> Result<(), CatalogError> {
        let (file_id, key_text, raw_log, reason) = (
            file_id.to_string(),
            key_text.to_string(),
            raw_log.to_string(),
            reason.to_string(),
        );
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO unmatched_log (um_id, run_id, file_id, key_text, raw_log, buffered,
                                            reason, created_at)
                 VALUES (nextval('seq_um_id'), ?, ?, ?, ?, FALSE, ?, ?)",
                duckdb::params![run_id, file_id, key_text, raw_log, reason, now_iso()],
            )?;
            Ok(())
        })
        .await
    }

    async fn batch_upsert_log_match_summary(
        &self,
        rows: &[SummaryRow],
    ) -> Result<(), CatalogError> {
        if rows.is_empty() {
            return Ok(());
        }
        let rows = rows.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let now = now_iso();
            for r in &rows {
                tx.execute(
                    "INSERT INTO log_match_summary (run_id, file_id, template_id, \"mod\", smod,
                                                    classification, level, thread_id, first_ts,
                                                    last_ts, line_count, updated_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    duckdb::params![
                        r.run_id,
                        r.file_id,
                        r.template_id,
                        r.module,
                        r.submodule,
                        r.classification,
                        r.level,
                        r.thread_id,
                        r.first_ts,
                        r.last_ts,
                        r.line_count,
                        now
                    ],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn get_recent_unmatched(&self, limit: usize) -> Result<Vec<String>, CatalogError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT key_text FROM unmatched_log ORDER BY um_id DESC LIMIT ?",
            )?;
            let mut rows = stmt.query(duckdb::params![limit as i64])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(row.get(0)?);
            }
            Ok(out)
        })
        .await
    }

    async fn get_template_samples(&self, limit: usize) -> Result<Vec<String>, CatalogError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT sample_log FROM regex_template
                 WHERE sample_log != '' ORDER BY updated_at DESC, template_id DESC LIMIT ?",
            )?;
            let mut rows = stmt.query(duckdb::params![limit as i64])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(row.get(0)?);
            }
            Ok(out)
        })
        .await
    }
}
