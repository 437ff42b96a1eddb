use chrono::Utc;
use serde_json::json;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Append-only JSONL trace of committee stages, one record per event:
/// `{ts, event, run_context, payload}`.
///
/// The trace is observational: write failures are logged and never gate the
/// pipeline.
pub struct TraceWriter {
    path: Option<PathBuf>,
    file_id: String,
    run_id: i64,
}

impl TraceWriter {
    pub fn disabled() -> Self {
        Self {
            path: None,
            file_id: String::new(),
            run_id: 0,
        }
    }

    pub fn new(trace_dir: &Path, file_id: &str, run_id: i64) -> Self {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let dir = trace_dir.join(format!("{}_{}_{}", stamp, file_id, run_id));
        if let Err(e) = std::fs::create_dir_all(&dir) {
            warn!(dir = %dir.display(), error = %e, "cannot create trace directory");
            return Self::disabled();
        }
        Self {
            path: Some(dir.join("trace.jsonl")),
            file_id: file_id.to_string(),
            run_id,
        }
    }

    pub fn enabled(&self) -> bool {
        self.path.is_some()
    }

    pub fn write(&self, event: &str, payload: serde_json::Value) {
        let Some(path) = &self.path else {
            return;
        };
        let record = json!({
            "ts": Utc::now().to_rfc3339(),
            "event": event,
            "run_context": { "file_id": self.file_id, "run_id": self.run_id },
            "payload": payload,
        });
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut f| writeln!(f, "{}", record));
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "trace write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_writer_is_silent() {
        let writer = TraceWriter::disabled();
        assert!(!writer.enabled());
        writer.write("init", json!({"n": 1}));
    }

    #[test]
    fn test_records_appended_as_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let writer = TraceWriter::new(dir.path(), "f123", 42);
        assert!(writer.enabled());

        writer.write("init", json!({"samples": 3}));
        writer.write("final", json!({"kept": 1}));

        let trace_path = std::fs::read_dir(dir.path())
            .unwrap()
            .next()
            .unwrap()
            .unwrap()
            .path()
            .join("trace.jsonl");
        let content = std::fs::read_to_string(trace_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "init");
        assert_eq!(first["run_context"]["file_id"], "f123");
        assert_eq!(first["run_context"]["run_id"], 42);
        assert_eq!(first["payload"]["samples"], 3);
    }
}
