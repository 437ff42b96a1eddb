use crate::aggregate::Aggregator;
use crate::catalog::{resolve_catalog_path, Catalog, DuckDbCatalog, RunTotals};
use crate::cli::{compute_file_id, PipelineError};
use crate::config::Config;
use crate::matcher::{IndexManager, MatcherRuntime, DEFAULT_MEMO_CAPACITY};
use crate::record::{FieldParser, Record};
use crate::source::ChunkReader;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Second-pass invocation parameters; `file_id` of `None` derives it from
/// the file the same way the first pass did.
#[derive(Debug, Clone)]
pub struct SecondPassArgs {
    pub path: PathBuf,
    pub file_id: Option<String>,
    pub chunk_lines: Option<usize>,
    pub micro_batch: Option<usize>,
    pub match_workers: Option<usize>,
}

/// The aggregation pass: replay a normal file against the finished catalog
/// and accumulate per-template match statistics.
pub async fn run(args: SecondPassArgs, config: &Config) -> Result<(), PipelineError> {
    let sp = &config.second_pass;
    let chunk_lines = args.chunk_lines.unwrap_or(sp.read_chunk_lines);
    let micro_batch = args.micro_batch.unwrap_or(sp.micro_batch_size).max(1);
    let match_workers = args.match_workers.unwrap_or(sp.match_workers_per_batch);

    let file_id = match args.file_id {
        Some(id) => id,
        None => compute_file_id(&args.path)?,
    };

    let catalog_path = resolve_catalog_path(&config.catalog.path);
    let catalog: Arc<DuckDbCatalog> = Arc::new(DuckDbCatalog::new(&catalog_path)?);
    catalog.init_schema().await?;

    let meta = std::fs::metadata(&args.path)?;
    catalog
        .register_file(&file_id, &args.path.to_string_lossy(), meta.len(), "")
        .await?;

    let config_json = json!({
        "chunk_lines": chunk_lines,
        "micro_batch": micro_batch,
        "match_workers": match_workers,
    })
    .to_string();
    let run_id = catalog
        .create_run_session(&file_id, "second", &config_json)
        .await?;

    info!(file_id = %file_id, run_id, path = %args.path.display(), "second pass started");

    let manager = IndexManager::new(catalog.clone(), DEFAULT_MEMO_CAPACITY);
    manager.load_initial().await?;
    let runtime = MatcherRuntime::new();
    let parser = FieldParser::new();
    let mut aggregator = Aggregator::new(run_id, &file_id, sp.flush_lines, catalog.clone());

    let mut total_lines = 0u64;
    let mut unmatched = 0u64;

    let mut reader = ChunkReader::open(&args.path, chunk_lines)?;
    while let Some(chunk) = reader.next_chunk()? {
        let parsed: Vec<Record> = chunk.iter().filter_map(|l| parser.parse(l)).collect();

        for batch in parsed.chunks(micro_batch) {
            let index = manager.get_active();
            let results = runtime.match_batch(index.as_ref(), batch, match_workers)?;

            for (record, outcome) in batch.iter().zip(results.iter()) {
                total_lines += 1;
                match outcome.template_id {
                    Some(template_id) => {
                        aggregator
                            .add_match(
                                template_id,
                                &record.module,
                                &record.submodule,
                                "",
                                &record.level,
                                &record.thread_id,
                                &record.ts,
                            )
                            .await?;
                    }
                    None => {
                        unmatched += 1;
                        if let Err(e) = catalog
                            .write_unmatched(run_id, &file_id, &record.key_text, &record.raw, "")
                            .await
                        {
                            warn!(error = %e, "unmatched row write failed");
                        }
                    }
                }
            }
        }
    }

    aggregator.flush().await?;

    let totals = RunTotals {
        total_lines,
        preprocessed_lines: total_lines,
        matched_lines: total_lines - unmatched,
        unmatched_lines: unmatched,
    };
    catalog.complete_run_session(run_id, totals, "success").await?;

    println!(
        "[OK] second pass complete file_id={} total={} unmatched={}",
        file_id, total_lines, unmatched
    );
    Ok(())
}
