use crate::buffer::DiversityBuffer;
use crate::catalog::{
    resolve_catalog_path, CandidateTemplate, Catalog, DuckDbCatalog, RunTotals,
};
use crate::cli::{compute_file_id, derive_normal_path, derive_uniq_paths, PipelineError};
use crate::committee::{Committee, RunContext};
use crate::config::Config;
use crate::matcher::{
    IndexManager, MatcherRuntime, SafetyAnalyzer, DEFAULT_MEMO_CAPACITY,
};
use crate::record::{extract_key_text, FieldParser, UniqueSetBuilder};
use crate::source::{ChunkReader, Normalizer, Sanitizer};
use serde_json::json;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// First-pass invocation parameters; unset options fall back to the config.
#[derive(Debug, Clone)]
pub struct FirstPassArgs {
    pub path: PathBuf,
    pub normal_out: Option<PathBuf>,
    pub size_threshold: Option<usize>,
    pub max_per_micro_batch: Option<usize>,
    pub chunk_lines: Option<usize>,
    pub micro_batch: Option<usize>,
    pub match_workers: Option<usize>,
    pub force_flush: bool,
}

/// The rule-evolution pass: normalize the file, build the uniq artifacts,
/// match unique key-texts against the active index, buffer the misses, and
/// let threshold firings of the committee grow the catalog mid-run.
pub async fn run(args: FirstPassArgs, config: &Config) -> Result<(), PipelineError> {
    let fp = &config.first_pass;
    let chunk_lines = args.chunk_lines.unwrap_or(fp.read_chunk_lines);
    let micro_batch = args.micro_batch.unwrap_or(fp.micro_batch_size);
    let match_workers = args.match_workers.unwrap_or(fp.match_workers_per_batch);
    let size_threshold = args.size_threshold.unwrap_or(fp.buffer.size_threshold);
    let max_per_mb = args
        .max_per_micro_batch
        .unwrap_or(fp.buffer.max_per_micro_batch);

    let file_id = compute_file_id(&args.path)?;
    let normal_path = derive_normal_path(&args.path, args.normal_out.as_deref());

    let catalog_path = resolve_catalog_path(&config.catalog.path);
    let catalog: Arc<DuckDbCatalog> = Arc::new(DuckDbCatalog::new(&catalog_path)?);
    catalog.init_schema().await?;

    let meta = std::fs::metadata(&args.path)?;
    let mtime = meta
        .modified()?
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    catalog
        .register_file(
            &file_id,
            &args.path.to_string_lossy(),
            meta.len(),
            &mtime.to_string(),
        )
        .await?;

    let config_json = json!({
        "chunk_lines": chunk_lines,
        "micro_batch": micro_batch,
        "match_workers": match_workers,
        "size_threshold": size_threshold,
        "max_per_micro_batch": max_per_mb,
    })
    .to_string();
    let run_id = catalog
        .create_run_session(&file_id, "first", &config_json)
        .await?;

    info!(file_id = %file_id, run_id, path = %args.path.display(), "first pass started");

    // 1) Sanitize + fold continuations into the normal file.
    let (total_raw, normal_lines) = write_normal_file(&args.path, &normal_path, chunk_lines)?;
    info!(total_raw, normal_lines, normal = %normal_path.display(), "normal file written");

    // 2) One sweep over the normal file for modules/submodules.
    let (modules, submodules, parsed_lines, skipped_lines) =
        scan_modules(&normal_path, chunk_lines)?;
    catalog
        .upsert_modules(&modules.into_iter().collect::<Vec<_>>())
        .await?;
    catalog
        .upsert_submodules(&submodules.into_iter().collect::<Vec<_>>())
        .await?;

    // 3) Uniq artifacts; matching consumes the deduplicated keys.
    let (uniq_txt, uniq_tsv, uniq_total, uniq_distinct) =
        build_uniq_files(&normal_path, chunk_lines)?;
    info!(
        uniq = %uniq_txt.display(),
        uniq_with_count = %uniq_tsv.display(),
        uniq_total,
        uniq_distinct,
        "uniq artifacts written"
    );

    // 4) Matching machinery: active index, miss buffer, worker runtime,
    //    committee, safety gate for the write path.
    let manager = IndexManager::new(catalog.clone(), DEFAULT_MEMO_CAPACITY);
    manager.load_initial().await?;
    let mut buffer = DiversityBuffer::new(size_threshold, max_per_mb);
    let runtime = MatcherRuntime::new();
    let committee = Committee::from_settings(&fp.committee, catalog.clone());
    let analyzer = SafetyAnalyzer::new(Duration::from_millis(config.safety.dynamic_budget_ms));
    let ctx = RunContext {
        file_id: file_id.clone(),
        run_id,
    };

    let keys = read_unique_keys(&uniq_txt, chunk_lines)?;
    let mut matched_keys = 0u64;
    let mut unmatched_keys = 0u64;

    for batch in keys.chunks(micro_batch.max(1)) {
        let index = manager.get_active();
        let results = runtime.match_batch(index.as_ref(), batch, match_workers)?;

        let misses: Vec<String> = results
            .iter()
            .filter(|r| !r.is_hit)
            .map(|r| r.key_text.clone())
            .collect();
        matched_keys += (results.len() - misses.len()) as u64;
        unmatched_keys += misses.len() as u64;

        if !misses.is_empty() {
            let picked = buffer.pick_for_buffer(&misses);
            buffer.add(picked);
        }

        if buffer.reached_threshold() {
            fire_committee(
                &mut buffer, &committee, &catalog, &manager, &analyzer, config, &ctx,
            )
            .await;
        }
    }

    if args.force_flush && !buffer.is_empty() {
        fire_committee(
            &mut buffer, &committee, &catalog, &manager, &analyzer, config, &ctx,
        )
        .await;
    }

    let totals = RunTotals {
        total_lines: total_raw,
        preprocessed_lines: normal_lines,
        matched_lines: matched_keys,
        unmatched_lines: unmatched_keys,
    };
    catalog.complete_run_session(run_id, totals, "success").await?;
    info!(
        parsed_lines,
        parse_skipped = skipped_lines,
        matched_keys,
        unmatched_keys,
        "first pass totals"
    );

    println!("[OK] first pass complete file_id={}", file_id);
    Ok(())
}

/// Snapshot and lock the buffer, run one committee firing, persist the safe
/// candidates, rebuild the index synchronously, and always clear the locked
/// batch. Failures are logged; the pipeline continues.
async fn fire_committee(
    buffer: &mut DiversityBuffer,
    committee: &Committee,
    catalog: &Arc<DuckDbCatalog>,
    manager: &IndexManager,
    analyzer: &SafetyAnalyzer,
    config: &Config,
    ctx: &RunContext,
) {
    let samples = buffer.snapshot_and_lock();
    info!(samples = samples.len(), "committee triggered");

    let candidates = committee.run(&samples, ctx).await;
    let safe = filter_unsafe(candidates, analyzer, config.safety.treat_warning_as_danger);

    if !safe.is_empty() {
        match catalog.write_templates(&safe).await {
            Ok(ids) => {
                info!(written = ids.len(), "templates persisted");
                if let Err(e) = manager.build_new_index_sync().await {
                    warn!(error = %e, "index rebuild after splice failed");
                }
            }
            Err(e) => warn!(error = %e, "template write failed, dropping batch"),
        }
    }

    buffer.clear_locked_batch();
}

/// Safety gate at template-write time; rejected candidates are counted but
/// never fail the run.
fn filter_unsafe(
    candidates: Vec<CandidateTemplate>,
    analyzer: &SafetyAnalyzer,
    strict: bool,
) -> Vec<CandidateTemplate> {
    let mut rejected = 0usize;
    let safe: Vec<CandidateTemplate> = candidates
        .into_iter()
        .filter(|c| {
            let report = analyzer.analyze(&c.pattern, std::slice::from_ref(&c.sample_log));
            if report.is_safe(strict) {
                true
            } else {
                warn!(
                    pattern = %c.pattern,
                    flags = ?report.static_flags,
                    "unsafe candidate rejected"
                );
                rejected += 1;
                false
            }
        })
        .collect();
    if rejected > 0 {
        info!(rejected, "candidates rejected by safety analyzer");
    }
    safe
}

fn write_normal_file(
    input: &Path,
    out_path: &Path,
    chunk_lines: usize,
) -> Result<(u64, u64), PipelineError> {
    if let Some(parent) = out_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut reader = ChunkReader::open(input, chunk_lines)?;
    let sanitizer = Sanitizer::new();
    let mut normalizer = Normalizer::new();
    let mut writer = BufWriter::new(File::create(out_path)?);

    let mut total = 0u64;
    let mut kept = 0u64;
    while let Some(chunk) = reader.next_chunk()? {
        for raw in &chunk {
            total += 1;
            if raw.is_empty() {
                continue;
            }
            let clean = sanitizer.sanitize_line(raw);
            if let Some(record) = normalizer.push(&clean) {
                writeln!(writer, "{}", record)?;
                kept += 1;
            }
        }
    }
    if let Some(tail) = normalizer.flush() {
        writeln!(writer, "{}", tail)?;
        kept += 1;
    }
    writer.flush()?;
    Ok((total, kept))
}

type ModuleScan = (HashSet<String>, HashSet<(String, String)>, u64, u64);

fn scan_modules(normal_path: &Path, chunk_lines: usize) -> Result<ModuleScan, PipelineError> {
    let parser = FieldParser::new();
    let mut reader = ChunkReader::open(normal_path, chunk_lines)?;
    let mut modules = HashSet::new();
    let mut submodules = HashSet::new();
    let mut parsed = 0u64;
    let mut skipped = 0u64;

    while let Some(chunk) = reader.next_chunk()? {
        for line in &chunk {
            if line.is_empty() {
                continue;
            }
            match parser.parse(line) {
                Some(record) => {
                    parsed += 1;
                    if !record.module.is_empty() {
                        if !record.submodule.is_empty() {
                            submodules
                                .insert((record.module.clone(), record.submodule.clone()));
                        }
                        modules.insert(record.module);
                    }
                }
                None => skipped += 1,
            }
        }
    }
    Ok((modules, submodules, parsed, skipped))
}

fn build_uniq_files(
    normal_path: &Path,
    chunk_lines: usize,
) -> Result<(PathBuf, PathBuf, u64, usize), PipelineError> {
    let (uniq_txt, uniq_tsv) = derive_uniq_paths(normal_path);

    let mut builder = UniqueSetBuilder::new();
    let mut reader = ChunkReader::open(normal_path, chunk_lines)?;
    while let Some(chunk) = reader.next_chunk()? {
        for line in &chunk {
            if line.is_empty() {
                continue;
            }
            builder.observe(&extract_key_text(line));
        }
    }

    let total = builder.total();
    let distinct = builder.distinct();
    let sorted = builder.into_sorted();

    let mut uniq_writer = BufWriter::new(File::create(&uniq_txt)?);
    let mut tsv_writer = BufWriter::new(File::create(&uniq_tsv)?);
    for (key, count) in &sorted {
        writeln!(uniq_writer, "{}", key)?;
        writeln!(tsv_writer, "{}\t{}", count, key)?;
    }
    uniq_writer.flush()?;
    tsv_writer.flush()?;

    Ok((uniq_txt, uniq_tsv, total, distinct))
}

fn read_unique_keys(uniq_txt: &Path, chunk_lines: usize) -> Result<Vec<String>, PipelineError> {
    let mut keys = Vec::new();
    let mut reader = ChunkReader::open(uniq_txt, chunk_lines)?;
    while let Some(chunk) = reader.next_chunk()? {
        for line in chunk {
            if !line.trim().is_empty() {
                keys.push(line);
            }
        }
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::SafetyAnalyzer;

    fn candidate(pattern: &str) -> CandidateTemplate {
        CandidateTemplate {
            pattern: pattern.to_string(),
            sample_log: "sample".to_string(),
            source: "stub".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_filter_unsafe_rejects_danger() {
        let analyzer = SafetyAnalyzer::new(Duration::from_millis(500));
        let out = filter_unsafe(
            vec![candidate("^fine$"), candidate("(a+)+$")],
            &analyzer,
            false,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].pattern, "^fine$");
    }

    #[test]
    fn test_filter_unsafe_strict_drops_warnings() {
        let analyzer = SafetyAnalyzer::new(Duration::from_millis(500));
        let warning = candidate("^a .*.* z$");
        assert_eq!(filter_unsafe(vec![warning.clone()], &analyzer, false).len(), 1);
        assert_eq!(filter_unsafe(vec![warning], &analyzer, true).len(), 0);
    }

    #[test]
    fn test_write_normal_file_counts() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.log");
        std::fs::write(
            &input,
            "[20250101_000000][0.1][I][1][MOD:m][SMOD:s] head\n  continuation\n\n[20250101_000001][0.2][I][1][MOD:m][SMOD:s] next\n",
        )
        .unwrap();

        let out = dir.path().join("in.normal.txt");
        let (total, kept) = write_normal_file(&input, &out, 100).unwrap();
        assert_eq!(total, 4);
        assert_eq!(kept, 2);

        let content = std::fs::read_to_string(&out).unwrap();
        assert_eq!(
            content,
            "[20250101_000000][0.1][I][1][MOD:m][SMOD:s] head continuation\n[20250101_000001][0.2][I][1][MOD:m][SMOD:s] next\n"
        );
    }

    #[test]
    fn test_build_uniq_files_counts_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let normal = dir.path().join("x.normal.txt");
        std::fs::write(
            &normal,
            "[20250101_000000][0.1][I][1][MOD:m][SMOD:s] b\n\
             [20250101_000001][0.1][I][1][MOD:m][SMOD:s] a\n\
             [20250101_000002][0.1][I][1][MOD:m][SMOD:s] b\n",
        )
        .unwrap();

        let (uniq_txt, uniq_tsv, total, distinct) = build_uniq_files(&normal, 100).unwrap();
        assert_eq!(total, 3);
        assert_eq!(distinct, 2);
        assert_eq!(std::fs::read_to_string(uniq_txt).unwrap(), "a\nb\n");
        assert_eq!(std::fs::read_to_string(uniq_tsv).unwrap(), "1\ta\n2\tb\n");
    }

    #[test]
    fn test_scan_modules_collects_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let normal = dir.path().join("y.normal.txt");
        std::fs::write(
            &normal,
            "[20250101_000000][0.1][I][1][MOD:gnss][SMOD:rtk] one\n\
             [20250101_000001][0.1][I][1][MOD:gnss][SMOD:log] two\n\
             not a record line\n",
        )
        .unwrap();

        let (modules, submodules, parsed, skipped) = scan_modules(&normal, 100).unwrap();
        assert_eq!(parsed, 2);
        assert_eq!(skipped, 1);
        assert_eq!(modules.len(), 1);
        assert!(submodules.contains(&("gnss".to_string(), "rtk".to_string())));
        assert!(submodules.contains(&("gnss".to_string(), "log".to_string())));
    }
}
