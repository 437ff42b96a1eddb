/// End-to-end first pass: raw file -> normal/uniq artifacts -> matching ->
/// diversity buffer -> stub committee firing -> catalog growth.
use logloom::catalog::{Catalog, DuckDbCatalog};
use logloom::cli::first_pass::{self, FirstPassArgs};
use logloom::config::Config;
use std::path::{Path, PathBuf};

fn write_input_log(dir: &Path) -> PathBuf {
    let path = dir.join("drive.log");
    let mut lines = Vec::new();
    // Eight distinct key-texts of one family, plus ANSI noise and a
    // continuation fragment to exercise sanitize + fold.
    for i in 1..=8 {
        lines.push(format!(
            "[20250929_18390{}][3499.9{}][I][40433][MOD:vgnss][SMOD:log][ INFO ] alpha event {}",
            i % 10,
            i,
            i
        ));
    }
    lines.push("\x1b[31m[20250929_183910][3500.1][W][40433][MOD:vgnss][SMOD:log] colored warning 5\x1b[0m".to_string());
    lines.push("  trailing continuation".to_string());
    std::fs::write(&path, lines.join("\n") + "\n").unwrap();
    path
}

fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.catalog.path = dir.join("catalog.duckdb");
    config
}

#[tokio::test]
async fn test_first_pass_learns_templates_and_writes_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input_log(dir.path());
    let config = test_config(dir.path());

    let args = FirstPassArgs {
        path: input.clone(),
        normal_out: None,
        size_threshold: Some(3),
        max_per_micro_batch: Some(10),
        chunk_lines: Some(4),
        micro_batch: Some(2),
        match_workers: Some(1),
        force_flush: true,
    };
    first_pass::run(args, &config).await.unwrap();

    // Normal file: sanitized, one folded record per line.
    let normal = dir.path().join("drive.normal.txt");
    let normal_text = std::fs::read_to_string(&normal).unwrap();
    assert!(!normal_text.contains('\x1b'));
    assert!(normal_text.contains("colored warning 5 trailing continuation"));
    assert_eq!(normal_text.lines().count(), 9);

    // Uniq artifacts: sorted distinct key-texts with counts.
    let uniq = std::fs::read_to_string(dir.path().join("drive.normal_uniq.txt")).unwrap();
    let uniq_lines: Vec<&str> = uniq.lines().collect();
    assert_eq!(uniq_lines.len(), 9);
    let mut sorted = uniq_lines.clone();
    sorted.sort_unstable();
    assert_eq!(uniq_lines, sorted);
    assert!(uniq_lines.contains(&"alpha event 1"));

    let tsv = std::fs::read_to_string(dir.path().join("drive.normal_uniq_with_count.tsv")).unwrap();
    let total: u64 = tsv
        .lines()
        .map(|l| l.split('\t').next().unwrap().parse::<u64>().unwrap())
        .sum();
    assert_eq!(total, 9);

    // The stub committee fired and the generalized template landed.
    let catalog = DuckDbCatalog::new(&config.catalog.path).unwrap();
    let templates = catalog.fetch_active_templates().await.unwrap();
    assert!(!templates.is_empty());
    assert!(templates
        .iter()
        .any(|t| t.pattern_nomal.contains("alpha event")));
}

#[tokio::test]
async fn test_first_pass_rerun_matches_learned_templates() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input_log(dir.path());
    let config = test_config(dir.path());

    let args = FirstPassArgs {
        path: input.clone(),
        normal_out: None,
        size_threshold: Some(3),
        max_per_micro_batch: Some(10),
        chunk_lines: Some(100),
        micro_batch: Some(2),
        match_workers: Some(1),
        force_flush: true,
    };
    first_pass::run(args.clone(), &config).await.unwrap();

    let catalog = DuckDbCatalog::new(&config.catalog.path).unwrap();
    let before = catalog.fetch_active_templates().await.unwrap().len();
    assert!(before >= 1);
    drop(catalog);

    // A second run over the same file matches against the learned catalog;
    // identical pattern_nomal values do not duplicate.
    first_pass::run(args, &config).await.unwrap();
    let catalog = DuckDbCatalog::new(&config.catalog.path).unwrap();
    let after = catalog.fetch_active_templates().await.unwrap();
    let mut nomals: Vec<&str> = after.iter().map(|t| t.pattern_nomal.as_str()).collect();
    let total = nomals.len();
    nomals.sort_unstable();
    nomals.dedup();
    assert_eq!(nomals.len(), total, "no duplicate pattern_nomal rows");
}

#[tokio::test]
async fn test_first_pass_missing_input_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let args = FirstPassArgs {
        path: dir.path().join("missing.log"),
        normal_out: None,
        size_threshold: None,
        max_per_micro_batch: None,
        chunk_lines: None,
        micro_batch: None,
        match_workers: None,
        force_flush: false,
    };
    assert!(first_pass::run(args, &config).await.is_err());
}
