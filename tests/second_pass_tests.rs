/// End-to-end second pass: replay a normalized file against a seeded catalog
/// and check unmatched capture plus run completion.
use logloom::catalog::{CandidateTemplate, Catalog, DuckDbCatalog};
use logloom::cli::second_pass::{self, SecondPassArgs};
use logloom::config::Config;
use std::path::Path;

fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.catalog.path = dir.join("catalog.duckdb");
    config
}

async fn seed_template(config: &Config, pattern: &str, sample: &str) {
    let catalog = DuckDbCatalog::new(&config.catalog.path).unwrap();
    catalog.init_schema().await.unwrap();
    catalog
        .write_templates(&[CandidateTemplate {
            pattern: pattern.to_string(),
            sample_log: sample.to_string(),
            semantic_info: "seeded".to_string(),
            advise: String::new(),
            source: "stub".to_string(),
        }])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_second_pass_aggregates_and_captures_unmatched() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    seed_template(&config, r"^ping \d+$", "ping 1").await;

    let normal = dir.path().join("drive.normal.txt");
    std::fs::write(
        &normal,
        "[20250929_183904][3499.9][I][7][MOD:net][SMOD:icmp] ping 1\n\
         [20250929_183905][3499.9][I][7][MOD:net][SMOD:icmp] ping 2\n\
         [20250929_183906][3499.9][E][8][MOD:net][SMOD:icmp] totally unknown failure\n\
         this line does not parse at all\n",
    )
    .unwrap();

    let args = SecondPassArgs {
        path: normal,
        file_id: Some("seeded-file-id".to_string()),
        chunk_lines: Some(100),
        micro_batch: Some(2),
        match_workers: Some(1),
    };
    second_pass::run(args, &config).await.unwrap();

    let catalog = DuckDbCatalog::new(&config.catalog.path).unwrap();
    let unmatched = catalog.get_recent_unmatched(10).await.unwrap();
    assert_eq!(unmatched, vec!["totally unknown failure"]);
}

#[tokio::test]
async fn test_second_pass_on_empty_catalog_reports_all_unmatched() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let normal = dir.path().join("x.normal.txt");
    std::fs::write(
        &normal,
        "[20250101_000000][0.1][I][1][MOD:m][SMOD:s] one\n\
         [20250101_000001][0.1][I][1][MOD:m][SMOD:s] two\n",
    )
    .unwrap();

    let args = SecondPassArgs {
        path: normal,
        file_id: None,
        chunk_lines: None,
        micro_batch: None,
        match_workers: None,
    };
    second_pass::run(args, &config).await.unwrap();

    let catalog = DuckDbCatalog::new(&config.catalog.path).unwrap();
    let unmatched = catalog.get_recent_unmatched(10).await.unwrap();
    assert_eq!(unmatched.len(), 2);
}
