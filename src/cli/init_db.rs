use crate::catalog::{resolve_catalog_path, Catalog, DuckDbCatalog};
use crate::cli::PipelineError;
use crate::config::Config;
use std::path::PathBuf;

/// Create the catalog file (and parent directories) and apply the schema.
/// Safe to run repeatedly.
pub async fn run(db: Option<PathBuf>, config: &Config) -> Result<(), PipelineError> {
    let path = match db {
        Some(path) => path,
        None => resolve_catalog_path(&config.catalog.path),
    };

    let catalog = DuckDbCatalog::new(&path)?;
    catalog.init_schema().await?;

    println!("[OK] catalog initialized: {}", path.display());
    Ok(())
}
