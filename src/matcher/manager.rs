use crate::catalog::{Catalog, CatalogError};
use crate::matcher::index::{CompiledIndex, IndexTemplate};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

/// Hot-swap holder for the active [`CompiledIndex`].
///
/// The swap is a single pointer store under the lock: a reader that obtained
/// its `Arc` before the swap keeps matching against its snapshot; readers
/// after the swap see the new index. The memo cache lives inside the index,
/// so a swap invalidates it by construction.
pub struct IndexManager {
    catalog: Arc<dyn Catalog>,
    active: RwLock<Arc<CompiledIndex>>,
    memo_capacity: usize,
}

impl IndexManager {
    pub fn new(catalog: Arc<dyn Catalog>, memo_capacity: usize) -> Self {
        let (empty, _) = CompiledIndex::build(&[], memo_capacity);
        Self {
            catalog,
            active: RwLock::new(Arc::new(empty)),
            memo_capacity,
        }
    }

    /// Build the first index from all active templates.
    pub async fn load_initial(&self) -> Result<(), IndexError> {
        let index = self.build_from_catalog().await?;
        info!(templates = index.len(), "initial index loaded");
        self.swap(index);
        Ok(())
    }

    /// Current index snapshot; callers must treat it as immutable.
    pub fn get_active(&self) -> Arc<CompiledIndex> {
        self.active.read().unwrap().clone()
    }

    /// Rebuild from the catalog and atomically swap; returns after the swap.
    pub async fn build_new_index_sync(&self) -> Result<(), IndexError> {
        let index = self.build_from_catalog().await?;
        info!(templates = index.len(), "index rebuilt");
        self.swap(index);
        Ok(())
    }

    /// Schedule a background rebuild; the swap happens on completion.
    pub fn build_new_index_async(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = manager.build_new_index_sync().await {
                warn!(error = %e, "background index rebuild failed");
            }
        });
    }

    async fn build_from_catalog(&self) -> Result<Arc<CompiledIndex>, IndexError> {
        let rows = self.catalog.fetch_active_templates().await?;
        let items: Vec<IndexTemplate> = rows
            .into_iter()
            .map(|r| IndexTemplate {
                template_id: r.template_id,
                pattern: r.pattern,
            })
            .collect();

        let (index, failed) = CompiledIndex::build(&items, self.memo_capacity);

        // Poisoned catalog recovery: a stored pattern that stopped compiling
        // is deactivated so the next rebuild does not trip over it again.
        for template_id in failed {
            match self.catalog.deactivate_template(template_id).await {
                Ok(changed) => {
                    warn!(template_id, changed, "deactivated uncompilable template");
                }
                Err(e) => {
                    warn!(template_id, error = %e, "failed to deactivate template");
                }
            }
        }

        Ok(Arc::new(index))
    }

    fn swap(&self, index: Arc<CompiledIndex>) {
        *self.active.write().unwrap() = index;
    }
}
