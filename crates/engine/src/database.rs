//! Database handle
//!
//! A database owns what every context shares: the immutable model, the
//! in-memory store, the value generator cache and the default config.

use crate::config::ContextConfig;
use crate::context::Context;
use crate::pool::ContextPool;
use changetrack_core::{Model, Result};
use changetrack_storage::InMemoryStore;
use changetrack_tracking::{DiagnosticsLogger, TracingDiagnostics, ValueGeneratorCache};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Shared state behind every context
pub struct Database {
    model: Arc<Model>,
    store: Arc<InMemoryStore>,
    generators: Arc<ValueGeneratorCache>,
    diagnostics: Arc<dyn DiagnosticsLogger>,
    config: ContextConfig,
}

impl Database {
    /// Database over `model` with the default config
    pub fn new(model: Arc<Model>) -> Arc<Self> {
        Self::with_config(model, ContextConfig::default())
    }

    /// Database over `model` with `config` for every new context
    pub fn with_config(model: Arc<Model>, config: ContextConfig) -> Arc<Self> {
        Self::build(model, config, Arc::new(TracingDiagnostics))
    }

    /// Database whose contexts report to `diagnostics`
    pub fn with_diagnostics(
        model: Arc<Model>,
        config: ContextConfig,
        diagnostics: Arc<dyn DiagnosticsLogger>,
    ) -> Arc<Self> {
        Self::build(model, config, diagnostics)
    }

    /// Database configured from a `changetrack.toml` file
    pub fn open(model: Arc<Model>, config_path: &Path) -> Result<Arc<Self>> {
        ContextConfig::write_default_if_missing(config_path)?;
        let config = ContextConfig::from_file(config_path)?;
        Ok(Self::with_config(model, config))
    }

    fn build(
        model: Arc<Model>,
        config: ContextConfig,
        diagnostics: Arc<dyn DiagnosticsLogger>,
    ) -> Arc<Self> {
        info!(
            target: "changetrack::engine",
            entity_types = model.entity_types().len(),
            query_tracking = ?config.query_tracking,
            "Database created"
        );
        Arc::new(Self {
            model,
            store: Arc::new(InMemoryStore::new()),
            generators: Arc::new(ValueGeneratorCache::new()),
            diagnostics,
            config,
        })
    }

    /// Entity metadata
    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    /// The store commits are written to
    pub fn store(&self) -> &Arc<InMemoryStore> {
        &self.store
    }

    /// Value generators shared by every context
    pub fn generators(&self) -> &Arc<ValueGeneratorCache> {
        &self.generators
    }

    /// Diagnostics sink installed in new and returned contexts
    pub fn diagnostics(&self) -> &Arc<dyn DiagnosticsLogger> {
        &self.diagnostics
    }

    /// Config new contexts start from
    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// New context with the database's config
    pub fn context(self: &Arc<Self>) -> Context {
        Context::new(Arc::clone(self))
    }

    /// Pool keeping up to `max_retained` idle contexts
    pub fn pool(self: &Arc<Self>, max_retained: usize) -> ContextPool {
        ContextPool::new(Arc::clone(self), max_retained)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("entity_types", &self.model.entity_types().len())
            .field("store", &self.store)
            .field("config", &self.config)
            .finish()
    }
}
