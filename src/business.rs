use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;

use crate::catalog::ServiceCatalog;
use crate::engine::{Engine, EngineError};
use crate::limits::*;
use crate::maintenance;
use crate::notify::NotifyHub;

/// Manages per-business engines. Each business gets its own Engine + journal
/// + background compactor; schedules never leak across businesses.
pub struct BusinessManager {
    engines: DashMap<String, Arc<Engine>>,
    data_dir: PathBuf,
    compact_threshold: u64,
}

impl BusinessManager {
    pub fn new(data_dir: PathBuf, compact_threshold: u64) -> Self {
        Self {
            engines: DashMap::new(),
            data_dir,
            compact_threshold,
        }
    }

    /// Get or lazily create an engine for the given business, resolving
    /// services through the supplied catalog.
    pub fn get_or_create(
        &self,
        business: &str,
        catalog: Arc<dyn ServiceCatalog>,
    ) -> std::io::Result<Arc<Engine>> {
        if let Some(engine) = self.engines.get(business) {
            return Ok(engine.value().clone());
        }
        if business.len() > MAX_BUSINESS_NAME_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "business name too long",
            ));
        }
        if self.engines.len() >= MAX_BUSINESSES {
            return Err(std::io::Error::other("too many businesses"));
        }

        // Sanitize business name to prevent path traversal
        let safe_name: String = business
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        if safe_name.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty business name",
            ));
        }

        let journal_path = self.data_dir.join(format!("{safe_name}.journal"));
        let notify = Arc::new(NotifyHub::new());
        let engine = Arc::new(Engine::new(journal_path, catalog, notify)?);

        let compactor_engine = engine.clone();
        let threshold = self.compact_threshold;
        tokio::spawn(async move {
            maintenance::run_compactor(compactor_engine, threshold).await;
        });

        self.engines.insert(business.to_string(), engine.clone());
        metrics::gauge!(crate::observability::BUSINESSES_ACTIVE).set(self.engines.len() as f64);
        Ok(engine)
    }

    /// Look up an already-opened business. Booking against a business that
    /// was never configured is a setup problem, surfaced distinctly from any
    /// scheduling failure.
    pub fn get(&self, business: &str) -> Result<Arc<Engine>, EngineError> {
        self.engines
            .get(business)
            .map(|e| e.value().clone())
            .ok_or_else(|| EngineError::BusinessNotConfigured(business.to_string()))
    }
}
