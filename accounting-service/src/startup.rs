//! Application startup: store selection and service wiring.

use crate::config::AccountingConfig;
use crate::services::{
    init_metrics, Database, DocumentBuilder, Lifecycle, MasterData, MemoryStore, PaymentLedger,
    Reports, Store,
};
use service_core::error::AppError;
use std::sync::Arc;
use tracing::info;

/// The billing core wired over one store. Cheap to clone.
#[derive(Clone)]
pub struct Application {
    store: Arc<dyn Store>,
    master_data: MasterData,
    lifecycle: Lifecycle,
    documents: DocumentBuilder,
    ledger: PaymentLedger,
    reports: Reports,
}

impl Application {
    /// Connect to PostgreSQL, apply migrations and wire the services.
    pub async fn build(config: &AccountingConfig) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await?;
        db.run_migrations().await?;
        db.health_check().await?;

        info!(service_name = %config.service_name, "Application built on PostgreSQL");
        Ok(Self::with_store(Arc::new(db)))
    }

    /// Wire the services over a process-local store.
    pub fn in_memory() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    pub fn with_store(store: Arc<dyn Store>) -> Self {
        let lifecycle = Lifecycle::new(store.clone());
        Self {
            master_data: MasterData::new(store.clone()),
            documents: DocumentBuilder::new(store.clone(), lifecycle.clone()),
            ledger: PaymentLedger::new(store.clone()),
            reports: Reports::new(store.clone()),
            lifecycle,
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn master_data(&self) -> &MasterData {
        &self.master_data
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn documents(&self) -> &DocumentBuilder {
        &self.documents
    }

    pub fn ledger(&self) -> &PaymentLedger {
        &self.ledger
    }

    pub fn reports(&self) -> &Reports {
        &self.reports
    }
}
