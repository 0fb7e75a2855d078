//! Operator entry point: finishes interrupted billing-document writes.
//!
//! Runs one reconciliation pass over every stored document, linking any work
//! order a document claims but that was left unlinked, then exits.

use accounting_service::config::AccountingConfig;
use accounting_service::services::get_metrics;
use accounting_service::startup::Application;
use service_core::observability::init_tracing;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let config = AccountingConfig::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    init_tracing(
        &config.service_name,
        config.log_level(),
        config.otlp_endpoint(),
    )
    .map_err(|e| std::io::Error::other(format!("Tracing setup error: {}", e)))?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        db_max_connections = %config.database.max_connections,
        db_min_connections = %config.database.min_connections,
        "Starting accounting-service reconciliation"
    );

    let app = Application::build(&config).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to build application");
        std::io::Error::other(format!("Application build error: {}", e))
    })?;

    let report = app.documents().reconcile_all().await.map_err(|e| {
        tracing::error!(error = %e, "Reconciliation pass failed");
        std::io::Error::other(format!("Reconciliation error: {}", e))
    })?;

    tracing::info!(metrics = %get_metrics(), "Reconciliation metrics");

    for (document_id, failure) in &report.failed {
        tracing::error!(document_id = %document_id, error = %failure, "Document still has unlinked work orders");
    }

    if report.is_clean() {
        tracing::info!(
            documents = report.documents_checked,
            linked = report.linked_count(),
            "Reconciliation complete"
        );
        Ok(())
    } else {
        Err(std::io::Error::other(format!(
            "{} document(s) could not be reconciled",
            report.failed.len()
        )))
    }
}
