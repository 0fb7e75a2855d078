//! Billing document creation and link reconciliation.

use crate::models::{
    BillingDocument, CreateDocument, DocumentLine, DocumentState, Project, WorkOrder,
};
use crate::services::costs::{round_money, CostBreakdown};
use crate::services::lifecycle::Lifecycle;
use crate::services::metrics::{
    record_error, DOCUMENTS_TOTAL, DOCUMENT_AMOUNT_TOTAL, PARTIAL_FAILURES_TOTAL,
};
use crate::services::store::Store;
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use service_core::error::AppError;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Outcome of a reconciliation pass over all documents.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconciliationReport {
    pub documents_checked: usize,
    /// Work orders linked during this pass, per document.
    pub linked: Vec<(Uuid, Vec<Uuid>)>,
    /// Documents that still have unlinked work orders, with the reason.
    pub failed: Vec<(Uuid, String)>,
}

impl ReconciliationReport {
    pub fn linked_count(&self) -> usize {
        self.linked.iter().map(|(_, ids)| ids.len()).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Turns completed work orders into billing documents.
///
/// Creation is a two-phase write. The document row, which carries the full
/// list of claimed work orders, is stored first; each order is then linked.
/// If linking stops halfway the caller gets [`AppError::PartialFailure`] and
/// [`DocumentBuilder::reconcile_document`] finishes the job from the stored
/// list.
#[derive(Clone)]
pub struct DocumentBuilder {
    store: Arc<dyn Store>,
    lifecycle: Lifecycle,
}

impl DocumentBuilder {
    pub fn new(store: Arc<dyn Store>, lifecycle: Lifecycle) -> Self {
        Self { store, lifecycle }
    }

    #[instrument(skip(self, input), fields(client_id = %input.client_id, number = %input.number))]
    pub async fn create_document(
        &self,
        input: CreateDocument,
    ) -> Result<BillingDocument, AppError> {
        let document = self.prepare(&input).await.inspect_err(|e| {
            record_error(e);
            warn!(error = %e, "Billing document rejected");
        })?;

        self.store.insert_document(&document).await?;
        DOCUMENTS_TOTAL
            .with_label_values(&[document.kind.as_str()])
            .inc();
        DOCUMENT_AMOUNT_TOTAL
            .with_label_values(&[document.kind.as_str()])
            .inc_by(document.total.to_f64().unwrap_or_default());

        self.link_all(&document).await?;

        info!(
            document_id = %document.document_id,
            kind = %document.kind.as_str(),
            subtotal = %document.subtotal,
            total = %document.total,
            work_orders = document.work_order_ids.len(),
            "Billing document created"
        );
        Ok(document)
    }

    /// Link every work order the document claims that is not linked yet.
    /// Safe to run repeatedly; returns the ids linked by this call.
    #[instrument(skip(self))]
    pub async fn reconcile_document(&self, document_id: Uuid) -> Result<Vec<Uuid>, AppError> {
        let document = self.get_document(document_id).await?;

        let mut pending = Vec::new();
        for &work_order_id in &document.work_order_ids {
            let order = self.lifecycle.get_work_order(work_order_id).await?;
            match order.document_id() {
                Some(linked) if linked == document_id => continue,
                Some(linked) => {
                    return Err(AppError::Conflict(anyhow::anyhow!(
                        "Work order {} belongs to document {}, not {}",
                        work_order_id,
                        linked,
                        document_id
                    )));
                }
                None => pending.push(work_order_id),
            }
        }

        for &work_order_id in &pending {
            self.lifecycle
                .link_to_document(work_order_id, document_id)
                .await?;
        }

        if !pending.is_empty() {
            info!(linked = pending.len(), "Billing document reconciled");
        }
        Ok(pending)
    }

    /// Reconcile every stored document, collecting failures instead of
    /// stopping at the first one.
    #[instrument(skip(self))]
    pub async fn reconcile_all(&self) -> Result<ReconciliationReport, AppError> {
        let mut report = ReconciliationReport::default();
        for document in self.store.list_documents(None).await? {
            report.documents_checked += 1;
            match self.reconcile_document(document.document_id).await {
                Ok(linked) if linked.is_empty() => {}
                Ok(linked) => report.linked.push((document.document_id, linked)),
                Err(e) => {
                    record_error(&e);
                    warn!(document_id = %document.document_id, error = %e, "Reconciliation failed");
                    report.failed.push((document.document_id, e.to_string()));
                }
            }
        }

        info!(
            documents = report.documents_checked,
            linked = report.linked_count(),
            failed = report.failed.len(),
            "Reconciliation pass finished"
        );
        Ok(report)
    }

    pub async fn get_document(&self, document_id: Uuid) -> Result<BillingDocument, AppError> {
        self.store.get_document(document_id).await?.ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Document {} not found", document_id))
        })
    }

    /// Documents newest first, optionally restricted to one client.
    pub async fn list_documents(
        &self,
        client_id: Option<Uuid>,
    ) -> Result<Vec<BillingDocument>, AppError> {
        self.store.list_documents(client_id).await
    }

    /// Validate the request and compute the document without writing anything.
    async fn prepare(&self, input: &CreateDocument) -> Result<BillingDocument, AppError> {
        let number = input.number.trim();
        if number.is_empty() {
            return Err(AppError::ValidationError(anyhow::anyhow!(
                "Document number must not be blank"
            )));
        }

        let discount_percent = input.discount_percent.unwrap_or(Decimal::ZERO);
        if discount_percent < Decimal::ZERO || discount_percent > HUNDRED {
            return Err(AppError::ValidationError(anyhow::anyhow!(
                "Discount must be between 0 and 100 percent, got {}",
                discount_percent
            )));
        }

        if input.work_order_ids.is_empty() {
            return Err(AppError::ValidationError(anyhow::anyhow!(
                "A billing document needs at least one work order"
            )));
        }

        let mut seen = HashSet::new();
        if let Some(duplicate) = input.work_order_ids.iter().find(|id| !seen.insert(**id)) {
            return Err(AppError::ValidationError(anyhow::anyhow!(
                "Work order {} is listed more than once",
                duplicate
            )));
        }

        if self.store.get_client(input.client_id).await?.is_none() {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Client {} not found",
                input.client_id
            )));
        }

        let mut projects: HashMap<Uuid, Project> = HashMap::new();
        let mut orders: Vec<WorkOrder> = Vec::with_capacity(input.work_order_ids.len());
        for &work_order_id in &input.work_order_ids {
            let order = self.lifecycle.get_work_order(work_order_id).await?;
            if !order.is_eligible_for_billing() {
                return Err(AppError::ValidationError(anyhow::anyhow!(
                    "Work order {} is not eligible for billing (stage '{}')",
                    work_order_id,
                    order.stage()
                )));
            }

            if !projects.contains_key(&order.project_id) {
                let project = self.store.get_project(order.project_id).await?.ok_or_else(|| {
                    AppError::NotFound(anyhow::anyhow!("Project {} not found", order.project_id))
                })?;
                projects.insert(order.project_id, project);
            }
            if projects
                .get(&order.project_id)
                .is_some_and(|p| p.client_id != input.client_id)
            {
                return Err(AppError::ValidationError(anyhow::anyhow!(
                    "Work order {} belongs to another client",
                    work_order_id
                )));
            }
            orders.push(order);
        }

        let mut lines = Vec::new();
        for order in &orders {
            let amount = CostBreakdown::for_work_order(order).total;
            if amount.is_zero() {
                continue;
            }
            let project_name = projects
                .get(&order.project_id)
                .map(|p| p.name.as_str())
                .unwrap_or_default();
            lines.push(DocumentLine {
                line_id: Uuid::new_v4(),
                description: line_description(order, project_name),
                quantity: Decimal::ONE,
                unit_price: amount,
                line_total: amount,
                work_order_id: Some(order.work_order_id),
                sort_order: lines.len() as i32,
            });
        }

        let subtotal: Decimal = lines.iter().map(|l| l.line_total).sum();
        let discount_amount = subtotal * discount_percent / HUNDRED;
        let total = round_money(subtotal - discount_amount);

        Ok(BillingDocument {
            document_id: Uuid::new_v4(),
            client_id: input.client_id,
            number: number.to_string(),
            kind: input.kind,
            issue_date: input.issue_date,
            subtotal,
            discount_percent,
            discount_amount,
            total,
            note: input
                .note
                .as_ref()
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            state: DocumentState::Created,
            lines,
            work_order_ids: input.work_order_ids.clone(),
            created_utc: Utc::now(),
        })
    }

    /// Second phase of creation: link each claimed work order.
    async fn link_all(&self, document: &BillingDocument) -> Result<(), AppError> {
        for (index, &work_order_id) in document.work_order_ids.iter().enumerate() {
            if let Err(source) = self
                .lifecycle
                .link_to_document(work_order_id, document.document_id)
                .await
            {
                let unlinked = document.work_order_ids[index..].to_vec();
                PARTIAL_FAILURES_TOTAL.inc();
                warn!(
                    document_id = %document.document_id,
                    unlinked = unlinked.len(),
                    error = %source,
                    "Billing document stored but work orders left unlinked"
                );
                let err = AppError::PartialFailure {
                    document_id: document.document_id,
                    unlinked,
                    source: source.into(),
                };
                record_error(&err);
                return Err(err);
            }
        }
        Ok(())
    }
}

fn line_description(order: &WorkOrder, project_name: &str) -> String {
    format!(
        "Lavori del {} presso {}",
        order.date.format("%d/%m/%Y"),
        project_name
    )
}
