//! Work-order recording and billing lifecycle.

use crate::models::{
    BillingStage, LaborLine, MaterialLine, WorkOrder, WorkOrderDetails, WorkOrderFilter,
};
use crate::services::metrics::{record_error, TRANSITIONS_TOTAL};
use crate::services::store::Store;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Owns the billing state of work orders. Every state change goes through
/// here or through [`Lifecycle::link_to_document`]; there is no free-form
/// state setter.
#[derive(Clone)]
pub struct Lifecycle {
    store: Arc<dyn Store>,
}

impl Lifecycle {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Record a new, unbilled work order, copying the current employee rates
    /// and catalog prices into its lines unless explicit values are given.
    #[instrument(skip(self, details), fields(project_id = %project_id))]
    pub async fn record_work_order(
        &self,
        project_id: Uuid,
        details: WorkOrderDetails,
    ) -> Result<WorkOrder, AppError> {
        if self.store.get_project(project_id).await?.is_none() {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Project {} not found",
                project_id
            )));
        }

        let (labor, materials) = self.resolve_lines(&details).await?;
        let order = WorkOrder::new(
            project_id,
            details.date,
            normalize_note(details.note),
            labor,
            materials,
        );
        self.store.insert_work_order(&order).await?;

        info!(work_order_id = %order.work_order_id, date = %order.date, "Work order recorded");
        Ok(order)
    }

    /// Get a work order by ID.
    pub async fn get_work_order(&self, work_order_id: Uuid) -> Result<WorkOrder, AppError> {
        self.store
            .get_work_order(work_order_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Work order {} not found", work_order_id))
            })
    }

    /// Replace the date, note and lines of an order that is not yet linked to
    /// a document. The billing state is left alone.
    #[instrument(skip(self, details), fields(work_order_id = %work_order_id))]
    pub async fn update_work_order_details(
        &self,
        work_order_id: Uuid,
        details: WorkOrderDetails,
    ) -> Result<WorkOrder, AppError> {
        let mut order = self.get_work_order(work_order_id).await?;
        if let Some(document_id) = order.document_id() {
            return Err(AppError::ValidationError(anyhow::anyhow!(
                "Work order {} is billed on document {} and can no longer be edited",
                work_order_id,
                document_id
            )));
        }

        let (labor, materials) = self.resolve_lines(&details).await?;
        order.date = details.date;
        order.note = normalize_note(details.note);
        order.labor = labor;
        order.materials = materials;
        self.store.update_work_order_details(&order).await?;

        info!("Work order details updated");
        Ok(order)
    }

    /// Delete an unlinked work order together with its lines.
    #[instrument(skip(self))]
    pub async fn delete_work_order(&self, work_order_id: Uuid) -> Result<(), AppError> {
        let order = self.get_work_order(work_order_id).await?;
        if let Some(document_id) = order.document_id() {
            return Err(AppError::ValidationError(anyhow::anyhow!(
                "Work order {} is billed on document {} and cannot be deleted",
                work_order_id,
                document_id
            )));
        }

        if !self.store.delete_work_order(work_order_id).await? {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Work order {} not found",
                work_order_id
            )));
        }

        info!("Work order deleted");
        Ok(())
    }

    /// Move a work order one stage forward.
    ///
    /// Completed work cannot be advanced here: it becomes invoiced only when a
    /// billing document claims it. A paid order is returned unchanged.
    #[instrument(skip(self))]
    pub async fn advance(&self, work_order_id: Uuid) -> Result<WorkOrder, AppError> {
        let mut order = self.get_work_order(work_order_id).await?;
        let expected = order.billing_state();

        let changed = order.advance().inspect_err(|e| {
            record_error(e);
            warn!(stage = %order.stage(), error = %e, "Advance rejected");
        })?;
        if !changed {
            return Ok(order);
        }

        self.store
            .update_work_order_state(work_order_id, expected, order.billing_state())
            .await?;
        TRANSITIONS_TOTAL
            .with_label_values(&[order.stage().as_str(), "advance"])
            .inc();

        info!(stage = %order.stage(), "Work order advanced");
        Ok(order)
    }

    /// Link a completed work order to a billing document, marking it invoiced.
    /// Linking an order already on `document_id` is a no-op.
    #[instrument(skip(self))]
    pub async fn link_to_document(
        &self,
        work_order_id: Uuid,
        document_id: Uuid,
    ) -> Result<WorkOrder, AppError> {
        let order = self
            .store
            .link_work_order(work_order_id, document_id)
            .await?;

        TRANSITIONS_TOTAL
            .with_label_values(&[order.stage().as_str(), "link"])
            .inc();
        info!("Work order linked to document");
        Ok(order)
    }

    /// Reclassify a misfiled work order. Only moves within the same side of
    /// the document link are allowed, and a reason is mandatory.
    #[instrument(skip(self, reason))]
    pub async fn correct_state(
        &self,
        work_order_id: Uuid,
        target: BillingStage,
        reason: &str,
    ) -> Result<WorkOrder, AppError> {
        if reason.trim().is_empty() {
            return Err(AppError::ValidationError(anyhow::anyhow!(
                "A reason is required to correct the state of work order {}",
                work_order_id
            )));
        }

        let mut order = self.get_work_order(work_order_id).await?;
        let expected = order.billing_state();
        let from = order.stage();
        if !order.correct_stage(target)? {
            return Ok(order);
        }

        self.store
            .update_work_order_state(work_order_id, expected, order.billing_state())
            .await?;
        TRANSITIONS_TOTAL
            .with_label_values(&[target.as_str(), "correction"])
            .inc();

        warn!(
            from = %from,
            to = %target,
            reason = %reason.trim(),
            "Work order state corrected"
        );
        Ok(order)
    }

    /// Completed, unlinked work orders across all of a client's projects,
    /// oldest first.
    #[instrument(skip(self))]
    pub async fn list_billing_candidates(
        &self,
        client_id: Uuid,
    ) -> Result<Vec<WorkOrder>, AppError> {
        if self.store.get_client(client_id).await?.is_none() {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Client {} not found",
                client_id
            )));
        }

        let filter = WorkOrderFilter {
            client_id: Some(client_id),
            stage: Some(BillingStage::WorkCompleted),
            ..Default::default()
        };
        let orders = self.store.list_work_orders(&filter).await?;

        Ok(orders
            .into_iter()
            .filter(WorkOrder::is_eligible_for_billing)
            .collect())
    }

    async fn resolve_lines(
        &self,
        details: &WorkOrderDetails,
    ) -> Result<(Vec<LaborLine>, Vec<MaterialLine>), AppError> {
        let mut labor = Vec::with_capacity(details.labor.len());
        for entry in &details.labor {
            let employee = self
                .store
                .get_employee(entry.employee_id)
                .await?
                .ok_or_else(|| {
                    AppError::NotFound(anyhow::anyhow!(
                        "Employee {} not found",
                        entry.employee_id
                    ))
                })?;
            let hourly_rate = entry.hourly_rate.unwrap_or(employee.hourly_rate);
            labor.push(LaborLine::new(entry.employee_id, entry.hours, hourly_rate)?);
        }

        let mut materials = Vec::with_capacity(details.materials.len());
        for entry in &details.materials {
            let item = self
                .store
                .get_catalog_item(entry.item_id)
                .await?
                .ok_or_else(|| {
                    AppError::NotFound(anyhow::anyhow!(
                        "Catalog item {} not found",
                        entry.item_id
                    ))
                })?;
            let applied_price = entry.applied_price.unwrap_or(item.list_price);
            materials.push(MaterialLine::new(
                entry.item_id,
                entry.quantity,
                applied_price,
            )?);
        }

        Ok((labor, materials))
    }
}

fn normalize_note(note: Option<String>) -> Option<String> {
    note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
}
