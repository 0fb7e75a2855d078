//! Persistence collaborator used by the billing core.

use crate::models::{
    BillingDocument, BillingState, CatalogItem, Client, CreateCatalogItem, CreateClient, CreateEmployee,
    CreateProject, Employee, Payment, Project, WorkOrder, WorkOrderFilter,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use service_core::error::AppError;
use uuid::Uuid;

/// Keyed CRUD over every entity the billing core reads or writes.
///
/// Implementations resolve relational joins themselves: a work order comes
/// back with its labor and material lines, a document with its lines and
/// linked work-order ids. Lookups return `Ok(None)` for unknown ids and leave
/// the `NotFound` decision to the caller.
#[async_trait]
pub trait Store: Send + Sync {
    // Clients
    async fn insert_client(&self, input: &CreateClient) -> Result<Client, AppError>;
    async fn get_client(&self, client_id: Uuid) -> Result<Option<Client>, AppError>;
    /// Clients ordered by name.
    async fn list_clients(&self, active_only: bool) -> Result<Vec<Client>, AppError>;
    async fn deactivate_client(&self, client_id: Uuid) -> Result<Option<Client>, AppError>;

    // Projects
    async fn insert_project(&self, input: &CreateProject) -> Result<Project, AppError>;
    async fn get_project(&self, project_id: Uuid) -> Result<Option<Project>, AppError>;
    /// Projects of one client ordered by name.
    async fn list_projects(&self, client_id: Uuid) -> Result<Vec<Project>, AppError>;

    // Employees
    async fn insert_employee(&self, input: &CreateEmployee) -> Result<Employee, AppError>;
    async fn get_employee(&self, employee_id: Uuid) -> Result<Option<Employee>, AppError>;
    async fn update_employee_rate(
        &self,
        employee_id: Uuid,
        hourly_rate: Decimal,
    ) -> Result<Option<Employee>, AppError>;

    // Catalog
    async fn insert_catalog_item(&self, input: &CreateCatalogItem)
        -> Result<CatalogItem, AppError>;
    async fn get_catalog_item(&self, item_id: Uuid) -> Result<Option<CatalogItem>, AppError>;

    // Work orders
    async fn insert_work_order(&self, order: &WorkOrder) -> Result<(), AppError>;
    async fn get_work_order(&self, work_order_id: Uuid) -> Result<Option<WorkOrder>, AppError>;
    /// Work orders matching the filter, oldest date first.
    async fn list_work_orders(&self, filter: &WorkOrderFilter)
        -> Result<Vec<WorkOrder>, AppError>;
    /// Replace date, note and owned lines. Rejected once the order is linked.
    async fn update_work_order_details(&self, order: &WorkOrder) -> Result<(), AppError>;
    /// Move an order from `expected` to `next`, failing with `Conflict` when
    /// the stored state is no longer `expected`. The document link must stay
    /// as it is; only [`Store::link_work_order`] sets it.
    async fn update_work_order_state(
        &self,
        work_order_id: Uuid,
        expected: BillingState,
        next: BillingState,
    ) -> Result<(), AppError>;
    /// Set the document link and the invoiced stage in a single write.
    /// Idempotent for an order already linked to `document_id`.
    async fn link_work_order(
        &self,
        work_order_id: Uuid,
        document_id: Uuid,
    ) -> Result<WorkOrder, AppError>;
    /// Delete an order and its lines. Rejected once the order is linked.
    async fn delete_work_order(&self, work_order_id: Uuid) -> Result<bool, AppError>;

    // Billing documents
    async fn insert_document(&self, document: &BillingDocument) -> Result<(), AppError>;
    async fn get_document(&self, document_id: Uuid) -> Result<Option<BillingDocument>, AppError>;
    /// Documents newest first, optionally for one client.
    async fn list_documents(
        &self,
        client_id: Option<Uuid>,
    ) -> Result<Vec<BillingDocument>, AppError>;

    // Payments
    async fn insert_payment(&self, payment: &Payment) -> Result<(), AppError>;
    /// Payments of one document, newest date first.
    async fn list_payments(&self, document_id: Uuid) -> Result<Vec<Payment>, AppError>;
}
