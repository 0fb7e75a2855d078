//! Process-local store backed by hash maps.

use crate::models::{
    BillingDocument, BillingState, CatalogItem, Client, CreateCatalogItem, CreateClient, CreateEmployee,
    CreateProject, Employee, Payment, Project, WorkOrder, WorkOrderFilter,
};
use crate::services::store::Store;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    clients: HashMap<Uuid, Client>,
    projects: HashMap<Uuid, Project>,
    employees: HashMap<Uuid, Employee>,
    catalog: HashMap<Uuid, CatalogItem>,
    work_orders: HashMap<Uuid, WorkOrder>,
    documents: HashMap<Uuid, BillingDocument>,
    payments: HashMap<Uuid, Payment>,
}

/// In-memory [`Store`]. Each operation holds the table lock for its whole
/// duration, so multi-field writes are atomic. Clones share the same tables.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn linked_order_error(order: &WorkOrder, action: &str) -> AppError {
    AppError::ValidationError(anyhow::anyhow!(
        "Cannot {} work order {}: it is linked to document {}",
        action,
        order.work_order_id,
        order.document_id().unwrap_or_default()
    ))
}

#[async_trait]
impl Store for MemoryStore {
    #[instrument(skip(self, input))]
    async fn insert_client(&self, input: &CreateClient) -> Result<Client, AppError> {
        let client = Client {
            client_id: Uuid::new_v4(),
            name: input.name.clone(),
            kind: input.kind,
            contact_person: input.contact_person.clone(),
            phone: input.phone.clone(),
            email: input.email.clone(),
            address: input.address.clone(),
            city: input.city.clone(),
            postal_code: input.postal_code.clone(),
            tax_code: input.tax_code.clone(),
            vat_number: input.vat_number.clone(),
            notes: input.notes.clone(),
            active: true,
            created_utc: Utc::now(),
        };

        self.tables
            .write()
            .await
            .clients
            .insert(client.client_id, client.clone());

        debug!(client_id = %client.client_id, "Client stored");
        Ok(client)
    }

    async fn get_client(&self, client_id: Uuid) -> Result<Option<Client>, AppError> {
        Ok(self.tables.read().await.clients.get(&client_id).cloned())
    }

    async fn list_clients(&self, active_only: bool) -> Result<Vec<Client>, AppError> {
        let tables = self.tables.read().await;
        let mut clients: Vec<Client> = tables
            .clients
            .values()
            .filter(|c| !active_only || c.active)
            .cloned()
            .collect();
        clients.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(clients)
    }

    async fn deactivate_client(&self, client_id: Uuid) -> Result<Option<Client>, AppError> {
        let mut tables = self.tables.write().await;
        Ok(tables.clients.get_mut(&client_id).map(|client| {
            client.active = false;
            client.clone()
        }))
    }

    #[instrument(skip(self, input), fields(client_id = %input.client_id))]
    async fn insert_project(&self, input: &CreateProject) -> Result<Project, AppError> {
        let mut tables = self.tables.write().await;
        if !tables.clients.contains_key(&input.client_id) {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Client {} not found",
                input.client_id
            )));
        }

        let project = Project {
            project_id: Uuid::new_v4(),
            client_id: input.client_id,
            name: input.name.clone(),
            billing_mode: input.billing_mode,
            quoted_amount: input.quoted_amount,
            description: input.description.clone(),
            site_address: input.site_address.clone(),
            start_date: input.start_date,
            expected_end_date: input.expected_end_date,
            active: true,
            created_utc: Utc::now(),
        };
        tables.projects.insert(project.project_id, project.clone());

        debug!(project_id = %project.project_id, "Project stored");
        Ok(project)
    }

    async fn get_project(&self, project_id: Uuid) -> Result<Option<Project>, AppError> {
        Ok(self.tables.read().await.projects.get(&project_id).cloned())
    }

    async fn list_projects(&self, client_id: Uuid) -> Result<Vec<Project>, AppError> {
        let tables = self.tables.read().await;
        let mut projects: Vec<Project> = tables
            .projects
            .values()
            .filter(|p| p.client_id == client_id)
            .cloned()
            .collect();
        projects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(projects)
    }

    async fn insert_employee(&self, input: &CreateEmployee) -> Result<Employee, AppError> {
        let employee = Employee {
            employee_id: Uuid::new_v4(),
            first_name: input.first_name.clone(),
            last_name: input.last_name.clone(),
            phone: input.phone.clone(),
            hourly_rate: input.hourly_rate,
            active: true,
            created_utc: Utc::now(),
        };

        self.tables
            .write()
            .await
            .employees
            .insert(employee.employee_id, employee.clone());
        Ok(employee)
    }

    async fn get_employee(&self, employee_id: Uuid) -> Result<Option<Employee>, AppError> {
        Ok(self.tables.read().await.employees.get(&employee_id).cloned())
    }

    async fn update_employee_rate(
        &self,
        employee_id: Uuid,
        hourly_rate: Decimal,
    ) -> Result<Option<Employee>, AppError> {
        let mut tables = self.tables.write().await;
        Ok(tables.employees.get_mut(&employee_id).map(|employee| {
            employee.hourly_rate = hourly_rate;
            employee.clone()
        }))
    }

    async fn insert_catalog_item(
        &self,
        input: &CreateCatalogItem,
    ) -> Result<CatalogItem, AppError> {
        let item = CatalogItem {
            item_id: Uuid::new_v4(),
            name: input.name.clone(),
            kind: input.kind,
            unit: input.unit,
            list_price: input.list_price,
            notes: input.notes.clone(),
            active: true,
            created_utc: Utc::now(),
        };

        self.tables
            .write()
            .await
            .catalog
            .insert(item.item_id, item.clone());
        Ok(item)
    }

    async fn get_catalog_item(&self, item_id: Uuid) -> Result<Option<CatalogItem>, AppError> {
        Ok(self.tables.read().await.catalog.get(&item_id).cloned())
    }

    #[instrument(skip(self, order), fields(work_order_id = %order.work_order_id))]
    async fn insert_work_order(&self, order: &WorkOrder) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        if !tables.projects.contains_key(&order.project_id) {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Project {} not found",
                order.project_id
            )));
        }
        if tables.work_orders.contains_key(&order.work_order_id) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Work order {} already exists",
                order.work_order_id
            )));
        }

        tables
            .work_orders
            .insert(order.work_order_id, order.clone());
        Ok(())
    }

    async fn get_work_order(&self, work_order_id: Uuid) -> Result<Option<WorkOrder>, AppError> {
        Ok(self
            .tables
            .read()
            .await
            .work_orders
            .get(&work_order_id)
            .cloned())
    }

    async fn list_work_orders(
        &self,
        filter: &WorkOrderFilter,
    ) -> Result<Vec<WorkOrder>, AppError> {
        let tables = self.tables.read().await;
        let mut orders: Vec<WorkOrder> = tables
            .work_orders
            .values()
            .filter(|o| filter.project_id.is_none_or(|id| o.project_id == id))
            .filter(|o| filter.stage.is_none_or(|stage| o.stage() == stage))
            .filter(|o| {
                filter.client_id.is_none_or(|client_id| {
                    tables
                        .projects
                        .get(&o.project_id)
                        .is_some_and(|p| p.client_id == client_id)
                })
            })
            .cloned()
            .collect();
        orders.sort_by(|a, b| {
            a.date
                .cmp(&b.date)
                .then_with(|| a.created_utc.cmp(&b.created_utc))
        });
        Ok(orders)
    }

    async fn update_work_order_details(&self, order: &WorkOrder) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .work_orders
            .get_mut(&order.work_order_id)
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!(
                    "Work order {} not found",
                    order.work_order_id
                ))
            })?;
        if stored.document_id().is_some() {
            return Err(linked_order_error(stored, "edit"));
        }

        stored.date = order.date;
        stored.note = order.note.clone();
        stored.labor = order.labor.clone();
        stored.materials = order.materials.clone();
        Ok(())
    }

    async fn update_work_order_state(
        &self,
        work_order_id: Uuid,
        expected: BillingState,
        next: BillingState,
    ) -> Result<(), AppError> {
        expected.ensure_same_link(&next)?;

        let mut tables = self.tables.write().await;
        let stored = tables.work_orders.get_mut(&work_order_id).ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Work order {} not found", work_order_id))
        })?;
        if stored.billing_state() != expected {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Work order {} is '{}', expected '{}'",
                work_order_id,
                stored.stage(),
                expected.stage()
            )));
        }

        *stored = WorkOrder::rehydrate(
            stored.work_order_id,
            stored.project_id,
            stored.date,
            stored.note.clone(),
            next,
            stored.labor.clone(),
            stored.materials.clone(),
            stored.created_utc,
        );
        Ok(())
    }

    #[instrument(skip(self))]
    async fn link_work_order(
        &self,
        work_order_id: Uuid,
        document_id: Uuid,
    ) -> Result<WorkOrder, AppError> {
        let mut tables = self.tables.write().await;
        if !tables.documents.contains_key(&document_id) {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Document {} not found",
                document_id
            )));
        }
        let stored = tables.work_orders.get_mut(&work_order_id).ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Work order {} not found", work_order_id))
        })?;

        stored.link_to_document(document_id)?;
        Ok(stored.clone())
    }

    async fn delete_work_order(&self, work_order_id: Uuid) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        match tables.work_orders.get(&work_order_id) {
            Some(order) if order.document_id().is_some() => {
                Err(linked_order_error(order, "delete"))
            }
            Some(_) => Ok(tables.work_orders.remove(&work_order_id).is_some()),
            None => Ok(false),
        }
    }

    #[instrument(skip(self, document), fields(document_id = %document.document_id))]
    async fn insert_document(&self, document: &BillingDocument) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        if tables.documents.contains_key(&document.document_id) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Document {} already exists",
                document.document_id
            )));
        }

        tables
            .documents
            .insert(document.document_id, document.clone());
        Ok(())
    }

    async fn get_document(&self, document_id: Uuid) -> Result<Option<BillingDocument>, AppError> {
        Ok(self.tables.read().await.documents.get(&document_id).cloned())
    }

    async fn list_documents(
        &self,
        client_id: Option<Uuid>,
    ) -> Result<Vec<BillingDocument>, AppError> {
        let tables = self.tables.read().await;
        let mut documents: Vec<BillingDocument> = tables
            .documents
            .values()
            .filter(|d| client_id.is_none_or(|id| d.client_id == id))
            .cloned()
            .collect();
        documents.sort_by(|a, b| b.created_utc.cmp(&a.created_utc));
        Ok(documents)
    }

    #[instrument(skip(self, payment), fields(document_id = %payment.document_id))]
    async fn insert_payment(&self, payment: &Payment) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        if !tables.documents.contains_key(&payment.document_id) {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Document {} not found",
                payment.document_id
            )));
        }

        tables.payments.insert(payment.payment_id, payment.clone());
        Ok(())
    }

    async fn list_payments(&self, document_id: Uuid) -> Result<Vec<Payment>, AppError> {
        let tables = self.tables.read().await;
        let mut payments: Vec<Payment> = tables
            .payments
            .values()
            .filter(|p| p.document_id == document_id)
            .cloned()
            .collect();
        payments.sort_by(|a, b| {
            b.date
                .cmp(&a.date)
                .then_with(|| b.created_utc.cmp(&a.created_utc))
        });
        Ok(payments)
    }
}
