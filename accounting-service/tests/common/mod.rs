//! Common test utilities for accounting-service integration tests.
#![allow(dead_code)]

use accounting_service::models::{
    BillingDocument, BillingMode, BillingState, CatalogItem, CatalogKind, Client, ClientKind,
    CreateCatalogItem, CreateClient, CreateDocument, CreateEmployee, CreateProject, DocumentKind,
    Employee, LaborEntry, MaterialEntry, Payment, Project, Unit, WorkOrder, WorkOrderDetails,
    WorkOrderFilter,
};
use accounting_service::services::{MemoryStore, Store};
use accounting_service::startup::Application;
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, Once};
use uuid::Uuid;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,accounting_service=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// An application over a fresh in-memory store.
pub fn spawn_app() -> Application {
    init_tracing();
    Application::in_memory()
}

/// An application whose store refuses to link the given work orders until
/// healed.
pub fn spawn_flaky_app() -> (Application, Arc<FlakyStore>) {
    init_tracing();
    let store = Arc::new(FlakyStore::new());
    let app = Application::with_store(store.clone());
    (app, store)
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub async fn create_client(app: &Application, name: &str) -> Client {
    app.master_data()
        .create_client(CreateClient::named(name, ClientKind::Individual))
        .await
        .expect("Failed to create client")
}

pub async fn create_project(
    app: &Application,
    client_id: Uuid,
    name: &str,
    billing_mode: BillingMode,
    quoted_amount: Option<Decimal>,
) -> Project {
    app.master_data()
        .create_project(CreateProject {
            client_id,
            name: name.to_string(),
            billing_mode,
            quoted_amount,
            description: None,
            site_address: None,
            start_date: None,
            expected_end_date: None,
        })
        .await
        .expect("Failed to create project")
}

pub async fn create_employee(app: &Application, last_name: &str, hourly_rate: Decimal) -> Employee {
    app.master_data()
        .create_employee(CreateEmployee {
            first_name: "Marco".to_string(),
            last_name: last_name.to_string(),
            phone: None,
            hourly_rate,
        })
        .await
        .expect("Failed to create employee")
}

pub async fn create_material(app: &Application, name: &str, list_price: Decimal) -> CatalogItem {
    app.master_data()
        .create_catalog_item(CreateCatalogItem {
            name: name.to_string(),
            kind: CatalogKind::Material,
            unit: Unit::Piece,
            list_price,
            notes: None,
        })
        .await
        .expect("Failed to create catalog item")
}

/// Client, time-and-materials project and one employee.
pub struct Fixture {
    pub app: Application,
    pub client: Client,
    pub project: Project,
    pub employee: Employee,
}

pub async fn seed(app: Application, client_name: &str) -> Fixture {
    let client = create_client(&app, client_name).await;
    let project = create_project(
        &app,
        client.client_id,
        &format!("Giardino {}", client_name),
        BillingMode::TimeAndMaterials,
        None,
    )
    .await;
    let employee = create_employee(&app, "Bianchi", Decimal::from(25)).await;
    Fixture {
        app,
        client,
        project,
        employee,
    }
}

impl Fixture {
    /// Record an unbilled order worth exactly `amount` (one hour at that rate).
    pub async fn record(&self, project_id: Uuid, on: NaiveDate, amount: Decimal) -> WorkOrder {
        self.app
            .lifecycle()
            .record_work_order(
                project_id,
                WorkOrderDetails {
                    date: on,
                    note: None,
                    labor: vec![LaborEntry {
                        employee_id: self.employee.employee_id,
                        hours: Decimal::ONE,
                        hourly_rate: Some(amount),
                    }],
                    materials: Vec::<MaterialEntry>::new(),
                },
            )
            .await
            .expect("Failed to record work order")
    }

    /// Record an order worth `amount` and mark it completed.
    pub async fn completed(&self, on: NaiveDate, amount: Decimal) -> WorkOrder {
        let order = self.record(self.project.project_id, on, amount).await;
        self.app
            .lifecycle()
            .advance(order.work_order_id)
            .await
            .expect("Failed to complete work order")
    }

    pub fn document_request(&self, work_order_ids: Vec<Uuid>) -> CreateDocument {
        CreateDocument {
            client_id: self.client.client_id,
            work_order_ids,
            discount_percent: None,
            number: "2025/001".to_string(),
            kind: DocumentKind::Invoice,
            issue_date: date(2025, 6, 30),
            note: None,
        }
    }

    /// Bill the given orders with the given discount.
    pub async fn bill(&self, work_order_ids: Vec<Uuid>, discount: Decimal) -> BillingDocument {
        let mut request = self.document_request(work_order_ids);
        request.discount_percent = Some(discount);
        self.app
            .documents()
            .create_document(request)
            .await
            .expect("Failed to create document")
    }
}

/// [`MemoryStore`] wrapper that fails `link_work_order` for chosen work orders.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failing: Mutex<HashSet<Uuid>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_links_for(&self, work_order_id: Uuid) {
        self.failing.lock().unwrap().insert(work_order_id);
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn insert_client(&self, input: &CreateClient) -> Result<Client, AppError> {
        self.inner.insert_client(input).await
    }

    async fn get_client(&self, client_id: Uuid) -> Result<Option<Client>, AppError> {
        self.inner.get_client(client_id).await
    }

    async fn list_clients(&self, active_only: bool) -> Result<Vec<Client>, AppError> {
        self.inner.list_clients(active_only).await
    }

    async fn deactivate_client(&self, client_id: Uuid) -> Result<Option<Client>, AppError> {
        self.inner.deactivate_client(client_id).await
    }

    async fn insert_project(&self, input: &CreateProject) -> Result<Project, AppError> {
        self.inner.insert_project(input).await
    }

    async fn get_project(&self, project_id: Uuid) -> Result<Option<Project>, AppError> {
        self.inner.get_project(project_id).await
    }

    async fn list_projects(&self, client_id: Uuid) -> Result<Vec<Project>, AppError> {
        self.inner.list_projects(client_id).await
    }

    async fn insert_employee(&self, input: &CreateEmployee) -> Result<Employee, AppError> {
        self.inner.insert_employee(input).await
    }

    async fn get_employee(&self, employee_id: Uuid) -> Result<Option<Employee>, AppError> {
        self.inner.get_employee(employee_id).await
    }

    async fn update_employee_rate(
        &self,
        employee_id: Uuid,
        hourly_rate: Decimal,
    ) -> Result<Option<Employee>, AppError> {
        self.inner.update_employee_rate(employee_id, hourly_rate).await
    }

    async fn insert_catalog_item(
        &self,
        input: &CreateCatalogItem,
    ) -> Result<CatalogItem, AppError> {
        self.inner.insert_catalog_item(input).await
    }

    async fn get_catalog_item(&self, item_id: Uuid) -> Result<Option<CatalogItem>, AppError> {
        self.inner.get_catalog_item(item_id).await
    }

    async fn insert_work_order(&self, order: &WorkOrder) -> Result<(), AppError> {
        self.inner.insert_work_order(order).await
    }

    async fn get_work_order(&self, work_order_id: Uuid) -> Result<Option<WorkOrder>, AppError> {
        self.inner.get_work_order(work_order_id).await
    }

    async fn list_work_orders(
        &self,
        filter: &WorkOrderFilter,
    ) -> Result<Vec<WorkOrder>, AppError> {
        self.inner.list_work_orders(filter).await
    }

    async fn update_work_order_details(&self, order: &WorkOrder) -> Result<(), AppError> {
        self.inner.update_work_order_details(order).await
    }

    async fn update_work_order_state(
        &self,
        work_order_id: Uuid,
        expected: BillingState,
        next: BillingState,
    ) -> Result<(), AppError> {
        self.inner
            .update_work_order_state(work_order_id, expected, next)
            .await
    }

    async fn link_work_order(
        &self,
        work_order_id: Uuid,
        document_id: Uuid,
    ) -> Result<WorkOrder, AppError> {
        let failing = self.failing.lock().unwrap().contains(&work_order_id);
        if failing {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "connection reset while linking {}",
                work_order_id
            )));
        }
        self.inner.link_work_order(work_order_id, document_id).await
    }

    async fn delete_work_order(&self, work_order_id: Uuid) -> Result<bool, AppError> {
        self.inner.delete_work_order(work_order_id).await
    }

    async fn insert_document(&self, document: &BillingDocument) -> Result<(), AppError> {
        self.inner.insert_document(document).await
    }

    async fn get_document(&self, document_id: Uuid) -> Result<Option<BillingDocument>, AppError> {
        self.inner.get_document(document_id).await
    }

    async fn list_documents(
        &self,
        client_id: Option<Uuid>,
    ) -> Result<Vec<BillingDocument>, AppError> {
        self.inner.list_documents(client_id).await
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<(), AppError> {
        self.inner.insert_payment(payment).await
    }

    async fn list_payments(&self, document_id: Uuid) -> Result<Vec<Payment>, AppError> {
        self.inner.list_payments(document_id).await
    }
}
