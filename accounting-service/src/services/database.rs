//! PostgreSQL store for accounting-service.

use crate::models::{
    BillingDocument, BillingStage, BillingState, CatalogItem, Client, CreateCatalogItem,
    CreateClient, CreateEmployee, CreateProject, DocumentKind, DocumentLine, DocumentState,
    Employee, LaborLine, MaterialLine, Payment, Project, WorkOrder, WorkOrderFilter,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::Store;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, Transaction};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const CLIENT_COLUMNS: &str = "client_id, name, kind, contact_person, phone, email, address, city, postal_code, tax_code, vat_number, notes, active, created_utc";
const PROJECT_COLUMNS: &str = "project_id, client_id, name, billing_mode, quoted_amount, description, site_address, start_date, expected_end_date, active, created_utc";
const EMPLOYEE_COLUMNS: &str =
    "employee_id, first_name, last_name, phone, hourly_rate, active, created_utc";
const CATALOG_COLUMNS: &str = "item_id, name, kind, unit, list_price, notes, active, created_utc";
const WORK_ORDER_COLUMNS: &str =
    "w.work_order_id, w.project_id, w.date, w.note, w.billing_stage, w.document_id, w.created_utc";
const DOCUMENT_COLUMNS: &str = "document_id, client_id, number, kind, issue_date, subtotal, discount_percent, discount_amount, total, note, state, created_utc";
const PAYMENT_COLUMNS: &str = "payment_id, document_id, amount, method, date, note, created_utc";

#[derive(FromRow)]
struct WorkOrderRow {
    work_order_id: Uuid,
    project_id: Uuid,
    date: NaiveDate,
    note: Option<String>,
    billing_stage: BillingStage,
    document_id: Option<Uuid>,
    created_utc: DateTime<Utc>,
}

#[derive(FromRow)]
struct LaborLineRow {
    work_order_id: Uuid,
    employee_id: Uuid,
    hours: Decimal,
    hourly_rate: Decimal,
}

#[derive(FromRow)]
struct MaterialLineRow {
    work_order_id: Uuid,
    item_id: Uuid,
    quantity: Decimal,
    applied_price: Decimal,
}

#[derive(FromRow)]
struct DocumentRow {
    document_id: Uuid,
    client_id: Uuid,
    number: String,
    kind: DocumentKind,
    issue_date: NaiveDate,
    subtotal: Decimal,
    discount_percent: Decimal,
    discount_amount: Decimal,
    total: Decimal,
    note: Option<String>,
    state: DocumentState,
    created_utc: DateTime<Utc>,
}

#[derive(FromRow)]
struct DocumentLineRow {
    document_id: Uuid,
    #[sqlx(flatten)]
    line: DocumentLine,
}

#[derive(FromRow)]
struct DocumentLinkRow {
    document_id: Uuid,
    work_order_id: Uuid,
}

fn db_error(action: &str, e: sqlx::Error) -> AppError {
    AppError::DatabaseError(anyhow::anyhow!("Failed to {}: {}", action, e))
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "accounting-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| db_error("connect", e))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("run health check", e))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, AppError> {
        self.pool
            .begin()
            .await
            .map_err(|e| db_error("begin transaction", e))
    }

    /// Attach labor and material lines to work-order rows.
    async fn assemble_work_orders(
        &self,
        rows: Vec<WorkOrderRow>,
    ) -> Result<Vec<WorkOrder>, AppError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = rows.iter().map(|r| r.work_order_id).collect();

        let labor_rows = sqlx::query_as::<_, LaborLineRow>(
            r#"
            SELECT work_order_id, employee_id, hours, hourly_rate
            FROM labor_lines
            WHERE work_order_id = ANY($1)
            ORDER BY work_order_id, position
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("load labor lines", e))?;

        let material_rows = sqlx::query_as::<_, MaterialLineRow>(
            r#"
            SELECT work_order_id, item_id, quantity, applied_price
            FROM material_lines
            WHERE work_order_id = ANY($1)
            ORDER BY work_order_id, position
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("load material lines", e))?;

        let mut labor: HashMap<Uuid, Vec<LaborLine>> = HashMap::new();
        for row in labor_rows {
            labor
                .entry(row.work_order_id)
                .or_default()
                .push(LaborLine::new(row.employee_id, row.hours, row.hourly_rate)?);
        }
        let mut materials: HashMap<Uuid, Vec<MaterialLine>> = HashMap::new();
        for row in material_rows {
            materials
                .entry(row.work_order_id)
                .or_default()
                .push(MaterialLine::new(row.item_id, row.quantity, row.applied_price)?);
        }

        rows.into_iter()
            .map(|row| {
                let billing = BillingState::from_parts(row.billing_stage, row.document_id)?;
                Ok(WorkOrder::rehydrate(
                    row.work_order_id,
                    row.project_id,
                    row.date,
                    row.note,
                    billing,
                    labor.remove(&row.work_order_id).unwrap_or_default(),
                    materials.remove(&row.work_order_id).unwrap_or_default(),
                    row.created_utc,
                ))
            })
            .collect()
    }

    /// Attach lines and claimed work-order ids to document rows.
    async fn assemble_documents(
        &self,
        rows: Vec<DocumentRow>,
    ) -> Result<Vec<BillingDocument>, AppError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = rows.iter().map(|r| r.document_id).collect();

        let line_rows = sqlx::query_as::<_, DocumentLineRow>(
            r#"
            SELECT document_id, line_id, description, quantity, unit_price, line_total, work_order_id, sort_order
            FROM document_lines
            WHERE document_id = ANY($1)
            ORDER BY document_id, sort_order
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("load document lines", e))?;

        let link_rows = sqlx::query_as::<_, DocumentLinkRow>(
            r#"
            SELECT document_id, work_order_id
            FROM document_work_orders
            WHERE document_id = ANY($1)
            ORDER BY document_id, position
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("load document work orders", e))?;

        let mut lines: HashMap<Uuid, Vec<DocumentLine>> = HashMap::new();
        for row in line_rows {
            lines.entry(row.document_id).or_default().push(row.line);
        }
        let mut links: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for row in link_rows {
            links
                .entry(row.document_id)
                .or_default()
                .push(row.work_order_id);
        }

        Ok(rows
            .into_iter()
            .map(|row| BillingDocument {
                lines: lines.remove(&row.document_id).unwrap_or_default(),
                work_order_ids: links.remove(&row.document_id).unwrap_or_default(),
                document_id: row.document_id,
                client_id: row.client_id,
                number: row.number,
                kind: row.kind,
                issue_date: row.issue_date,
                subtotal: row.subtotal,
                discount_percent: row.discount_percent,
                discount_amount: row.discount_amount,
                total: row.total,
                note: row.note,
                state: row.state,
                created_utc: row.created_utc,
            })
            .collect())
    }

    async fn insert_lines(
        tx: &mut Transaction<'static, Postgres>,
        order: &WorkOrder,
    ) -> Result<(), AppError> {
        for (position, line) in order.labor.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO labor_lines (line_id, work_order_id, employee_id, hours, hourly_rate, position)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(order.work_order_id)
            .bind(line.employee_id())
            .bind(line.hours())
            .bind(line.hourly_rate())
            .bind(position as i32)
            .execute(&mut **tx)
            .await
            .map_err(|e| db_error("insert labor line", e))?;
        }

        for (position, line) in order.materials.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO material_lines (line_id, work_order_id, item_id, quantity, applied_price, position)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(order.work_order_id)
            .bind(line.item_id())
            .bind(line.quantity())
            .bind(line.applied_price())
            .bind(position as i32)
            .execute(&mut **tx)
            .await
            .map_err(|e| db_error("insert material line", e))?;
        }

        Ok(())
    }

    /// Explain why a guarded write on an unlinked work order matched no row.
    async fn linked_or_missing(&self, work_order_id: Uuid, action: &str) -> AppError {
        match self.get_work_order(work_order_id).await {
            Ok(Some(order)) => AppError::ValidationError(anyhow::anyhow!(
                "Cannot {} work order {}: it is linked to document {}",
                action,
                work_order_id,
                order.document_id().unwrap_or_default()
            )),
            Ok(None) => {
                AppError::NotFound(anyhow::anyhow!("Work order {} not found", work_order_id))
            }
            Err(e) => e,
        }
    }
}

#[async_trait]
impl Store for Database {
    // -------------------------------------------------------------------------
    // Clients
    // -------------------------------------------------------------------------

    #[instrument(skip(self, input), fields(name = %input.name))]
    async fn insert_client(&self, input: &CreateClient) -> Result<Client, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_client"])
            .start_timer();

        let client = sqlx::query_as::<_, Client>(&format!(
            r#"
            INSERT INTO clients (client_id, name, kind, contact_person, phone, email, address, city, postal_code, tax_code, vat_number, notes, active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, TRUE)
            RETURNING {CLIENT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&input.name)
        .bind(input.kind)
        .bind(&input.contact_person)
        .bind(&input.phone)
        .bind(&input.email)
        .bind(&input.address)
        .bind(&input.city)
        .bind(&input.postal_code)
        .bind(&input.tax_code)
        .bind(&input.vat_number)
        .bind(&input.notes)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("create client", e))?;

        timer.observe_duration();
        info!(client_id = %client.client_id, "Client inserted");
        Ok(client)
    }

    #[instrument(skip(self))]
    async fn get_client(&self, client_id: Uuid) -> Result<Option<Client>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_client"])
            .start_timer();

        let client = sqlx::query_as::<_, Client>(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients WHERE client_id = $1"
        ))
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("get client", e))?;

        timer.observe_duration();
        Ok(client)
    }

    #[instrument(skip(self))]
    async fn list_clients(&self, active_only: bool) -> Result<Vec<Client>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_clients"])
            .start_timer();

        let clients = sqlx::query_as::<_, Client>(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients WHERE (NOT $1 OR active) ORDER BY name"
        ))
        .bind(active_only)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list clients", e))?;

        timer.observe_duration();
        Ok(clients)
    }

    #[instrument(skip(self))]
    async fn deactivate_client(&self, client_id: Uuid) -> Result<Option<Client>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["deactivate_client"])
            .start_timer();

        let client = sqlx::query_as::<_, Client>(&format!(
            "UPDATE clients SET active = FALSE WHERE client_id = $1 RETURNING {CLIENT_COLUMNS}"
        ))
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("deactivate client", e))?;

        timer.observe_duration();
        Ok(client)
    }

    // -------------------------------------------------------------------------
    // Projects
    // -------------------------------------------------------------------------

    #[instrument(skip(self, input), fields(client_id = %input.client_id))]
    async fn insert_project(&self, input: &CreateProject) -> Result<Project, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_project"])
            .start_timer();

        let project = sqlx::query_as::<_, Project>(&format!(
            r#"
            INSERT INTO projects (project_id, client_id, name, billing_mode, quoted_amount, description, site_address, start_date, expected_end_date, active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, TRUE)
            RETURNING {PROJECT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(input.client_id)
        .bind(&input.name)
        .bind(input.billing_mode)
        .bind(input.quoted_amount)
        .bind(&input.description)
        .bind(&input.site_address)
        .bind(input.start_date)
        .bind(input.expected_end_date)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                AppError::NotFound(anyhow::anyhow!("Client {} not found", input.client_id))
            }
            _ => db_error("create project", e),
        })?;

        timer.observe_duration();
        info!(project_id = %project.project_id, "Project inserted");
        Ok(project)
    }

    #[instrument(skip(self))]
    async fn get_project(&self, project_id: Uuid) -> Result<Option<Project>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_project"])
            .start_timer();

        let project = sqlx::query_as::<_, Project>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE project_id = $1"
        ))
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("get project", e))?;

        timer.observe_duration();
        Ok(project)
    }

    #[instrument(skip(self))]
    async fn list_projects(&self, client_id: Uuid) -> Result<Vec<Project>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_projects"])
            .start_timer();

        let projects = sqlx::query_as::<_, Project>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE client_id = $1 ORDER BY name"
        ))
        .bind(client_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list projects", e))?;

        timer.observe_duration();
        Ok(projects)
    }

    // -------------------------------------------------------------------------
    // Employees and catalog
    // -------------------------------------------------------------------------

    #[instrument(skip(self, input))]
    async fn insert_employee(&self, input: &CreateEmployee) -> Result<Employee, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_employee"])
            .start_timer();

        let employee = sqlx::query_as::<_, Employee>(&format!(
            r#"
            INSERT INTO employees (employee_id, first_name, last_name, phone, hourly_rate, active)
            VALUES ($1, $2, $3, $4, $5, TRUE)
            RETURNING {EMPLOYEE_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&input.first_name)
        .bind(&input.last_name)
        .bind(&input.phone)
        .bind(input.hourly_rate)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("create employee", e))?;

        timer.observe_duration();
        info!(employee_id = %employee.employee_id, "Employee inserted");
        Ok(employee)
    }

    #[instrument(skip(self))]
    async fn get_employee(&self, employee_id: Uuid) -> Result<Option<Employee>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_employee"])
            .start_timer();

        let employee = sqlx::query_as::<_, Employee>(&format!(
            "SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE employee_id = $1"
        ))
        .bind(employee_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("get employee", e))?;

        timer.observe_duration();
        Ok(employee)
    }

    #[instrument(skip(self))]
    async fn update_employee_rate(
        &self,
        employee_id: Uuid,
        hourly_rate: Decimal,
    ) -> Result<Option<Employee>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_employee_rate"])
            .start_timer();

        let employee = sqlx::query_as::<_, Employee>(&format!(
            "UPDATE employees SET hourly_rate = $2 WHERE employee_id = $1 RETURNING {EMPLOYEE_COLUMNS}"
        ))
        .bind(employee_id)
        .bind(hourly_rate)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("update employee rate", e))?;

        timer.observe_duration();
        Ok(employee)
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    async fn insert_catalog_item(
        &self,
        input: &CreateCatalogItem,
    ) -> Result<CatalogItem, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_catalog_item"])
            .start_timer();

        let item = sqlx::query_as::<_, CatalogItem>(&format!(
            r#"
            INSERT INTO catalog_items (item_id, name, kind, unit, list_price, notes, active)
            VALUES ($1, $2, $3, $4, $5, $6, TRUE)
            RETURNING {CATALOG_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&input.name)
        .bind(input.kind)
        .bind(input.unit)
        .bind(input.list_price)
        .bind(&input.notes)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("create catalog item", e))?;

        timer.observe_duration();
        info!(item_id = %item.item_id, "Catalog item inserted");
        Ok(item)
    }

    #[instrument(skip(self))]
    async fn get_catalog_item(&self, item_id: Uuid) -> Result<Option<CatalogItem>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_catalog_item"])
            .start_timer();

        let item = sqlx::query_as::<_, CatalogItem>(&format!(
            "SELECT {CATALOG_COLUMNS} FROM catalog_items WHERE item_id = $1"
        ))
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("get catalog item", e))?;

        timer.observe_duration();
        Ok(item)
    }

    // -------------------------------------------------------------------------
    // Work orders
    // -------------------------------------------------------------------------

    #[instrument(skip(self, order), fields(work_order_id = %order.work_order_id))]
    async fn insert_work_order(&self, order: &WorkOrder) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_work_order"])
            .start_timer();

        let mut tx = self.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO work_orders (work_order_id, project_id, date, note, billing_stage, document_id, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(order.work_order_id)
        .bind(order.project_id)
        .bind(order.date)
        .bind(&order.note)
        .bind(order.stage())
        .bind(order.document_id())
        .bind(order.created_utc)
        .execute(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "Work order {} already exists",
                    order.work_order_id
                ))
            }
            sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                AppError::NotFound(anyhow::anyhow!("Project {} not found", order.project_id))
            }
            _ => db_error("create work order", e),
        })?;

        Self::insert_lines(&mut tx, order).await?;
        tx.commit()
            .await
            .map_err(|e| db_error("commit work order", e))?;

        timer.observe_duration();
        info!(
            labor_lines = order.labor.len(),
            material_lines = order.materials.len(),
            "Work order inserted"
        );
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_work_order(&self, work_order_id: Uuid) -> Result<Option<WorkOrder>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_work_order"])
            .start_timer();

        let row = sqlx::query_as::<_, WorkOrderRow>(&format!(
            "SELECT {WORK_ORDER_COLUMNS} FROM work_orders w WHERE w.work_order_id = $1"
        ))
        .bind(work_order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("get work order", e))?;

        let order = match row {
            Some(row) => self.assemble_work_orders(vec![row]).await?.pop(),
            None => None,
        };

        timer.observe_duration();
        Ok(order)
    }

    #[instrument(skip(self, filter))]
    async fn list_work_orders(
        &self,
        filter: &WorkOrderFilter,
    ) -> Result<Vec<WorkOrder>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_work_orders"])
            .start_timer();

        let rows = sqlx::query_as::<_, WorkOrderRow>(&format!(
            r#"
            SELECT {WORK_ORDER_COLUMNS}
            FROM work_orders w
            JOIN projects p ON p.project_id = w.project_id
            WHERE ($1::uuid IS NULL OR p.client_id = $1)
              AND ($2::uuid IS NULL OR w.project_id = $2)
              AND ($3::varchar IS NULL OR w.billing_stage = $3)
            ORDER BY w.date, w.created_utc
            "#
        ))
        .bind(filter.client_id)
        .bind(filter.project_id)
        .bind(filter.stage)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list work orders", e))?;

        let orders = self.assemble_work_orders(rows).await?;

        timer.observe_duration();
        Ok(orders)
    }

    #[instrument(skip(self, order), fields(work_order_id = %order.work_order_id))]
    async fn update_work_order_details(&self, order: &WorkOrder) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_work_order_details"])
            .start_timer();

        let mut tx = self.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE work_orders SET date = $2, note = $3
            WHERE work_order_id = $1 AND document_id IS NULL
            "#,
        )
        .bind(order.work_order_id)
        .bind(order.date)
        .bind(&order.note)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("update work order", e))?;

        if result.rows_affected() == 0 {
            tx.rollback().await.ok();
            return Err(self.linked_or_missing(order.work_order_id, "edit").await);
        }

        for table in ["labor_lines", "material_lines"] {
            sqlx::query(&format!("DELETE FROM {table} WHERE work_order_id = $1"))
                .bind(order.work_order_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error("clear work order lines", e))?;
        }
        Self::insert_lines(&mut tx, order).await?;

        tx.commit()
            .await
            .map_err(|e| db_error("commit work order update", e))?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self, expected, next), fields(from = %expected.stage(), to = %next.stage()))]
    async fn update_work_order_state(
        &self,
        work_order_id: Uuid,
        expected: BillingState,
        next: BillingState,
    ) -> Result<(), AppError> {
        expected.ensure_same_link(&next)?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_work_order_state"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE work_orders SET billing_stage = $2
            WHERE work_order_id = $1 AND billing_stage = $3
              AND document_id IS NOT DISTINCT FROM $4
            "#,
        )
        .bind(work_order_id)
        .bind(next.stage())
        .bind(expected.stage())
        .bind(expected.document_id())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("update work order state", e))?;

        timer.observe_duration();
        if result.rows_affected() > 0 {
            return Ok(());
        }

        match self.get_work_order(work_order_id).await? {
            Some(stored) => Err(AppError::Conflict(anyhow::anyhow!(
                "Work order {} is '{}', expected '{}'",
                work_order_id,
                stored.stage(),
                expected.stage()
            ))),
            None => Err(AppError::NotFound(anyhow::anyhow!(
                "Work order {} not found",
                work_order_id
            ))),
        }
    }

    #[instrument(skip(self))]
    async fn link_work_order(
        &self,
        work_order_id: Uuid,
        document_id: Uuid,
    ) -> Result<WorkOrder, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["link_work_order"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE work_orders SET billing_stage = $3, document_id = $2
            WHERE work_order_id = $1 AND billing_stage = $4 AND document_id IS NULL
            "#,
        )
        .bind(work_order_id)
        .bind(document_id)
        .bind(BillingStage::Invoiced)
        .bind(BillingStage::WorkCompleted)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                AppError::NotFound(anyhow::anyhow!("Document {} not found", document_id))
            }
            _ => db_error("link work order", e),
        })?;
        timer.observe_duration();

        let mut order = self.get_work_order(work_order_id).await?.ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Work order {} not found", work_order_id))
        })?;

        if result.rows_affected() == 0 {
            // Replay the transition on the stored state to report why it did
            // not apply; an order already on this document is fine.
            if order.link_to_document(document_id)? {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "Work order {} changed while being linked",
                    work_order_id
                )));
            }
        }
        Ok(order)
    }

    #[instrument(skip(self))]
    async fn delete_work_order(&self, work_order_id: Uuid) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_work_order"])
            .start_timer();

        let result =
            sqlx::query("DELETE FROM work_orders WHERE work_order_id = $1 AND document_id IS NULL")
                .bind(work_order_id)
                .execute(&self.pool)
                .await
                .map_err(|e| db_error("delete work order", e))?;

        timer.observe_duration();
        if result.rows_affected() > 0 {
            info!("Work order deleted");
            return Ok(true);
        }

        match self.linked_or_missing(work_order_id, "delete").await {
            AppError::NotFound(_) => Ok(false),
            e => Err(e),
        }
    }

    // -------------------------------------------------------------------------
    // Billing documents
    // -------------------------------------------------------------------------

    #[instrument(skip(self, document), fields(document_id = %document.document_id))]
    async fn insert_document(&self, document: &BillingDocument) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_document"])
            .start_timer();

        let mut tx = self.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO documents (document_id, client_id, number, kind, issue_date, subtotal, discount_percent, discount_amount, total, note, state, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(document.document_id)
        .bind(document.client_id)
        .bind(&document.number)
        .bind(document.kind)
        .bind(document.issue_date)
        .bind(document.subtotal)
        .bind(document.discount_percent)
        .bind(document.discount_amount)
        .bind(document.total)
        .bind(&document.note)
        .bind(document.state)
        .bind(document.created_utc)
        .execute(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "Document {} already exists",
                    document.document_id
                ))
            }
            _ => db_error("create document", e),
        })?;

        for line in &document.lines {
            sqlx::query(
                r#"
                INSERT INTO document_lines (line_id, document_id, description, quantity, unit_price, line_total, work_order_id, sort_order)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(line.line_id)
            .bind(document.document_id)
            .bind(&line.description)
            .bind(line.quantity)
            .bind(line.unit_price)
            .bind(line.line_total)
            .bind(line.work_order_id)
            .bind(line.sort_order)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("create document line", e))?;
        }

        for (position, work_order_id) in document.work_order_ids.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO document_work_orders (document_id, work_order_id, position)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(document.document_id)
            .bind(work_order_id)
            .bind(position as i32)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("record document work order", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| db_error("commit document", e))?;

        timer.observe_duration();
        info!(lines = document.lines.len(), "Document inserted");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_document(&self, document_id: Uuid) -> Result<Option<BillingDocument>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_document"])
            .start_timer();

        let row = sqlx::query_as::<_, DocumentRow>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE document_id = $1"
        ))
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("get document", e))?;

        let document = match row {
            Some(row) => self.assemble_documents(vec![row]).await?.pop(),
            None => None,
        };

        timer.observe_duration();
        Ok(document)
    }

    #[instrument(skip(self))]
    async fn list_documents(
        &self,
        client_id: Option<Uuid>,
    ) -> Result<Vec<BillingDocument>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_documents"])
            .start_timer();

        let rows = sqlx::query_as::<_, DocumentRow>(&format!(
            r#"
            SELECT {DOCUMENT_COLUMNS}
            FROM documents
            WHERE ($1::uuid IS NULL OR client_id = $1)
            ORDER BY created_utc DESC
            "#
        ))
        .bind(client_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list documents", e))?;

        let documents = self.assemble_documents(rows).await?;

        timer.observe_duration();
        Ok(documents)
    }

    // -------------------------------------------------------------------------
    // Payments
    // -------------------------------------------------------------------------

    #[instrument(skip(self, payment), fields(document_id = %payment.document_id))]
    async fn insert_payment(&self, payment: &Payment) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_payment"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO payments (payment_id, document_id, amount, method, date, note, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(payment.payment_id)
        .bind(payment.document_id)
        .bind(payment.amount)
        .bind(payment.method)
        .bind(payment.date)
        .bind(&payment.note)
        .bind(payment.created_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                AppError::NotFound(anyhow::anyhow!(
                    "Document {} not found",
                    payment.document_id
                ))
            }
            _ => db_error("create payment", e),
        })?;

        timer.observe_duration();
        info!(payment_id = %payment.payment_id, "Payment inserted");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_payments(&self, document_id: Uuid) -> Result<Vec<Payment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_payments"])
            .start_timer();

        let payments = sqlx::query_as::<_, Payment>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM payments
            WHERE document_id = $1
            ORDER BY date DESC, created_utc DESC
            "#
        ))
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list payments", e))?;

        timer.observe_duration();
        Ok(payments)
    }
}
