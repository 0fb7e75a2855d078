//! Clients, projects, employees and catalog items.

use crate::models::{
    BillingMode, CatalogItem, Client, CreateCatalogItem, CreateClient, CreateEmployee,
    CreateProject, Employee, Project,
};
use crate::services::store::Store;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Clone)]
pub struct MasterData {
    store: Arc<dyn Store>,
}

impl MasterData {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_client(&self, input: CreateClient) -> Result<Client, AppError> {
        require_name(&input.name, "Client")?;
        let client = self.store.insert_client(&input).await?;
        info!(client_id = %client.client_id, kind = %client.kind.as_str(), "Client created");
        Ok(client)
    }

    pub async fn get_client(&self, client_id: Uuid) -> Result<Client, AppError> {
        self.store
            .get_client(client_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Client {} not found", client_id)))
    }

    /// Active clients ordered by name.
    pub async fn list_active_clients(&self) -> Result<Vec<Client>, AppError> {
        self.store.list_clients(true).await
    }

    /// Retire a client. Its projects, work orders and documents are kept.
    #[instrument(skip(self))]
    pub async fn deactivate_client(&self, client_id: Uuid) -> Result<Client, AppError> {
        let client = self
            .store
            .deactivate_client(client_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Client {} not found", client_id)))?;
        info!("Client deactivated");
        Ok(client)
    }

    #[instrument(skip(self, input), fields(client_id = %input.client_id, name = %input.name))]
    pub async fn create_project(&self, input: CreateProject) -> Result<Project, AppError> {
        require_name(&input.name, "Project")?;
        match (input.billing_mode, input.quoted_amount) {
            (BillingMode::TimeAndMaterials, Some(_)) => {
                return Err(AppError::ValidationError(anyhow::anyhow!(
                    "A quoted amount is only allowed on fixed-quote projects"
                )));
            }
            (BillingMode::FixedQuote, Some(amount)) if amount < Decimal::ZERO => {
                return Err(AppError::ValidationError(anyhow::anyhow!(
                    "Quoted amount must not be negative, got {}",
                    amount
                )));
            }
            _ => {}
        }

        let project = self.store.insert_project(&input).await?;
        info!(
            project_id = %project.project_id,
            billing_mode = %project.billing_mode.as_str(),
            "Project created"
        );
        Ok(project)
    }

    pub async fn get_project(&self, project_id: Uuid) -> Result<Project, AppError> {
        self.store.get_project(project_id).await?.ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Project {} not found", project_id))
        })
    }

    pub async fn list_projects(&self, client_id: Uuid) -> Result<Vec<Project>, AppError> {
        self.get_client(client_id).await?;
        self.store.list_projects(client_id).await
    }

    #[instrument(skip(self, input))]
    pub async fn create_employee(&self, input: CreateEmployee) -> Result<Employee, AppError> {
        require_name(&input.last_name, "Employee")?;
        require_rate(input.hourly_rate)?;
        let employee = self.store.insert_employee(&input).await?;
        info!(employee_id = %employee.employee_id, name = %employee.full_name(), "Employee created");
        Ok(employee)
    }

    pub async fn get_employee(&self, employee_id: Uuid) -> Result<Employee, AppError> {
        self.store.get_employee(employee_id).await?.ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Employee {} not found", employee_id))
        })
    }

    /// Change the current rate. Recorded work keeps the rate it was priced at.
    #[instrument(skip(self))]
    pub async fn update_employee_rate(
        &self,
        employee_id: Uuid,
        hourly_rate: Decimal,
    ) -> Result<Employee, AppError> {
        require_rate(hourly_rate)?;
        let employee = self
            .store
            .update_employee_rate(employee_id, hourly_rate)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Employee {} not found", employee_id))
            })?;
        info!(hourly_rate = %hourly_rate, "Employee rate updated");
        Ok(employee)
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_catalog_item(
        &self,
        input: CreateCatalogItem,
    ) -> Result<CatalogItem, AppError> {
        require_name(&input.name, "Catalog item")?;
        if input.list_price < Decimal::ZERO {
            return Err(AppError::ValidationError(anyhow::anyhow!(
                "List price must not be negative, got {}",
                input.list_price
            )));
        }
        let item = self.store.insert_catalog_item(&input).await?;
        info!(item_id = %item.item_id, unit = %item.unit.symbol(), "Catalog item created");
        Ok(item)
    }

    pub async fn get_catalog_item(&self, item_id: Uuid) -> Result<CatalogItem, AppError> {
        self.store.get_catalog_item(item_id).await?.ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Catalog item {} not found", item_id))
        })
    }
}

fn require_name(name: &str, entity: &str) -> Result<(), AppError> {
    if name.trim().is_empty() {
        return Err(AppError::ValidationError(anyhow::anyhow!(
            "{} name must not be blank",
            entity
        )));
    }
    Ok(())
}

fn require_rate(hourly_rate: Decimal) -> Result<(), AppError> {
    if hourly_rate < Decimal::ZERO {
        return Err(AppError::ValidationError(anyhow::anyhow!(
            "Hourly rate must not be negative, got {}",
            hourly_rate
        )));
    }
    Ok(())
}
