//! Read-only aggregate queries. Nothing here writes to the store.

use crate::models::{BillingMode, BillingStage, WorkOrderFilter};
use crate::services::costs::{round_money, CostBreakdown};
use crate::services::store::Store;
use rust_decimal::Decimal;
use serde::Serialize;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Work totals for one project of a client.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectSummary {
    pub project_id: Uuid,
    pub name: String,
    pub billing_mode: BillingMode,
    pub quoted_amount: Option<Decimal>,
    pub work_order_count: usize,
    pub total: Decimal,
}

/// Work totals for a client across all of its projects.
#[derive(Debug, Clone, Serialize)]
pub struct ClientSummary {
    pub client_id: Uuid,
    pub name: String,
    pub total_work: Decimal,
    /// Work not yet marked completed.
    pub unbilled_total: Decimal,
    pub unbilled_count: usize,
    pub projects: Vec<ProjectSummary>,
}

/// Actual cost against the quote of a fixed-quote project.
#[derive(Debug, Clone, Serialize)]
pub struct QuoteAnalysis {
    pub project_id: Uuid,
    pub quoted_amount: Decimal,
    pub labor_hours: Decimal,
    pub labor_cost: Decimal,
    pub material_cost: Decimal,
    pub actual_cost: Decimal,
    pub margin: Decimal,
    /// Margin as a percentage of the quote; `None` for a zero quote.
    pub margin_percent: Option<Decimal>,
    pub over_budget: bool,
}

/// Work orders in one billing stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageSummary {
    pub stage: BillingStage,
    pub count: usize,
    pub total: Decimal,
}

#[derive(Clone)]
pub struct Reports {
    store: Arc<dyn Store>,
}

impl Reports {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Labor, material and total cost of one work order, full precision.
    pub async fn work_order_total(&self, work_order_id: Uuid) -> Result<CostBreakdown, AppError> {
        let order = self
            .store
            .get_work_order(work_order_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Work order {} not found", work_order_id))
            })?;
        Ok(CostBreakdown::for_work_order(&order))
    }

    #[instrument(skip(self))]
    pub async fn client_summary(&self, client_id: Uuid) -> Result<ClientSummary, AppError> {
        let client = self
            .store
            .get_client(client_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Client {} not found", client_id)))?;

        let mut projects = Vec::new();
        let mut total_work = Decimal::ZERO;
        let mut unbilled_total = Decimal::ZERO;
        let mut unbilled_count = 0;

        for project in self.store.list_projects(client_id).await? {
            let orders = self
                .store
                .list_work_orders(&WorkOrderFilter {
                    project_id: Some(project.project_id),
                    ..Default::default()
                })
                .await?;

            let project_total = CostBreakdown::for_work_orders(&orders).total;
            let unbilled: Vec<_> = orders
                .iter()
                .filter(|o| o.stage() == BillingStage::Unbilled)
                .collect();

            total_work += project_total;
            unbilled_total += CostBreakdown::for_work_orders(unbilled.iter().copied()).total;
            unbilled_count += unbilled.len();

            projects.push(ProjectSummary {
                project_id: project.project_id,
                name: project.name,
                billing_mode: project.billing_mode,
                quoted_amount: project.quoted_amount,
                work_order_count: orders.len(),
                total: round_money(project_total),
            });
        }

        Ok(ClientSummary {
            client_id,
            name: client.name,
            total_work: round_money(total_work),
            unbilled_total: round_money(unbilled_total),
            unbilled_count,
            projects,
        })
    }

    #[instrument(skip(self))]
    pub async fn quote_analysis(&self, project_id: Uuid) -> Result<QuoteAnalysis, AppError> {
        let project = self.store.get_project(project_id).await?.ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Project {} not found", project_id))
        })?;

        let quoted_amount = match (project.billing_mode, project.quoted_amount) {
            (BillingMode::FixedQuote, Some(amount)) => amount,
            (BillingMode::FixedQuote, None) => {
                return Err(AppError::ValidationError(anyhow::anyhow!(
                    "Project {} has no quoted amount",
                    project_id
                )));
            }
            (BillingMode::TimeAndMaterials, _) => {
                return Err(AppError::ValidationError(anyhow::anyhow!(
                    "Project {} is billed on time and materials and has no quote",
                    project_id
                )));
            }
        };

        let orders = self
            .store
            .list_work_orders(&WorkOrderFilter {
                project_id: Some(project_id),
                ..Default::default()
            })
            .await?;

        let labor_hours: Decimal = orders
            .iter()
            .flat_map(|o| o.labor.iter())
            .map(|l| l.hours())
            .sum();
        let costs = CostBreakdown::for_work_orders(&orders);
        let margin = quoted_amount - costs.total;
        let margin_percent = (!quoted_amount.is_zero())
            .then(|| round_money(margin / quoted_amount * Decimal::ONE_HUNDRED));

        Ok(QuoteAnalysis {
            project_id,
            quoted_amount,
            labor_hours,
            labor_cost: round_money(costs.labor_total),
            material_cost: round_money(costs.material_total),
            actual_cost: round_money(costs.total),
            margin: round_money(margin),
            margin_percent,
            over_budget: margin < Decimal::ZERO,
        })
    }

    /// Count and total of work orders per billing stage, in lifecycle order.
    #[instrument(skip(self))]
    pub async fn state_board(&self) -> Result<Vec<StageSummary>, AppError> {
        let orders = self
            .store
            .list_work_orders(&WorkOrderFilter::default())
            .await?;

        Ok(BillingStage::ALL
            .iter()
            .map(|&stage| {
                let in_stage: Vec<_> = orders.iter().filter(|o| o.stage() == stage).collect();
                StageSummary {
                    stage,
                    count: in_stage.len(),
                    total: round_money(CostBreakdown::for_work_orders(in_stage.iter().copied()).total),
                }
            })
            .collect())
    }
}
