//! Project model.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// How work on a project is charged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BillingMode {
    TimeAndMaterials,
    FixedQuote,
}

impl BillingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingMode::TimeAndMaterials => "time_and_materials",
            BillingMode::FixedQuote => "fixed_quote",
        }
    }
}

/// A job site or engagement for one client.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Project {
    pub project_id: Uuid,
    pub client_id: Uuid,
    pub name: String,
    pub billing_mode: BillingMode,
    pub quoted_amount: Option<Decimal>,
    pub description: Option<String>,
    pub site_address: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub expected_end_date: Option<NaiveDate>,
    pub active: bool,
    pub created_utc: DateTime<Utc>,
}

/// Input for creating a project.
#[derive(Debug, Clone)]
pub struct CreateProject {
    pub client_id: Uuid,
    pub name: String,
    pub billing_mode: BillingMode,
    pub quoted_amount: Option<Decimal>,
    pub description: Option<String>,
    pub site_address: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub expected_end_date: Option<NaiveDate>,
}
