//! Employee model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A crew member. `hourly_rate` is the current rate only; work orders keep
/// their own copy of the rate in force when the work was recorded.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Employee {
    pub employee_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub hourly_rate: Decimal,
    pub active: bool,
    pub created_utc: DateTime<Utc>,
}

impl Employee {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Input for creating an employee.
#[derive(Debug, Clone)]
pub struct CreateEmployee {
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub hourly_rate: Decimal,
}
