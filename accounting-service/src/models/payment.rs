//! Payment model.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Payment method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Wire,
    Check,
    Card,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Wire => "wire",
            PaymentMethod::Check => "check",
            PaymentMethod::Card => "card",
        }
    }
}

/// Money received against a billing document.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub payment_id: Uuid,
    pub document_id: Uuid,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub date: NaiveDate,
    pub note: Option<String>,
    pub created_utc: DateTime<Utc>,
}

/// Input for recording a payment.
#[derive(Debug, Clone)]
pub struct RecordPayment {
    pub document_id: Uuid,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub date: NaiveDate,
    pub note: Option<String>,
}
