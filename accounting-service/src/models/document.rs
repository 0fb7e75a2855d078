//! Billing document model.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Document kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Proforma,
    Invoice,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Proforma => "proforma",
            DocumentKind::Invoice => "invoice",
        }
    }
}

/// Issue state recorded on a document. Settlement is derived from payments
/// and never stored here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DocumentState {
    Created,
}

/// One line of a billing document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct DocumentLine {
    pub line_id: Uuid,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    pub work_order_id: Option<Uuid>,
    pub sort_order: i32,
}

/// An invoice or proforma aggregating work orders for one client.
///
/// Amounts are computed once at creation and never edited; corrections are
/// made by issuing a new document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingDocument {
    pub document_id: Uuid,
    pub client_id: Uuid,
    pub number: String,
    pub kind: DocumentKind,
    pub issue_date: NaiveDate,
    pub subtotal: Decimal,
    pub discount_percent: Decimal,
    pub discount_amount: Decimal,
    pub total: Decimal,
    pub note: Option<String>,
    pub state: DocumentState,
    pub lines: Vec<DocumentLine>,
    /// Every work order this document claims, including zero-value ones that
    /// produced no line. Used to finish linking after an interrupted write.
    pub work_order_ids: Vec<Uuid>,
    pub created_utc: DateTime<Utc>,
}

/// Input for creating a billing document.
#[derive(Debug, Clone)]
pub struct CreateDocument {
    pub client_id: Uuid,
    pub work_order_ids: Vec<Uuid>,
    pub discount_percent: Option<Decimal>,
    pub number: String,
    pub kind: DocumentKind,
    pub issue_date: NaiveDate,
    pub note: Option<String>,
}
