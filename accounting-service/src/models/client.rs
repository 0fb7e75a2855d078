//! Client model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Client kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ClientKind {
    Individual,
    Company,
}

impl ClientKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientKind::Individual => "individual",
            ClientKind::Company => "company",
        }
    }
}

/// A customer of the business. Never hard-deleted while referenced;
/// retired clients have `active = false`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Client {
    pub client_id: Uuid,
    pub name: String,
    pub kind: ClientKind,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub tax_code: Option<String>,
    pub vat_number: Option<String>,
    pub notes: Option<String>,
    pub active: bool,
    pub created_utc: DateTime<Utc>,
}

/// Input for creating a client.
#[derive(Debug, Clone)]
pub struct CreateClient {
    pub name: String,
    pub kind: ClientKind,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub tax_code: Option<String>,
    pub vat_number: Option<String>,
    pub notes: Option<String>,
}

impl CreateClient {
    /// Client with only the mandatory fields filled in.
    pub fn named(name: impl Into<String>, kind: ClientKind) -> Self {
        Self {
            name: name.into(),
            kind,
            contact_person: None,
            phone: None,
            email: None,
            address: None,
            city: None,
            postal_code: None,
            tax_code: None,
            vat_number: None,
            notes: None,
        }
    }
}
