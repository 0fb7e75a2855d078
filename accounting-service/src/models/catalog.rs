//! Catalog item model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Catalog item kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CatalogKind {
    Service,
    Material,
}

/// Unit of measure for catalog items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Hour,
    Piece,
    Kilogram,
    Litre,
    SquareMetre,
    LinearMetre,
    Flat,
}

impl Unit {
    pub fn symbol(&self) -> &'static str {
        match self {
            Unit::Hour => "h",
            Unit::Piece => "pz",
            Unit::Kilogram => "kg",
            Unit::Litre => "lt",
            Unit::SquareMetre => "mq",
            Unit::LinearMetre => "ml",
            Unit::Flat => "forfait",
        }
    }
}

/// A priced service or material. `list_price` is the current price only.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CatalogItem {
    pub item_id: Uuid,
    pub name: String,
    pub kind: CatalogKind,
    pub unit: Unit,
    pub list_price: Decimal,
    pub notes: Option<String>,
    pub active: bool,
    pub created_utc: DateTime<Utc>,
}

/// Input for creating a catalog item.
#[derive(Debug, Clone)]
pub struct CreateCatalogItem {
    pub name: String,
    pub kind: CatalogKind,
    pub unit: Unit,
    pub list_price: Decimal,
    pub notes: Option<String>,
}
