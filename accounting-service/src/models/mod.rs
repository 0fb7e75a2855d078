//! Domain models for accounting-service.

mod catalog;
mod client;
mod document;
mod employee;
mod payment;
mod project;
mod work_order;

pub use catalog::{CatalogItem, CatalogKind, CreateCatalogItem, Unit};
pub use client::{Client, ClientKind, CreateClient};
pub use document::{BillingDocument, CreateDocument, DocumentKind, DocumentLine, DocumentState};
pub use employee::{CreateEmployee, Employee};
pub use payment::{Payment, PaymentMethod, RecordPayment};
pub use project::{BillingMode, CreateProject, Project};
pub use work_order::{
    BillingStage, BillingState, LaborEntry, LaborLine, MaterialEntry, MaterialLine, WorkOrder,
    WorkOrderDetails, WorkOrderFilter,
};
