//! Services module for accounting-service.

pub mod costs;
pub mod database;
pub mod documents;
pub mod ledger;
pub mod lifecycle;
pub mod master_data;
pub mod memory;
pub mod metrics;
pub mod store;
pub mod summary;

pub use costs::{round_money, CostBreakdown, MONEY_DECIMAL_PLACES};
pub use database::Database;
pub use documents::{DocumentBuilder, ReconciliationReport};
pub use ledger::{
    DocumentBalance, PaymentLedger, Receivables, SettlementStatus, SETTLEMENT_EPSILON,
};
pub use lifecycle::Lifecycle;
pub use master_data::MasterData;
pub use memory::MemoryStore;
pub use metrics::{get_metrics, init_metrics, record_error};
pub use store::Store;
pub use summary::{ClientSummary, ProjectSummary, QuoteAnalysis, Reports, StageSummary};
