//! Work order model and its billing state machine.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;

/// Billing stage of a work order, without the document link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BillingStage {
    Unbilled,
    WorkCompleted,
    Invoiced,
    Paid,
}

impl BillingStage {
    pub const ALL: [BillingStage; 4] = [
        BillingStage::Unbilled,
        BillingStage::WorkCompleted,
        BillingStage::Invoiced,
        BillingStage::Paid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BillingStage::Unbilled => "unbilled",
            BillingStage::WorkCompleted => "work_completed",
            BillingStage::Invoiced => "invoiced",
            BillingStage::Paid => "paid",
        }
    }
}

impl std::fmt::Display for BillingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Billing state of a work order. The linked variants own the document id,
/// so "linked but not invoiced" cannot be represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum BillingState {
    Unbilled,
    WorkCompleted,
    Invoiced { document_id: Uuid },
    Paid { document_id: Uuid },
}

impl BillingState {
    pub fn stage(&self) -> BillingStage {
        match self {
            BillingState::Unbilled => BillingStage::Unbilled,
            BillingState::WorkCompleted => BillingStage::WorkCompleted,
            BillingState::Invoiced { .. } => BillingStage::Invoiced,
            BillingState::Paid { .. } => BillingStage::Paid,
        }
    }

    pub fn document_id(&self) -> Option<Uuid> {
        match self {
            BillingState::Invoiced { document_id } | BillingState::Paid { document_id } => {
                Some(*document_id)
            }
            BillingState::Unbilled | BillingState::WorkCompleted => None,
        }
    }

    /// Check that moving from `self` to `next` keeps the document link as it
    /// is. Setting or changing a link is reserved to
    /// [`WorkOrder::link_to_document`].
    pub fn ensure_same_link(&self, next: &BillingState) -> Result<(), AppError> {
        if self.document_id() != next.document_id() {
            return Err(AppError::InvalidTransition(anyhow::anyhow!(
                "Cannot move from '{}' to '{}': document links only change through billing",
                self.stage(),
                next.stage()
            )));
        }
        Ok(())
    }

    /// Rebuild a state from its flat stored columns, rejecting rows where the
    /// stage and the document link disagree.
    pub fn from_parts(stage: BillingStage, document_id: Option<Uuid>) -> Result<Self, AppError> {
        match (stage, document_id) {
            (BillingStage::Unbilled, None) => Ok(BillingState::Unbilled),
            (BillingStage::WorkCompleted, None) => Ok(BillingState::WorkCompleted),
            (BillingStage::Invoiced, Some(document_id)) => {
                Ok(BillingState::Invoiced { document_id })
            }
            (BillingStage::Paid, Some(document_id)) => Ok(BillingState::Paid { document_id }),
            (stage, document_id) => Err(AppError::Conflict(anyhow::anyhow!(
                "Inconsistent billing state: stage '{}' with document {:?}",
                stage,
                document_id
            ))),
        }
    }
}

/// Hours worked by one employee, priced at the rate in force when recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaborLine {
    employee_id: Uuid,
    hours: Decimal,
    hourly_rate: Decimal,
}

impl LaborLine {
    pub fn new(employee_id: Uuid, hours: Decimal, hourly_rate: Decimal) -> Result<Self, AppError> {
        if hours < Decimal::ZERO {
            return Err(AppError::ValidationError(anyhow::anyhow!(
                "Hours must not be negative, got {}",
                hours
            )));
        }
        if hourly_rate < Decimal::ZERO {
            return Err(AppError::ValidationError(anyhow::anyhow!(
                "Hourly rate must not be negative, got {}",
                hourly_rate
            )));
        }
        Ok(Self {
            employee_id,
            hours,
            hourly_rate,
        })
    }

    pub fn employee_id(&self) -> Uuid {
        self.employee_id
    }

    pub fn hours(&self) -> Decimal {
        self.hours
    }

    pub fn hourly_rate(&self) -> Decimal {
        self.hourly_rate
    }

    pub fn amount(&self) -> Decimal {
        self.hours * self.hourly_rate
    }
}

/// Material or service consumed, priced at the price applied when recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialLine {
    item_id: Uuid,
    quantity: Decimal,
    applied_price: Decimal,
}

impl MaterialLine {
    pub fn new(item_id: Uuid, quantity: Decimal, applied_price: Decimal) -> Result<Self, AppError> {
        if quantity < Decimal::ZERO {
            return Err(AppError::ValidationError(anyhow::anyhow!(
                "Quantity must not be negative, got {}",
                quantity
            )));
        }
        if applied_price < Decimal::ZERO {
            return Err(AppError::ValidationError(anyhow::anyhow!(
                "Applied price must not be negative, got {}",
                applied_price
            )));
        }
        Ok(Self {
            item_id,
            quantity,
            applied_price,
        })
    }

    pub fn item_id(&self) -> Uuid {
        self.item_id
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn applied_price(&self) -> Decimal {
        self.applied_price
    }

    pub fn amount(&self) -> Decimal {
        self.quantity * self.applied_price
    }
}

/// A dated record of labor and material consumed on a project.
///
/// The billing state is private: it only moves through [`WorkOrder::advance`],
/// [`WorkOrder::link_to_document`] and [`WorkOrder::correct_stage`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkOrder {
    pub work_order_id: Uuid,
    pub project_id: Uuid,
    pub date: NaiveDate,
    pub note: Option<String>,
    billing: BillingState,
    pub labor: Vec<LaborLine>,
    pub materials: Vec<MaterialLine>,
    pub created_utc: DateTime<Utc>,
}

impl WorkOrder {
    /// A fresh, unbilled work order.
    pub fn new(
        project_id: Uuid,
        date: NaiveDate,
        note: Option<String>,
        labor: Vec<LaborLine>,
        materials: Vec<MaterialLine>,
    ) -> Self {
        Self {
            work_order_id: Uuid::new_v4(),
            project_id,
            date,
            note,
            billing: BillingState::Unbilled,
            labor,
            materials,
            created_utc: Utc::now(),
        }
    }

    /// Rebuild a work order read back from a store.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn rehydrate(
        work_order_id: Uuid,
        project_id: Uuid,
        date: NaiveDate,
        note: Option<String>,
        billing: BillingState,
        labor: Vec<LaborLine>,
        materials: Vec<MaterialLine>,
        created_utc: DateTime<Utc>,
    ) -> Self {
        Self {
            work_order_id,
            project_id,
            date,
            note,
            billing,
            labor,
            materials,
            created_utc,
        }
    }

    pub fn billing_state(&self) -> BillingState {
        self.billing
    }

    pub fn stage(&self) -> BillingStage {
        self.billing.stage()
    }

    pub fn document_id(&self) -> Option<Uuid> {
        self.billing.document_id()
    }

    /// Completed work that no document has claimed yet.
    pub fn is_eligible_for_billing(&self) -> bool {
        matches!(self.billing, BillingState::WorkCompleted)
    }

    /// Move one step forward. `WorkCompleted` can only leave through a billing
    /// document; `Paid` is terminal and left unchanged. Returns whether the
    /// state changed.
    pub fn advance(&mut self) -> Result<bool, AppError> {
        match self.billing {
            BillingState::Unbilled => {
                self.billing = BillingState::WorkCompleted;
                Ok(true)
            }
            BillingState::WorkCompleted => Err(AppError::InvalidTransition(anyhow::anyhow!(
                "Work order {} is completed; it must be billed through a billing document",
                self.work_order_id
            ))),
            BillingState::Invoiced { document_id } => {
                self.billing = BillingState::Paid { document_id };
                Ok(true)
            }
            BillingState::Paid { .. } => Ok(false),
        }
    }

    /// Attach the order to a billing document and mark it invoiced in one step.
    /// Re-linking to the same document is a no-op and returns `false`.
    pub fn link_to_document(&mut self, document_id: Uuid) -> Result<bool, AppError> {
        match self.billing {
            BillingState::WorkCompleted => {
                self.billing = BillingState::Invoiced { document_id };
                Ok(true)
            }
            BillingState::Invoiced { document_id: linked }
            | BillingState::Paid { document_id: linked }
                if linked == document_id =>
            {
                Ok(false)
            }
            BillingState::Invoiced { document_id: linked }
            | BillingState::Paid { document_id: linked } => Err(AppError::Conflict(
                anyhow::anyhow!(
                    "Work order {} is already linked to document {}",
                    self.work_order_id,
                    linked
                ),
            )),
            BillingState::Unbilled => Err(AppError::InvalidTransition(anyhow::anyhow!(
                "Work order {} is not completed and cannot be linked to a document",
                self.work_order_id
            ))),
        }
    }

    /// Reclassify the order without crossing the document-link boundary:
    /// `Unbilled <-> WorkCompleted` while unlinked, `Invoiced <-> Paid` while
    /// linked. Returns whether the state changed.
    pub fn correct_stage(&mut self, target: BillingStage) -> Result<bool, AppError> {
        if self.stage() == target {
            return Ok(false);
        }

        let next = match (self.billing, target) {
            (BillingState::Unbilled | BillingState::WorkCompleted, BillingStage::Unbilled) => {
                BillingState::Unbilled
            }
            (BillingState::Unbilled | BillingState::WorkCompleted, BillingStage::WorkCompleted) => {
                BillingState::WorkCompleted
            }
            (
                BillingState::Invoiced { document_id } | BillingState::Paid { document_id },
                BillingStage::Invoiced,
            ) => BillingState::Invoiced { document_id },
            (
                BillingState::Invoiced { document_id } | BillingState::Paid { document_id },
                BillingStage::Paid,
            ) => BillingState::Paid { document_id },
            (current, target) => {
                return Err(AppError::InvalidTransition(anyhow::anyhow!(
                    "Work order {} cannot be corrected from '{}' to '{}'; document links only change through billing",
                    self.work_order_id,
                    current.stage(),
                    target
                )))
            }
        };

        self.billing = next;
        Ok(true)
    }
}

/// Labor to record on a work order. Without an explicit rate the employee's
/// current rate is copied in.
#[derive(Debug, Clone)]
pub struct LaborEntry {
    pub employee_id: Uuid,
    pub hours: Decimal,
    pub hourly_rate: Option<Decimal>,
}

/// Material to record on a work order. Without an explicit price the catalog
/// list price is copied in.
#[derive(Debug, Clone)]
pub struct MaterialEntry {
    pub item_id: Uuid,
    pub quantity: Decimal,
    pub applied_price: Option<Decimal>,
}

/// Editable part of a work order.
#[derive(Debug, Clone)]
pub struct WorkOrderDetails {
    pub date: NaiveDate,
    pub note: Option<String>,
    pub labor: Vec<LaborEntry>,
    pub materials: Vec<MaterialEntry>,
}

/// Filter parameters for listing work orders.
#[derive(Debug, Clone, Default)]
pub struct WorkOrderFilter {
    pub client_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub stage: Option<BillingStage>,
}
