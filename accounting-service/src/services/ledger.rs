//! Payments against billing documents and the balances derived from them.

use crate::models::{BillingDocument, Payment, RecordPayment};
use crate::services::costs::round_money;
use crate::services::metrics::{record_error, PAYMENTS_TOTAL, PAYMENT_AMOUNT_TOTAL};
use crate::services::store::Store;
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Outstanding balance at or below which a document counts as settled.
pub const SETTLEMENT_EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Derived payment status of a billing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Unpaid,
    Partial,
    Settled,
}

impl SettlementStatus {
    pub fn from_amounts(total: Decimal, paid_to_date: Decimal) -> Self {
        if total - paid_to_date <= SETTLEMENT_EPSILON {
            SettlementStatus::Settled
        } else if paid_to_date > Decimal::ZERO {
            SettlementStatus::Partial
        } else {
            SettlementStatus::Unpaid
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementStatus::Unpaid => "unpaid",
            SettlementStatus::Partial => "partial",
            SettlementStatus::Settled => "settled",
        }
    }
}

/// Amounts derived from a document and its payments. Never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentBalance {
    pub document_id: Uuid,
    pub total: Decimal,
    pub paid_to_date: Decimal,
    /// Negative when the client overpaid.
    pub outstanding: Decimal,
    pub status: SettlementStatus,
}

impl DocumentBalance {
    pub fn compute(document: &BillingDocument, payments: &[Payment]) -> Self {
        let paid_to_date: Decimal = payments.iter().map(|p| p.amount).sum();
        let outstanding = document.total - paid_to_date;
        Self {
            document_id: document.document_id,
            total: document.total,
            paid_to_date,
            outstanding,
            status: SettlementStatus::from_amounts(document.total, paid_to_date),
        }
    }

    pub fn is_settled(&self) -> bool {
        self.status == SettlementStatus::Settled
    }
}

/// Open balances across all documents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Receivables {
    pub documents: Vec<DocumentBalance>,
    pub total_outstanding: Decimal,
}

/// Records payments and answers balance questions.
#[derive(Clone)]
pub struct PaymentLedger {
    store: Arc<dyn Store>,
}

impl PaymentLedger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Append a payment. No cap is applied against the remaining balance.
    #[instrument(skip(self, input), fields(document_id = %input.document_id, method = %input.method.as_str()))]
    pub async fn record_payment(&self, input: RecordPayment) -> Result<Payment, AppError> {
        self.check_payment(&input).await.inspect_err(|e| {
            record_error(e);
            warn!(amount = %input.amount, error = %e, "Payment rejected");
        })?;

        let payment = Payment {
            payment_id: Uuid::new_v4(),
            document_id: input.document_id,
            amount: input.amount,
            method: input.method,
            date: input.date,
            note: input
                .note
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            created_utc: Utc::now(),
        };
        self.store.insert_payment(&payment).await?;

        PAYMENTS_TOTAL
            .with_label_values(&[payment.method.as_str()])
            .inc();
        PAYMENT_AMOUNT_TOTAL
            .with_label_values(&[payment.method.as_str()])
            .inc_by(payment.amount.to_f64().unwrap_or_default());

        info!(
            payment_id = %payment.payment_id,
            amount = %payment.amount,
            "Payment recorded"
        );
        Ok(payment)
    }

    /// Total, paid to date, outstanding and settlement status of a document.
    pub async fn balance(&self, document_id: Uuid) -> Result<DocumentBalance, AppError> {
        let document = self.document(document_id).await?;
        let payments = self.store.list_payments(document_id).await?;
        Ok(DocumentBalance::compute(&document, &payments))
    }

    /// Payments of a document, newest first.
    pub async fn list_payments(&self, document_id: Uuid) -> Result<Vec<Payment>, AppError> {
        self.document(document_id).await?;
        self.store.list_payments(document_id).await
    }

    /// Amount to propose for the next payment: the outstanding balance, if any.
    pub async fn suggested_payment_amount(
        &self,
        document_id: Uuid,
    ) -> Result<Option<Decimal>, AppError> {
        let balance = self.balance(document_id).await?;
        Ok((balance.outstanding > Decimal::ZERO).then(|| round_money(balance.outstanding)))
    }

    /// Documents still waiting for money, newest first.
    #[instrument(skip(self))]
    pub async fn receivables(&self) -> Result<Receivables, AppError> {
        let mut receivables = Receivables::default();
        for document in self.store.list_documents(None).await? {
            let payments = self.store.list_payments(document.document_id).await?;
            let balance = DocumentBalance::compute(&document, &payments);
            if balance.outstanding > SETTLEMENT_EPSILON {
                receivables.total_outstanding += balance.outstanding;
                receivables.documents.push(balance);
            }
        }
        Ok(receivables)
    }

    async fn check_payment(&self, input: &RecordPayment) -> Result<(), AppError> {
        if input.amount <= Decimal::ZERO {
            return Err(AppError::ValidationError(anyhow::anyhow!(
                "Payment amount must be positive, got {}",
                input.amount
            )));
        }
        self.document(input.document_id).await?;
        Ok(())
    }

    async fn document(&self, document_id: Uuid) -> Result<BillingDocument, AppError> {
        self.store.get_document(document_id).await?.ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Document {} not found", document_id))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn epsilon_is_one_cent() {
        assert_eq!(SETTLEMENT_EPSILON, dec!(0.01));
    }

    #[test]
    fn nothing_paid_is_unpaid() {
        assert_eq!(
            SettlementStatus::from_amounts(dec!(900), dec!(0)),
            SettlementStatus::Unpaid
        );
    }

    #[test]
    fn some_paid_is_partial() {
        assert_eq!(
            SettlementStatus::from_amounts(dec!(900), dec!(400)),
            SettlementStatus::Partial
        );
        assert_eq!(
            SettlementStatus::from_amounts(dec!(900), dec!(899)),
            SettlementStatus::Partial
        );
    }

    #[test]
    fn within_a_cent_is_settled() {
        assert_eq!(
            SettlementStatus::from_amounts(dec!(900), dec!(900)),
            SettlementStatus::Settled
        );
        assert_eq!(
            SettlementStatus::from_amounts(dec!(900), dec!(899.995)),
            SettlementStatus::Settled
        );
        assert_eq!(
            SettlementStatus::from_amounts(dec!(900), dec!(899.99)),
            SettlementStatus::Settled
        );
        assert_eq!(
            SettlementStatus::from_amounts(dec!(900), dec!(899.98)),
            SettlementStatus::Partial
        );
    }

    #[test]
    fn overpayment_is_settled() {
        assert_eq!(
            SettlementStatus::from_amounts(dec!(900), dec!(1000)),
            SettlementStatus::Settled
        );
    }

    #[test]
    fn zero_total_document_is_settled() {
        assert_eq!(
            SettlementStatus::from_amounts(dec!(0), dec!(0)),
            SettlementStatus::Settled
        );
    }
}
