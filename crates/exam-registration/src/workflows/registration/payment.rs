use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use super::domain::{ApplicationId, Category, PaymentRecord, PaymentStatus};
use super::form::{FieldPath, FormData};
use crate::config::FeeSchedule;

pub const EXEMPT_METHOD: &str = "exempted";
pub const GATEWAY_METHOD: &str = "mock_gateway";

/// Fee owed by a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeeAssessment {
    Exempt,
    Due { amount: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaymentError {
    #[error("category must be selected before paying the fee")]
    MissingCategory,
    #[error("unknown category '{0}'")]
    UnknownCategory(String),
    #[error("payment declined: {0}")]
    Declined(String),
}

/// Maps the declared category and disability to the fee owed.
#[derive(Debug, Clone)]
pub struct FeePolicy {
    fees: FeeSchedule,
}

impl FeePolicy {
    pub fn new(fees: FeeSchedule) -> Self {
        Self { fees }
    }

    pub fn assess(&self, category: Category, disabled: bool) -> FeeAssessment {
        if disabled || category.is_fee_exempt() {
            return FeeAssessment::Exempt;
        }

        let amount = match category {
            Category::Obc => self.fees.obc,
            Category::Ews => self.fees.ews,
            _ => self.fees.general,
        };

        if amount == 0 {
            FeeAssessment::Exempt
        } else {
            FeeAssessment::Due { amount }
        }
    }

    /// Reads `otherDetails.category` and `otherDetails.isDisabled` from the form.
    pub fn assess_form(&self, form: &FormData) -> Result<FeeAssessment, PaymentError> {
        let raw = form
            .get(&FieldPath::from_dotted("otherDetails.category"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .ok_or(PaymentError::MissingCategory)?;
        let category =
            Category::parse(raw).ok_or_else(|| PaymentError::UnknownCategory(raw.to_string()))?;

        let disabled = match form.get(&FieldPath::from_dotted("otherDetails.isDisabled")) {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::String(text)) => matches!(text.trim(), "yes" | "true"),
            _ => false,
        };

        Ok(self.assess(category, disabled))
    }
}

/// Confirmation returned by a payment gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayReceipt {
    pub transaction_id: String,
    pub method: &'static str,
}

/// Seam for collecting fees; the portal only ships a mocked gateway.
pub trait PaymentGateway: Send + Sync {
    fn charge(
        &self,
        application: &ApplicationId,
        amount: u32,
    ) -> Result<GatewayReceipt, PaymentError>;
}

/// Accepts every charge and returns a synthetic transaction id.
#[derive(Debug, Clone, Default)]
pub struct MockPaymentGateway;

static TRANSACTION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

impl PaymentGateway for MockPaymentGateway {
    fn charge(
        &self,
        _application: &ApplicationId,
        _amount: u32,
    ) -> Result<GatewayReceipt, PaymentError> {
        let seq = TRANSACTION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        Ok(GatewayReceipt {
            transaction_id: format!("pay_mock_{}{seq:04}", Utc::now().timestamp_millis()),
            method: GATEWAY_METHOD,
        })
    }
}

/// Completed payment row for an exempt candidate.
pub fn exempt_payment(application: &ApplicationId, now: DateTime<Utc>) -> PaymentRecord {
    PaymentRecord {
        id: format!("exempt-{}", application.0),
        application_id: application.clone(),
        amount: 0,
        status: PaymentStatus::Completed,
        method: EXEMPT_METHOD.to_string(),
        paid_at: Some(now),
        created_at: now,
    }
}

pub fn charged_payment(
    application: &ApplicationId,
    amount: u32,
    receipt: GatewayReceipt,
    now: DateTime<Utc>,
) -> PaymentRecord {
    PaymentRecord {
        id: receipt.transaction_id,
        application_id: application.clone(),
        amount,
        status: PaymentStatus::Completed,
        method: receipt.method.to_string(),
        paid_at: Some(now),
        created_at: now,
    }
}

/// Form representation of a payment, stored under the `payment` section.
pub fn payment_section(record: &PaymentRecord) -> Value {
    json!({
        "status": record.status.label(),
        "amount": record.amount,
        "method": record.method,
        "transactionId": record.id,
        "paidAt": record.paid_at.map(|at| at.to_rfc3339()),
    })
}
