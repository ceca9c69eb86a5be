//! Declarative anti-tampering field matching.
//!
//! A `FieldMatch` names the record fields a settlement result must
//! reproduce to be accepted. Declared fields are checked in a fixed order
//! (order id, reference id, token, amount) and the first mismatch wins; an
//! empty specification always matches.

use super::amount::Amount;
use super::transaction::TransactionRecord;

#[derive(Debug, Clone, Default)]
pub struct FieldMatch {
    order_id: Option<String>,
    reference_id: Option<String>,
    token: Option<String>,
    amount: Option<Amount>,
}

impl FieldMatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order_id(mut self, value: impl Into<String>) -> Self {
        self.order_id = Some(value.into());
        self
    }

    pub fn reference_id(mut self, value: impl Into<String>) -> Self {
        self.reference_id = Some(value.into());
        self
    }

    pub fn token(mut self, value: impl Into<String>) -> Self {
        self.token = Some(value.into());
        self
    }

    pub fn amount(mut self, value: Amount) -> Self {
        self.amount = Some(value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.order_id.is_none()
            && self.reference_id.is_none()
            && self.token.is_none()
            && self.amount.is_none()
    }

    /// Checks every declared field against the stored record.
    pub fn matches(&self, record: &TransactionRecord) -> bool {
        if let Some(order_id) = &self.order_id {
            if *order_id != record.order_id {
                return false;
            }
        }
        if let Some(reference_id) = &self.reference_id {
            if record.reference_id.as_deref() != Some(reference_id.as_str()) {
                return false;
            }
        }
        if let Some(token) = &self.token {
            if record.token.as_deref() != Some(token.as_str()) {
                return false;
            }
        }
        if let Some(amount) = &self.amount {
            if *amount != record.amount {
                return false;
            }
        }
        true
    }
}
