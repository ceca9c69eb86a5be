//! Monetary value type with currency-unit conversion.
//!
//! The two domestic currency codes are interchangeable: one toman (`IRT`)
//! is ten rials (`IRR`). Conversions to a domestic unit are only defined for
//! those two codes; any other currency refuses to convert. Comparison is
//! defined within a single currency, or across the two domestic codes after
//! converting both sides down to rials.

use std::cmp::Ordering;

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Domestic minor unit (rial).
pub const CURRENCY_RIAL: &str = "IRR";
/// Domestic major unit (toman); 1 IRT = 10 IRR.
pub const CURRENCY_TOMAN: &str = "IRT";

const TOMAN_TO_RIAL: u32 = 10;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount must not be negative: {0}")]
    Negative(String),

    #[error("amount must have at most two decimal places: {0}")]
    TooPrecise(String),

    #[error("currency not convertible to a domestic unit: {0}")]
    NotConvertible(String),

    #[error("amounts in {left} and {right} are incomparable")]
    Incomparable { left: String, right: String },
}

/// A monetary value bound to a currency code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Amount {
    total: BigDecimal,
    currency: String,
}

impl Amount {
    /// Builds an amount, rejecting negative totals and totals with more than
    /// two decimal places.
    pub fn new(total: BigDecimal, currency: impl Into<String>) -> Result<Self, AmountError> {
        if total < BigDecimal::from(0) {
            return Err(AmountError::Negative(total.to_string()));
        }
        let (_, scale) = total.normalized().as_bigint_and_exponent();
        if scale > 2 {
            return Err(AmountError::TooPrecise(total.to_string()));
        }
        Ok(Self {
            total,
            currency: currency.into(),
        })
    }

    pub fn total(&self) -> &BigDecimal {
        &self.total
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    fn is_domestic(&self) -> bool {
        self.currency == CURRENCY_RIAL || self.currency == CURRENCY_TOMAN
    }

    /// Converts to rials. Fails for non-domestic currencies.
    pub fn to_minor_unit(&self) -> Result<Amount, AmountError> {
        match self.currency.as_str() {
            CURRENCY_RIAL => Ok(self.clone()),
            CURRENCY_TOMAN => Ok(Amount {
                total: &self.total * BigDecimal::from(TOMAN_TO_RIAL),
                currency: CURRENCY_RIAL.to_string(),
            }),
            other => Err(AmountError::NotConvertible(other.to_string())),
        }
    }

    /// Converts to tomans. Fails for non-domestic currencies.
    pub fn to_major_unit(&self) -> Result<Amount, AmountError> {
        match self.currency.as_str() {
            CURRENCY_TOMAN => Ok(self.clone()),
            CURRENCY_RIAL => Ok(Amount {
                total: &self.total / BigDecimal::from(TOMAN_TO_RIAL),
                currency: CURRENCY_TOMAN.to_string(),
            }),
            other => Err(AmountError::NotConvertible(other.to_string())),
        }
    }

    /// Total-order comparison. Amounts in the same currency compare directly;
    /// amounts in the two domestic codes compare after conversion to rials;
    /// everything else is incomparable.
    pub fn compare(&self, other: &Amount) -> Result<Ordering, AmountError> {
        if self.currency == other.currency {
            return Ok(self.total.cmp(&other.total));
        }
        if self.is_domestic() && other.is_domestic() {
            let left = self.to_minor_unit()?;
            let right = other.to_minor_unit()?;
            return Ok(left.total.cmp(&right.total));
        }
        Err(AmountError::Incomparable {
            left: self.currency.clone(),
            right: other.currency.clone(),
        })
    }
}

/// Equality is comparison returning `Equal`; an incomparable pair is simply
/// not equal, never an error.
impl PartialEq for Amount {
    fn eq(&self, other: &Self) -> bool {
        matches!(self.compare(other), Ok(Ordering::Equal))
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.total, self.currency)
    }
}
