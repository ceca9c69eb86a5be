//! Structural validation helpers shared by gateway drivers.

use crate::domain::redirect::CallbackRequest;
use crate::error::PaymentError;

/// Requires a parameter to be present and non-empty.
pub fn require_param<'a>(
    callback: &'a CallbackRequest,
    name: &str,
) -> Result<&'a str, PaymentError> {
    let value = callback.require(name)?;
    if value.trim().is_empty() {
        return Err(PaymentError::InvalidRequest(format!(
            "empty parameter: {name}"
        )));
    }
    Ok(value)
}

/// Masks a primary account number, keeping the issuer prefix and the last
/// four digits. Already-short values are masked entirely.
pub fn mask_pan(pan: &str) -> String {
    let digits: String = pan.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() <= 10 {
        return "x".repeat(digits.len());
    }
    let prefix = &digits[..6];
    let suffix = &digits[digits.len() - 4..];
    format!("{}{}{}", prefix, "x".repeat(digits.len() - 10), suffix)
}
