//! Shape checks shared by the entity payloads.

use rust_decimal::Decimal;

use crate::errors::{Error, Result};

pub(crate) fn non_blank(field: &str, value: &Option<String>) -> Result<()> {
    match value {
        Some(text) if text.trim().is_empty() => {
            Err(Error::validation(format!("{} must not be empty", field)))
        }
        _ => Ok(()),
    }
}

pub(crate) fn non_negative(field: &str, value: &Option<Decimal>) -> Result<()> {
    match value {
        Some(amount) if amount.is_sign_negative() && !amount.is_zero() => {
            Err(Error::validation(format!("{} must not be negative", field)))
        }
        _ => Ok(()),
    }
}

pub(crate) fn one_of(field: &str, value: &Option<String>, allowed: &[&str]) -> Result<()> {
    match value {
        Some(text) if !allowed.contains(&text.as_str()) => Err(Error::validation(format!(
            "{} must be one of: {}",
            field,
            allowed.join(", ")
        ))),
        _ => Ok(()),
    }
}

pub(crate) fn collect_missing(fields: &[(&'static str, bool)]) -> Vec<&'static str> {
    fields
        .iter()
        .filter(|(_, present)| !present)
        .map(|(name, _)| *name)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn negative_zero_is_allowed() {
        assert!(non_negative("amount", &Some(dec!(-0.00))).is_ok());
        assert!(non_negative("amount", &Some(dec!(-0.01))).is_err());
        assert!(non_negative("amount", &None).is_ok());
    }

    #[test]
    fn blank_strings_are_rejected() {
        assert!(non_blank("name", &Some("   ".into())).is_err());
        assert!(non_blank("name", &None).is_ok());
    }

    #[test]
    fn enumerations_are_checked() {
        assert!(one_of("status", &Some("paid".into()), &["pending", "paid"]).is_ok());
        let err = one_of("status", &Some("late".into()), &["pending", "paid"]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation error: status must be one of: pending, paid"
        );
    }
}
