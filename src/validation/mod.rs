use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::error::AppError;

pub const MAX_COMMENT_LEN: usize = 500;
pub const MAX_PER_PAGE: u32 = 100;

/// Collects field-level validation failures before any domain logic runs.
#[derive(Debug, Default)]
pub struct FieldErrors {
    fields: BTreeMap<String, String>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields.entry(field.to_string()).or_insert(message.into());
    }

    pub fn finish(self) -> Result<(), AppError> {
        if self.fields.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self.fields))
        }
    }
}

pub fn validate_credentials(username: &str, password: &str) -> Result<(), AppError> {
    let mut errors = FieldErrors::new();

    let name_ok = (3..=50).contains(&username.len())
        && username.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_');
    if !name_ok {
        errors.add("username", "must be 3-50 characters: letters, digits, underscore");
    }

    if password.len() < 8 {
        errors.add("password", "must be at least 8 characters");
    }

    errors.finish()
}

/// Monetary amounts must be positive and representable in whole cents.
pub fn validate_amount(amount: Decimal) -> Result<(), AppError> {
    let mut errors = FieldErrors::new();

    if amount <= Decimal::ZERO {
        errors.add("amount", "must be positive");
    } else if amount.normalize().scale() > 2 {
        errors.add("amount", "supports at most 2 decimal places");
    }

    errors.finish()
}

pub fn validate_comment(comment: Option<&str>) -> Result<(), AppError> {
    let mut errors = FieldErrors::new();

    if comment.is_some_and(|c| c.chars().count() > MAX_COMMENT_LEN) {
        errors.add("comment", format!("must be at most {} characters", MAX_COMMENT_LEN));
    }

    errors.finish()
}

/// Normalizes pagination input: 1-based page, bounded page size.
pub fn validate_pagination(page: Option<u32>, per_page: Option<u32>) -> Result<(u32, u32), AppError> {
    let page = page.unwrap_or(1);
    let per_page = per_page.unwrap_or(20);

    let mut errors = FieldErrors::new();
    if page == 0 {
        errors.add("page", "pages are numbered from 1");
    }
    if per_page == 0 || per_page > MAX_PER_PAGE {
        errors.add("per_page", format!("must be between 1 and {}", MAX_PER_PAGE));
    }
    errors.finish()?;

    Ok((page, per_page))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(err: AppError) -> BTreeMap<String, String> {
        match err {
            AppError::Validation(fields) => fields,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn accepts_valid_credentials() {
        assert!(validate_credentials("alice_99", "correcthorse").is_ok());
    }

    #[test]
    fn reports_each_bad_field() {
        let err = validate_credentials("a!", "short").unwrap_err();
        let fields = fields(err);
        assert!(fields.contains_key("username"));
        assert!(fields.contains_key("password"));
    }

    #[test]
    fn comment_length_cap() {
        assert!(validate_comment(None).is_ok());
        assert!(validate_comment(Some("stolen wallet")).is_ok());
        let long = "x".repeat(MAX_COMMENT_LEN + 1);
        assert!(validate_comment(Some(&long)).is_err());
    }

    #[test]
    fn amount_must_be_positive_whole_cents() {
        use rust_decimal_macros::dec;

        assert!(validate_amount(dec!(0.01)).is_ok());
        assert!(validate_amount(dec!(1000)).is_ok());
        // Trailing zeros beyond two places are still whole cents.
        assert!(validate_amount(dec!(2.500)).is_ok());

        assert!(fields(validate_amount(dec!(0)).unwrap_err()).contains_key("amount"));
        assert!(fields(validate_amount(dec!(-5)).unwrap_err()).contains_key("amount"));
        assert!(fields(validate_amount(dec!(0.001)).unwrap_err()).contains_key("amount"));
    }

    #[test]
    fn pagination_defaults_and_bounds() {
        assert_eq!(validate_pagination(None, None).unwrap(), (1, 20));
        assert_eq!(validate_pagination(Some(3), Some(50)).unwrap(), (3, 50));
        assert!(validate_pagination(Some(0), None).is_err());
        assert!(validate_pagination(None, Some(1000)).is_err());
    }
}
