use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("{field} must not be negative (got {value})")]
    NegativeAmount { field: &'static str, value: Decimal },
    #[error("unknown {what}: {value}")]
    UnknownVariant { what: &'static str, value: String },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

impl DomainError {
    /// Guard a money input at the domain edge. Zero is a legitimate figure;
    /// only genuinely negative values are rejected.
    pub fn check_amount(field: &'static str, value: Decimal) -> Result<Decimal, DomainError> {
        if value.is_sign_negative() && !value.is_zero() {
            Err(DomainError::NegativeAmount { field, value })
        } else {
            Ok(value)
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::errors::DomainError;

    #[test]
    fn negative_amounts_are_rejected_with_the_field_name() {
        let err = DomainError::check_amount("total_allocated", Decimal::from(-5)).unwrap_err();
        assert_eq!(err.to_string(), "total_allocated must not be negative (got -5)");
    }

    #[test]
    fn zero_and_positive_amounts_pass() {
        assert!(DomainError::check_amount("balance", Decimal::ZERO).is_ok());
        assert!(DomainError::check_amount("balance", Decimal::from(10)).is_ok());
    }
}
