use thiserror::Error;

use crate::decimal::Money;

/// hard failures. business rule violations are returned as
/// [`crate::types::Rejection`] values instead
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LendingError {
    #[error("missing parameter: {name} has no value and no default")]
    MissingParameter {
        name: String,
    },

    #[error("invalid parameter {name}: {message}")]
    InvalidParameter {
        name: String,
        message: String,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
    },

    #[error("negative amount for {context}: {amount}")]
    NegativeAmount {
        context: String,
        amount: Money,
    },

    #[error("calculation error: {message}")]
    CalculationError {
        message: String,
    },

    #[error("invalid date: {message}")]
    InvalidDate {
        message: String,
    },
}

impl LendingError {
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            LendingError::MissingParameter { .. }
                | LendingError::InvalidParameter { .. }
                | LendingError::InvalidConfiguration { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, LendingError>;

/// reject negative inputs where only non-negative amounts make sense
pub fn ensure_non_negative(context: &str, amount: Money) -> Result<Money> {
    if amount.is_negative() {
        return Err(LendingError::NegativeAmount {
            context: context.to_string(),
            amount,
        });
    }
    Ok(amount)
}
