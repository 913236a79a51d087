use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::errors::{LendingError, Result};

/// identifier of a ledger account
pub type AccountId = String;

/// asset every lending balance is held in
pub const DEFAULT_ASSET: &str = "COMMERCIAL_BANK_MONEY";

/// account polarity, fixed at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Tside {
    /// net = debit - credit, used by loans
    #[default]
    Asset,
    /// net = credit - debit
    Liability,
}

impl Tside {
    /// net balance for the given legs under this polarity
    pub fn net(self, credit: Money, debit: Money) -> Money {
        match self {
            Tside::Asset => debit - credit,
            Tside::Liability => credit - debit,
        }
    }
}

/// posting phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Phase {
    #[default]
    Committed,
    PendingIncoming,
    PendingOutgoing,
}

/// elapsed and remaining repayment counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TermDetails {
    pub elapsed_term: u32,
    pub remaining_term: u32,
}

impl TermDetails {
    pub fn new(elapsed_term: u32, remaining_term: u32) -> Self {
        Self {
            elapsed_term,
            remaining_term,
        }
    }
}

/// interest ready for application. rounded and unrounded components are
/// kept apart because each component is rounded on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct InterestAmounts {
    pub emi_accrued: Money,
    pub emi_rounded_accrued: Money,
    pub non_emi_accrued: Money,
    pub non_emi_rounded_accrued: Money,
    pub total_rounded: Money,
}

impl InterestAmounts {
    /// sum of the independently rounded components
    pub fn component_rounded_total(&self) -> Money {
        self.emi_rounded_accrued + self.non_emi_rounded_accrued
    }

    /// sum of the unrounded components
    pub fn total_accrued(&self) -> Money {
        self.emi_accrued + self.non_emi_accrued
    }
}

/// coded reason attached to a rejection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectionReason {
    AgainstTermsAndConditions,
    InsufficientFunds,
    WrongDenomination,
    ClientCustomReason,
}

/// expected business rule violation, surfaced to the caller as a value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub message: String,
    pub reason_code: RejectionReason,
}

impl Rejection {
    pub fn new(message: impl Into<String>, reason_code: RejectionReason) -> Self {
        Self {
            message: message.into(),
            reason_code,
        }
    }

    pub fn against_terms(message: impl Into<String>) -> Self {
        Self::new(message, RejectionReason::AgainstTermsAndConditions)
    }
}

/// what an overpayment does to the schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverpaymentImpactPreference {
    /// keep the emi, finish earlier
    #[default]
    ReduceTerm,
    /// keep the term, lower the emi
    ReduceEmi,
}

impl OverpaymentImpactPreference {
    pub fn from_key(key: &str) -> Result<Self> {
        match key.to_lowercase().as_str() {
            "reduce_term" => Ok(Self::ReduceTerm),
            "reduce_emi" => Ok(Self::ReduceEmi),
            other => Err(LendingError::InvalidParameter {
                name: "overpayment_impact_preference".to_string(),
                message: format!("unknown preference {}", other),
            }),
        }
    }
}

/// what a repayment holiday does to the schedule once it ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RepaymentHolidayImpactPreference {
    /// holiday periods still count towards the term, so the emi goes up
    #[default]
    IncreaseEmi,
    /// holiday periods are added to the end of the term
    IncreaseTerm,
}

impl RepaymentHolidayImpactPreference {
    pub fn from_key(key: &str) -> Result<Self> {
        match key.to_lowercase().as_str() {
            "increase_emi" => Ok(Self::IncreaseEmi),
            "increase_term" => Ok(Self::IncreaseTerm),
            other => Err(LendingError::InvalidParameter {
                name: "repayment_holiday_impact_preference".to_string(),
                message: format!("unknown preference {}", other),
            }),
        }
    }
}
