use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::{LendingError, Result};
use crate::types::Tside;
use crate::vault::Vault;

// loan terms
pub const PARAM_DENOMINATION: &str = "denomination";
pub const PARAM_PRINCIPAL: &str = "principal";
pub const PARAM_TOTAL_REPAYMENT_COUNT: &str = "total_repayment_count";
pub const PARAM_DEPOSIT_ACCOUNT: &str = "deposit_account";

// interest rate
pub const PARAM_FIXED_INTEREST_RATE: &str = "fixed_interest_rate";
pub const PARAM_VARIABLE_INTEREST_RATE: &str = "variable_interest_rate";
pub const PARAM_VARIABLE_RATE_ADJUSTMENT: &str = "variable_rate_adjustment";
pub const PARAM_ANNUAL_INTEREST_RATE_CAP: &str = "annual_interest_rate_cap";
pub const PARAM_ANNUAL_INTEREST_RATE_FLOOR: &str = "annual_interest_rate_floor";

// accrual and application
pub const PARAM_DAYS_IN_YEAR: &str = "days_in_year";
pub const PARAM_ACCRUAL_PRECISION: &str = "accrual_precision";
pub const PARAM_APPLICATION_PRECISION: &str = "application_precision";
pub const PARAM_ACCRUED_INTEREST_RECEIVABLE_ACCOUNT: &str = "accrued_interest_receivable_account";
pub const PARAM_INTEREST_RECEIVED_ACCOUNT: &str = "interest_received_account";
pub const INTEREST_ACCRUAL_PREFIX: &str = "interest_accrual";

// due amount calculation
pub const PARAM_DUE_AMOUNT_CALCULATION_DAY: &str = "due_amount_calculation_day";
pub const DUE_AMOUNT_CALCULATION_PREFIX: &str = "due_amount_calculation";

// overpayment
pub const PARAM_OVERPAYMENT_FEE_RATE: &str = "overpayment_fee_rate";
pub const PARAM_OVERPAYMENT_FEE_INCOME_ACCOUNT: &str = "overpayment_fee_income_account";
pub const PARAM_OVERPAYMENT_IMPACT_PREFERENCE: &str = "overpayment_impact_preference";

// repayment holiday and capitalisation
pub const PARAM_DUE_AMOUNT_CALCULATION_BLOCKING_FLAGS: &str = "due_amount_calculation_blocking_flags";
pub const PARAM_INTEREST_ACCRUAL_BLOCKING_FLAGS: &str = "interest_accrual_blocking_flags";
pub const PARAM_REPAYMENT_BLOCKING_FLAGS: &str = "repayment_blocking_flags";
pub const PARAM_REPAYMENT_HOLIDAY_IMPACT_PREFERENCE: &str = "repayment_holiday_impact_preference";
pub const PARAM_CAPITALISE_INTEREST_DURING_HOLIDAY: &str = "capitalise_interest_during_holiday";
pub const PARAM_CAPITALISED_INTEREST_RECEIVABLE_ACCOUNT: &str = "capitalised_interest_receivable_account";
pub const PARAM_CAPITALISED_INTEREST_RECEIVED_ACCOUNT: &str = "capitalised_interest_received_account";

pub const REPAYMENT_HOLIDAY_FLAG: &str = "REPAYMENT_HOLIDAY";

/// a parameter value as stored by the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ParameterValue {
    Decimal(Decimal),
    Integer(i64),
    Text(String),
    DateTime(DateTime<Utc>),
    Union(String),
    Boolean(bool),
}

impl ParameterValue {
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            ParameterValue::Decimal(d) => Some(*d),
            ParameterValue::Integer(i) => Some(Decimal::from(*i)),
            ParameterValue::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParameterValue::Integer(i) => Some(*i),
            ParameterValue::Decimal(d) if d.fract().is_zero() => d.to_i64(),
            ParameterValue::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParameterValue::Text(s) | ParameterValue::Union(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParameterValue::Boolean(b) => Some(*b),
            ParameterValue::Text(s) | ParameterValue::Union(s) => Some(s.eq_ignore_ascii_case("true")),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            ParameterValue::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }
}

/// outcome of resolving a parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterLookup {
    Present(ParameterValue),
    Absent,
    AbsentWithDefault(ParameterValue),
}

impl ParameterLookup {
    /// value or default, if any
    pub fn value(&self) -> Option<&ParameterValue> {
        match self {
            ParameterLookup::Present(v) | ParameterLookup::AbsentWithDefault(v) => Some(v),
            ParameterLookup::Absent => None,
        }
    }

    /// value or default, failing when neither exists
    pub fn require(self, name: &str) -> Result<ParameterValue> {
        match self {
            ParameterLookup::Present(v) | ParameterLookup::AbsentWithDefault(v) => Ok(v),
            ParameterLookup::Absent => Err(LendingError::MissingParameter {
                name: name.to_string(),
            }),
        }
    }
}

/// default carried by a parameter definition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterDefault {
    Decimal(Decimal),
    Integer(i64),
    Text(&'static str),
    Union(&'static str),
    Boolean(bool),
}

impl ParameterDefault {
    pub fn to_value(self) -> ParameterValue {
        match self {
            ParameterDefault::Decimal(d) => ParameterValue::Decimal(d),
            ParameterDefault::Integer(i) => ParameterValue::Integer(i),
            ParameterDefault::Text(s) => ParameterValue::Text(s.to_string()),
            ParameterDefault::Union(s) => ParameterValue::Union(s.to_string()),
            ParameterDefault::Boolean(b) => ParameterValue::Boolean(b),
        }
    }
}

/// static description of a parameter the engine reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub default: Option<ParameterDefault>,
}

const fn required(name: &'static str, description: &'static str) -> ParameterDefinition {
    ParameterDefinition {
        name,
        description,
        default: None,
    }
}

const fn defaulted(
    name: &'static str,
    description: &'static str,
    default: ParameterDefault,
) -> ParameterDefinition {
    ParameterDefinition {
        name,
        description,
        default: Some(default),
    }
}

const DEFAULT_BLOCKING_FLAGS: &str = r#"["REPAYMENT_HOLIDAY"]"#;

pub const PARAMETERS: &[ParameterDefinition] = &[
    required(PARAM_DENOMINATION, "Currency of the loan."),
    required(PARAM_PRINCIPAL, "Amount lent to the customer."),
    required(PARAM_TOTAL_REPAYMENT_COUNT, "Number of repayments the loan is amortised over."),
    required(PARAM_DEPOSIT_ACCOUNT, "Account the principal is disbursed to on activation."),
    required(PARAM_FIXED_INTEREST_RATE, "Yearly fixed interest rate."),
    required(PARAM_VARIABLE_INTEREST_RATE, "Yearly variable interest rate."),
    defaulted(
        PARAM_VARIABLE_RATE_ADJUSTMENT,
        "Adjustment added to the variable interest rate.",
        ParameterDefault::Decimal(dec!(0)),
    ),
    required(PARAM_ANNUAL_INTEREST_RATE_CAP, "Upper bound of the yearly variable rate."),
    required(PARAM_ANNUAL_INTEREST_RATE_FLOOR, "Lower bound of the yearly variable rate."),
    defaulted(
        PARAM_DAYS_IN_YEAR,
        "Days in the year used to derive the daily rate: actual, 360, 365 or 366.",
        ParameterDefault::Union("365"),
    ),
    defaulted(
        PARAM_ACCRUAL_PRECISION,
        "Decimal places daily accruals are rounded to.",
        ParameterDefault::Integer(5),
    ),
    defaulted(
        PARAM_APPLICATION_PRECISION,
        "Decimal places accrued interest is rounded to when applied.",
        ParameterDefault::Integer(2),
    ),
    defaulted(
        PARAM_ACCRUED_INTEREST_RECEIVABLE_ACCOUNT,
        "Internal account for accrued interest receivable.",
        ParameterDefault::Text("ACCRUED_INTEREST_RECEIVABLE"),
    ),
    defaulted(
        PARAM_INTEREST_RECEIVED_ACCOUNT,
        "Internal account for interest received.",
        ParameterDefault::Text("INTEREST_RECEIVED"),
    ),
    defaulted("interest_accrual_hour", "Hour interest accrues.", ParameterDefault::Integer(0)),
    defaulted("interest_accrual_minute", "Minute interest accrues.", ParameterDefault::Integer(0)),
    defaulted("interest_accrual_second", "Second interest accrues.", ParameterDefault::Integer(0)),
    defaulted(
        PARAM_DUE_AMOUNT_CALCULATION_DAY,
        "Day of the month due amounts are calculated, 1 to 31.",
        ParameterDefault::Integer(28),
    ),
    defaulted("due_amount_calculation_hour", "Hour due amounts are calculated.", ParameterDefault::Integer(0)),
    defaulted("due_amount_calculation_minute", "Minute due amounts are calculated.", ParameterDefault::Integer(0)),
    defaulted("due_amount_calculation_second", "Second due amounts are calculated.", ParameterDefault::Integer(0)),
    defaulted(
        PARAM_OVERPAYMENT_FEE_RATE,
        "Share of an overpayment charged as a fee.",
        ParameterDefault::Decimal(dec!(0.05)),
    ),
    defaulted(
        PARAM_OVERPAYMENT_FEE_INCOME_ACCOUNT,
        "Internal account for overpayment fee income.",
        ParameterDefault::Text("OVERPAYMENT_FEE_INCOME"),
    ),
    defaulted(
        PARAM_OVERPAYMENT_IMPACT_PREFERENCE,
        "Whether overpayments reduce the term or the emi.",
        ParameterDefault::Union("reduce_term"),
    ),
    defaulted(
        PARAM_DUE_AMOUNT_CALCULATION_BLOCKING_FLAGS,
        "Flags that block due amount calculation.",
        ParameterDefault::Text(DEFAULT_BLOCKING_FLAGS),
    ),
    defaulted(
        PARAM_INTEREST_ACCRUAL_BLOCKING_FLAGS,
        "Flags that redirect interest accrual to pending capitalisation.",
        ParameterDefault::Text(DEFAULT_BLOCKING_FLAGS),
    ),
    defaulted(
        PARAM_REPAYMENT_BLOCKING_FLAGS,
        "Flags that block repayments.",
        ParameterDefault::Text(DEFAULT_BLOCKING_FLAGS),
    ),
    defaulted(
        PARAM_REPAYMENT_HOLIDAY_IMPACT_PREFERENCE,
        "Whether a repayment holiday increases the emi or the term.",
        ParameterDefault::Union("increase_emi"),
    ),
    defaulted(
        PARAM_CAPITALISE_INTEREST_DURING_HOLIDAY,
        "Accrue interest for capitalisation while a repayment holiday is active.",
        ParameterDefault::Boolean(true),
    ),
    defaulted(
        PARAM_CAPITALISED_INTEREST_RECEIVABLE_ACCOUNT,
        "Internal account for interest pending capitalisation.",
        ParameterDefault::Text("CAPITALISED_INTEREST_RECEIVABLE"),
    ),
    defaulted(
        PARAM_CAPITALISED_INTEREST_RECEIVED_ACCOUNT,
        "Internal account for capitalised interest.",
        ParameterDefault::Text("CAPITALISED_INTEREST_RECEIVED"),
    ),
];

/// definition registered for `name`
pub fn definition(name: &str) -> Option<&'static ParameterDefinition> {
    PARAMETERS.iter().find(|p| p.name == name)
}

/// default value registered for `name`
pub fn default_for(name: &str) -> Option<ParameterValue> {
    definition(name).and_then(|p| p.default).map(ParameterDefault::to_value)
}

fn invalid(name: &str, expected: &str, value: &ParameterValue) -> LendingError {
    LendingError::InvalidParameter {
        name: name.to_string(),
        message: format!("expected {}, found {:?}", expected, value),
    }
}

pub fn get_decimal(vault: &dyn Vault, name: &str, at: Option<DateTime<Utc>>) -> Result<Decimal> {
    let value = vault.get_parameter(name, at).require(name)?;
    value.as_decimal().ok_or_else(|| invalid(name, "decimal", &value))
}

/// decimal parameter that may legitimately be unset
pub fn get_optional_decimal(vault: &dyn Vault, name: &str, at: Option<DateTime<Utc>>) -> Result<Option<Decimal>> {
    match vault.get_parameter(name, at).value() {
        Some(value) => value
            .as_decimal()
            .map(Some)
            .ok_or_else(|| invalid(name, "decimal", value)),
        None => Ok(None),
    }
}

pub fn get_int(vault: &dyn Vault, name: &str, at: Option<DateTime<Utc>>) -> Result<i64> {
    let value = vault.get_parameter(name, at).require(name)?;
    value.as_int().ok_or_else(|| invalid(name, "integer", &value))
}

/// non-negative integer parameter such as a precision or term
pub fn get_u32(vault: &dyn Vault, name: &str, at: Option<DateTime<Utc>>) -> Result<u32> {
    let raw = get_int(vault, name, at)?;
    u32::try_from(raw).map_err(|_| LendingError::InvalidParameter {
        name: name.to_string(),
        message: format!("expected a non-negative integer, found {}", raw),
    })
}

pub fn get_text(vault: &dyn Vault, name: &str, at: Option<DateTime<Utc>>) -> Result<String> {
    let value = vault.get_parameter(name, at).require(name)?;
    value
        .as_text()
        .map(|s| s.to_string())
        .ok_or_else(|| invalid(name, "text", &value))
}

/// union parameters are compared case-insensitively
pub fn get_union(vault: &dyn Vault, name: &str, at: Option<DateTime<Utc>>) -> Result<String> {
    Ok(get_text(vault, name, at)?.to_lowercase())
}

pub fn get_bool(vault: &dyn Vault, name: &str, at: Option<DateTime<Utc>>) -> Result<bool> {
    let value = vault.get_parameter(name, at).require(name)?;
    value.as_bool().ok_or_else(|| invalid(name, "boolean", &value))
}

/// json encoded list of strings, e.g. blocking flags
pub fn get_json_list(vault: &dyn Vault, name: &str, at: Option<DateTime<Utc>>) -> Result<Vec<String>> {
    let raw = get_text(vault, name, at)?;
    serde_json::from_str(&raw).map_err(|e| LendingError::InvalidParameter {
        name: name.to_string(),
        message: e.to_string(),
    })
}

pub fn get_denomination(vault: &dyn Vault) -> Result<String> {
    get_text(vault, PARAM_DENOMINATION, None)
}

/// hour, minute and second parameters sharing a prefix
pub fn get_schedule_time(vault: &dyn Vault, prefix: &str, at: Option<DateTime<Utc>>) -> Result<(u32, u32, u32)> {
    let hour = get_u32(vault, &format!("{}_hour", prefix), at)?;
    let minute = get_u32(vault, &format!("{}_minute", prefix), at)?;
    let second = get_u32(vault, &format!("{}_second", prefix), at)?;
    if hour > 23 || minute > 59 || second > 59 {
        return Err(LendingError::InvalidParameter {
            name: prefix.to_string(),
            message: format!("{:02}:{:02}:{:02} is not a time of day", hour, minute, second),
        });
    }
    Ok((hour, minute, second))
}

/// parameters and identity used to open a loan account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanConfig {
    pub account_id: String,
    pub creation_datetime: DateTime<Utc>,
    #[serde(default)]
    pub tside: Tside,
    pub parameters: BTreeMap<String, ParameterValue>,
}

impl LoanConfig {
    /// plain declining principal loan on a fixed rate
    pub fn fixed_rate_loan(
        account_id: &str,
        creation_datetime: DateTime<Utc>,
        denomination: &str,
        principal: Decimal,
        fixed_interest_rate: Decimal,
        total_repayment_count: i64,
    ) -> Self {
        let mut parameters = BTreeMap::new();
        parameters.insert(PARAM_DENOMINATION.to_string(), ParameterValue::Text(denomination.to_string()));
        parameters.insert(PARAM_PRINCIPAL.to_string(), ParameterValue::Decimal(principal));
        parameters.insert(PARAM_FIXED_INTEREST_RATE.to_string(), ParameterValue::Decimal(fixed_interest_rate));
        parameters.insert(
            PARAM_TOTAL_REPAYMENT_COUNT.to_string(),
            ParameterValue::Integer(total_repayment_count),
        );

        Self {
            account_id: account_id.to_string(),
            creation_datetime,
            tside: Tside::Asset,
            parameters,
        }
    }

    pub fn with_parameter(mut self, name: &str, value: ParameterValue) -> Self {
        self.parameters.insert(name.to_string(), value);
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| LendingError::InvalidConfiguration {
            message: e.to_string(),
        })
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| LendingError::InvalidConfiguration {
            message: e.to_string(),
        })
    }
}
