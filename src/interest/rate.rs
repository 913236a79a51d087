use chrono::{DateTime, Utc};

use crate::config::{
    self, PARAM_ANNUAL_INTEREST_RATE_CAP, PARAM_ANNUAL_INTEREST_RATE_FLOOR, PARAM_FIXED_INTEREST_RATE,
    PARAM_VARIABLE_INTEREST_RATE, PARAM_VARIABLE_RATE_ADJUSTMENT,
};
use crate::decimal::Rate;
use crate::due_amount::reamortisation::ReamortisationCondition;
use crate::errors::Result;
use crate::vault::Vault;

/// source of the yearly rate a loan accrues at
pub trait InterestRate {
    fn annual_rate(&self, vault: &dyn Vault, at: Option<DateTime<Utc>>) -> Result<Rate>;

    fn monthly_rate(&self, vault: &dyn Vault, at: Option<DateTime<Utc>>) -> Result<Rate> {
        Ok(self.annual_rate(vault, at)?.monthly_rate())
    }
}

/// rate fixed for the life of the loan
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedRate;

impl InterestRate for FixedRate {
    fn annual_rate(&self, vault: &dyn Vault, at: Option<DateTime<Utc>>) -> Result<Rate> {
        Ok(Rate::from_decimal(config::get_decimal(vault, PARAM_FIXED_INTEREST_RATE, at)?))
    }
}

/// market rate plus an account adjustment, bounded by optional floor and cap
#[derive(Debug, Clone, Copy, Default)]
pub struct VariableRate;

impl InterestRate for VariableRate {
    fn annual_rate(&self, vault: &dyn Vault, at: Option<DateTime<Utc>>) -> Result<Rate> {
        let rate = config::get_decimal(vault, PARAM_VARIABLE_INTEREST_RATE, at)?
            + config::get_decimal(vault, PARAM_VARIABLE_RATE_ADJUSTMENT, at)?;
        let cap = config::get_optional_decimal(vault, PARAM_ANNUAL_INTEREST_RATE_CAP, at)?;
        let floor = config::get_optional_decimal(vault, PARAM_ANNUAL_INTEREST_RATE_FLOOR, at)?;

        Ok(Rate::from_decimal(rate).clamp_between(floor.map(Rate::from_decimal), cap.map(Rate::from_decimal)))
    }
}

impl ReamortisationCondition for VariableRate {
    /// a changed monthly rate between the two due dates means the emi is stale
    fn should_trigger_reamortisation(
        &self,
        vault: &dyn Vault,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        _elapsed_term: u32,
    ) -> Result<bool> {
        let before = self.monthly_rate(vault, Some(period_start))?;
        let after = self.monthly_rate(vault, Some(period_end))?;
        if before != after {
            tracing::debug!(%before, %after, "monthly rate changed since last due amount calculation");
        }
        Ok(before != after)
    }
}
