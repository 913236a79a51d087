use chrono::{DateTime, Utc};

use crate::config::{
    self, PARAM_DUE_AMOUNT_CALCULATION_BLOCKING_FLAGS, PARAM_REPAYMENT_BLOCKING_FLAGS,
    PARAM_REPAYMENT_HOLIDAY_IMPACT_PREFERENCE,
};
use crate::errors::Result;
use crate::types::{Rejection, RepaymentHolidayImpactPreference};
use crate::vault::Vault;

/// decides whether the emi must be recalculated at a due amount calculation
pub trait ReamortisationCondition {
    fn should_trigger_reamortisation(
        &self,
        vault: &dyn Vault,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        elapsed_term: u32,
    ) -> Result<bool>;
}

/// true if any of the conditions asks for reamortisation
pub fn requires_reamortisation(
    conditions: &[&dyn ReamortisationCondition],
    vault: &dyn Vault,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    elapsed_term: u32,
) -> Result<bool> {
    for condition in conditions {
        if condition.should_trigger_reamortisation(vault, period_start, period_end, elapsed_term)? {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn is_due_amount_calculation_blocked(vault: &dyn Vault, at: DateTime<Utc>) -> Result<bool> {
    let flags = config::get_json_list(vault, PARAM_DUE_AMOUNT_CALCULATION_BLOCKING_FLAGS, Some(at))?;
    Ok(vault.any_flag_active(&flags, at))
}

pub fn is_repayment_blocked(vault: &dyn Vault, at: DateTime<Utc>) -> Result<bool> {
    let flags = config::get_json_list(vault, PARAM_REPAYMENT_BLOCKING_FLAGS, Some(at))?;
    Ok(vault.any_flag_active(&flags, at))
}

/// reject repayments while a repayment blocking flag is active
pub fn reject_repayment(vault: &dyn Vault, at: DateTime<Utc>) -> Result<Option<Rejection>> {
    if is_repayment_blocked(vault, at)? {
        return Ok(Some(Rejection::against_terms("Repayments are blocked for this account.")));
    }
    Ok(None)
}

pub fn get_repayment_holiday_impact_preference(
    vault: &dyn Vault,
    at: DateTime<Utc>,
) -> Result<RepaymentHolidayImpactPreference> {
    RepaymentHolidayImpactPreference::from_key(&config::get_union(
        vault,
        PARAM_REPAYMENT_HOLIDAY_IMPACT_PREFERENCE,
        Some(at),
    )?)
}

/// a repayment holiday that was in force at the start of the period and has
/// ended by its end
#[derive(Debug, Clone, Copy, Default)]
pub struct RepaymentHoliday {
    /// only reamortise when the holiday is meant to increase the emi
    pub check_impact_preference: bool,
}

impl RepaymentHoliday {
    pub fn with_impact_preference() -> Self {
        Self {
            check_impact_preference: true,
        }
    }

    fn has_ended(vault: &dyn Vault, period_start: DateTime<Utc>, period_end: DateTime<Utc>) -> Result<bool> {
        Ok(is_due_amount_calculation_blocked(vault, period_start)?
            && !is_due_amount_calculation_blocked(vault, period_end)?)
    }
}

impl ReamortisationCondition for RepaymentHoliday {
    fn should_trigger_reamortisation(
        &self,
        vault: &dyn Vault,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        _elapsed_term: u32,
    ) -> Result<bool> {
        if self.check_impact_preference
            && get_repayment_holiday_impact_preference(vault, period_end)? != RepaymentHolidayImpactPreference::IncreaseEmi
        {
            return Ok(false);
        }

        let ended = Self::has_ended(vault, period_start, period_end)?;
        if ended {
            tracing::debug!(account_id = vault.account_id(), %period_start, %period_end, "repayment holiday ended");
        }
        Ok(ended)
    }
}
