use chrono::{DateTime, Utc};

use crate::addresses::{
    ACCRUED_INTEREST_PENDING_CAPITALISATION, CAPITALISED_INTEREST_TRACKER, INTERNAL_CONTRA, PRINCIPAL,
};
use crate::balances::BalanceSnapshot;
use crate::config::{
    self, PARAM_CAPITALISED_INTEREST_RECEIVABLE_ACCOUNT, PARAM_CAPITALISED_INTEREST_RECEIVED_ACCOUNT,
    PARAM_INTEREST_ACCRUAL_BLOCKING_FLAGS,
};
use crate::errors::Result;
use crate::events::END_OF_REPAYMENT_HOLIDAY;
use crate::interest::application::get_application_precision;
use crate::postings::{
    accrual_application_postings, create_postings, standard_instruction_details, ApplicationLegs, CustomInstruction,
};
use crate::vault::Vault;

/// whether any interest accrual blocking flag is active at `at`
pub fn is_interest_accrual_blocked(vault: &dyn Vault, at: DateTime<Utc>) -> Result<bool> {
    let flags = config::get_json_list(vault, PARAM_INTEREST_ACCRUAL_BLOCKING_FLAGS, Some(at))?;
    Ok(vault.any_flag_active(&flags, at))
}

/// move interest accrued during a holiday onto the principal and track
/// how much was capitalised
pub fn capitalise_interest(
    vault: &dyn Vault,
    balances: &BalanceSnapshot,
    denomination: &str,
    account_type: &str,
) -> Result<Vec<CustomInstruction>> {
    let accrued = balances.net_at(ACCRUED_INTEREST_PENDING_CAPITALISATION, denomination);
    let capitalised = accrued.round_dp(get_application_precision(vault)?);
    if !capitalised.is_positive() {
        return Ok(Vec::new());
    }

    let legs = ApplicationLegs {
        customer_account: vault.account_id().to_string(),
        denomination: denomination.to_string(),
        accrual_customer_address: ACCRUED_INTEREST_PENDING_CAPITALISATION.to_string(),
        accrual_internal_account: config::get_text(vault, PARAM_CAPITALISED_INTEREST_RECEIVABLE_ACCOUNT, None)?,
        application_customer_address: PRINCIPAL.to_string(),
        application_internal_account: config::get_text(vault, PARAM_CAPITALISED_INTEREST_RECEIVED_ACCOUNT, None)?,
        payable: false,
    };

    let mut postings = accrual_application_postings(&legs, capitalised, accrued);
    postings.extend(create_postings(
        capitalised,
        vault.account_id(),
        CAPITALISED_INTEREST_TRACKER,
        vault.account_id(),
        INTERNAL_CONTRA,
        denomination,
    ));

    tracing::debug!(account_id = vault.account_id(), %capitalised, "capitalising interest");

    Ok(vec![CustomInstruction::new(postings)
        .with_details(standard_instruction_details(
            &format!("Capitalise interest accrued to principal of {}", capitalised),
            END_OF_REPAYMENT_HOLIDAY,
            true,
            account_type,
        ))
        .override_restrictions()])
}

/// capitalise pending interest once accrual is no longer blocked
pub fn handle_interest_capitalisation(
    vault: &dyn Vault,
    effective_datetime: DateTime<Utc>,
    account_type: &str,
) -> Result<Vec<CustomInstruction>> {
    if is_interest_accrual_blocked(vault, effective_datetime)? {
        return Ok(Vec::new());
    }
    let denomination = config::get_denomination(vault)?;
    capitalise_interest(vault, &vault.balances_at(effective_datetime), &denomination, account_type)
}
