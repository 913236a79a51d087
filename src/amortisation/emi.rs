use chrono::{DateTime, Utc};

use crate::addresses::{EMI, INTERNAL_CONTRA};
use crate::amortisation::{Amortisation, AmortisationInputs};
use crate::balances::BalanceSnapshot;
use crate::config;
use crate::decimal::Money;
use crate::errors::Result;
use crate::postings::{create_postings, CustomInstruction, Posting};
use crate::vault::Vault;

/// postings moving the EMI tracker from `current_emi` to `updated_emi`
pub fn update_emi(account_id: &str, denomination: &str, current_emi: Money, updated_emi: Money) -> Vec<Posting> {
    let delta = current_emi - updated_emi;
    if delta.is_negative() {
        create_postings(delta.abs(), account_id, EMI, account_id, INTERNAL_CONTRA, denomination)
    } else {
        create_postings(delta, account_id, INTERNAL_CONTRA, account_id, EMI, denomination)
    }
}

/// (re)calculate the emi and record it. without balances the loan is treated
/// as fresh, i.e. no emi and no elapsed term
pub fn amortise(
    vault: &dyn Vault,
    effective_datetime: DateTime<Utc>,
    amortisation: &dyn Amortisation,
    principal_amount: Option<Money>,
    inputs: &AmortisationInputs<'_>,
    balances: Option<&BalanceSnapshot>,
    event: &str,
) -> Result<Vec<CustomInstruction>> {
    let fresh = BalanceSnapshot::new(vault.tside(), None);
    let snapshot = balances.unwrap_or(&fresh);

    let updated_emi = amortisation.calculate_emi(vault, effective_datetime, true, principal_amount, inputs, snapshot)?;
    let denomination = config::get_denomination(vault)?;
    let current_emi = match balances {
        Some(balances) => balances.net_at(EMI, &denomination),
        None => Money::ZERO,
    };

    let postings = update_emi(vault.account_id(), &denomination, current_emi, updated_emi);
    if postings.is_empty() {
        return Ok(Vec::new());
    }

    tracing::debug!(account_id = vault.account_id(), %current_emi, %updated_emi, "updating emi");

    Ok(vec![CustomInstruction::new(postings)
        .with_description(format!("Updating EMI to {}", updated_emi))
        .with_event(event)])
}

/// emi held on the account, rounded to 2dp
pub fn get_expected_emi(balances: &BalanceSnapshot, denomination: &str) -> Money {
    balances.rounded_net_at(EMI, denomination, 2)
}
