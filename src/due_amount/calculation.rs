use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::addresses::{DUE_CALC_EVENT_COUNTER, EMI, INTEREST_DUE, INTERNAL_CONTRA, PRINCIPAL, PRINCIPAL_DUE};
use crate::amortisation::{update_emi, Amortisation, AmortisationInputs};
use crate::balances::BalanceSnapshot;
use crate::config;
use crate::decimal::Money;
use crate::due_amount::reamortisation::{requires_reamortisation, ReamortisationCondition};
use crate::errors::Result;
use crate::events::{AccountNotification, HookArguments, DUE_AMOUNT_CALCULATION};
use crate::interest::application::{get_interest_to_apply, interest_application_postings, ApplicationAccounts};
use crate::postings::{create_postings, reset_tracker_balances, standard_instruction_details, CustomInstruction, Posting};
use crate::types::Tside;
use crate::vault::Vault;

pub const REPAYMENT_NOTIFICATION_SUFFIX: &str = "_REPAYMENT";

/// features taking part in a due amount calculation
#[derive(Clone, Copy)]
pub struct DueAmountFeatures<'a> {
    pub amortisation: &'a dyn Amortisation,
    /// false for loans that charge no interest
    pub apply_interest: bool,
    pub reamortisation_conditions: &'a [&'a dyn ReamortisationCondition],
    pub inputs: AmortisationInputs<'a>,
}

pub fn get_principal(balances: &BalanceSnapshot, denomination: &str) -> Money {
    balances.net_at(PRINCIPAL, denomination)
}

pub fn get_emi(balances: &BalanceSnapshot, denomination: &str) -> Money {
    balances.net_at(EMI, denomination)
}

/// principal falling due this period. the final event takes everything left,
/// otherwise the emi less its interest, never more than what is outstanding
pub fn calculate_due_principal(
    remaining_principal: Money,
    emi_interest_to_apply: Money,
    emi: Money,
    is_final_due_event: bool,
) -> Money {
    if is_final_due_event {
        return remaining_principal;
    }
    if !emi.is_positive() {
        return Money::ZERO;
    }
    (emi - emi_interest_to_apply).min(remaining_principal).non_negative()
}

pub fn transfer_principal_due(account_id: &str, principal_due: Money, denomination: &str) -> Vec<Posting> {
    create_postings(principal_due, account_id, PRINCIPAL_DUE, account_id, PRINCIPAL, denomination)
}

pub fn update_due_amount_calculation_counter(account_id: &str, denomination: &str) -> Vec<Posting> {
    create_postings(Money::ONE, account_id, DUE_CALC_EVENT_COUNTER, account_id, INTERNAL_CONTRA, denomination)
}

/// start of the current period: account creation before the first event,
/// the previous execution afterwards
pub fn last_execution_effective_datetime(vault: &dyn Vault, elapsed_term: u32) -> DateTime<Utc> {
    if elapsed_term == 0 {
        return vault.account_creation_datetime();
    }
    vault
        .last_execution_datetime(DUE_AMOUNT_CALCULATION)
        .unwrap_or_else(|| vault.account_creation_datetime())
}

/// move this period's principal and interest to due, recalculating the emi
/// first if any reamortisation condition triggers. `balances` defaults to
/// the balances as of the event
pub fn schedule_logic(
    vault: &dyn Vault,
    hook: &HookArguments,
    account_type: &str,
    features: &DueAmountFeatures<'_>,
    balances: Option<&BalanceSnapshot>,
) -> Result<Vec<CustomInstruction>> {
    let effective_datetime = hook.effective_datetime;
    let fetched;
    let balances = match balances {
        Some(balances) => balances,
        None => {
            fetched = vault.balances_at(effective_datetime);
            &fetched
        }
    };
    let denomination = config::get_denomination(vault)?;
    let account_id = vault.account_id();

    let current_principal = get_principal(balances, &denomination);
    // expected term, so principal adjustments play no part here
    let term = features
        .amortisation
        .term_details(vault, effective_datetime, true, &features.inputs, balances)?;
    let period_start = last_execution_effective_datetime(vault, term.elapsed_term);

    let mut postings = Vec::new();
    let emi_interest_to_apply = if features.apply_interest {
        let accounts = ApplicationAccounts::from_vault(vault)?;
        let amounts = get_interest_to_apply(balances, &denomination, accounts.precision);
        postings.extend(interest_application_postings(account_id, &denomination, &amounts, &accounts));
        amounts.emi_rounded_accrued
    } else {
        Money::ZERO
    };

    let current_emi = get_emi(balances, &denomination);
    let new_emi = if requires_reamortisation(
        features.reamortisation_conditions,
        vault,
        period_start,
        effective_datetime,
        term.elapsed_term,
    )? {
        let new_emi = features.amortisation.calculate_emi(
            vault,
            effective_datetime,
            true,
            Some(current_principal),
            &features.inputs,
            balances,
        )?;
        tracing::debug!(account_id, %current_emi, %new_emi, "reamortising");
        postings.extend(update_emi(account_id, &denomination, current_emi, new_emi));
        new_emi
    } else {
        current_emi
    };

    // remaining term is derived from the principal before this event, so it is 1 on the final one
    let is_final_due_event = term.remaining_term == 1 && !features.amortisation.override_final_event();
    if is_final_due_event {
        tracing::debug!(account_id, %current_principal, "final due amount calculation");
    }
    let principal_due = calculate_due_principal(current_principal, emi_interest_to_apply, new_emi, is_final_due_event);

    postings.extend(transfer_principal_due(account_id, principal_due, &denomination));
    postings.extend(update_due_amount_calculation_counter(account_id, &denomination));

    if postings.is_empty() {
        return Ok(Vec::new());
    }
    Ok(vec![CustomInstruction::new(postings)
        .with_details(standard_instruction_details(
            "Updating due balances",
            hook.event_type_or(DUE_AMOUNT_CALCULATION),
            true,
            account_type,
        ))
        .override_restrictions()])
}

/// counter postings to clear once the loan is closed
pub fn get_residual_cleanup_postings(balances: &BalanceSnapshot, account_id: &str, denomination: &str) -> Vec<Posting> {
    reset_tracker_balances(
        balances,
        account_id,
        &[DUE_CALC_EVENT_COUNTER],
        INTERNAL_CONTRA,
        denomination,
        Tside::Asset,
    )
}

pub fn notification_type(product_name: &str) -> String {
    format!("{}{}", product_name.to_uppercase(), REPAYMENT_NOTIFICATION_SUFFIX)
}

/// notify the customer of what fell due. nothing is sent when nothing is due
pub fn due_amount_notification(
    product_name: &str,
    vault: &dyn Vault,
    instructions: &[CustomInstruction],
    denomination: &str,
    due_datetime: DateTime<Utc>,
) -> Option<AccountNotification> {
    let movements = BalanceSnapshot::new(vault.tside(), None).with_instructions(instructions, vault.account_id());
    let due_principal = movements.net_at(PRINCIPAL_DUE, denomination);
    let due_interest = movements.net_at(INTEREST_DUE, denomination);
    let total_due = due_principal + due_interest;
    if !total_due.is_positive() {
        return None;
    }

    let mut details = BTreeMap::new();
    details.insert("account_id".to_string(), vault.account_id().to_string());
    details.insert("due_principal".to_string(), due_principal.to_string());
    details.insert("due_interest".to_string(), due_interest.to_string());
    details.insert("total_due".to_string(), total_due.to_string());
    details.insert("due_date".to_string(), due_datetime.date_naive().to_string());

    Some(AccountNotification {
        notification_type: notification_type(product_name),
        notification_details: details,
    })
}
