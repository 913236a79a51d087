use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::addresses::{
    ACCRUED_EXPECTED_INTEREST, ALL_OUTSTANDING, DEFAULT, EMI_PRINCIPAL_EXCESS, INTERNAL_CONTRA, OVERPAYMENT,
    OVERPAYMENT_SINCE_LAST_DUE_CALC, PENALTIES, PRINCIPAL,
};
use crate::amortisation::PrincipalAdjustment;
use crate::balances::BalanceSnapshot;
use crate::config::{
    self, PARAM_OVERPAYMENT_FEE_INCOME_ACCOUNT, PARAM_OVERPAYMENT_FEE_RATE, PARAM_OVERPAYMENT_IMPACT_PREFERENCE,
};
use crate::decimal::Money;
use crate::due_amount::reamortisation::ReamortisationCondition;
use crate::errors::Result;
use crate::events::CHARGE_OVERPAYMENT_FEE;
use crate::interest::application::{get_application_precision, get_interest_to_apply, repay_accrued_interest};
use crate::payments::repayment::{get_outstanding_principal, get_total_outstanding_debt, REPAYMENT_PRECISION};
use crate::postings::{create_postings, reset_tracker_balances, CustomInstruction, Posting};
use crate::types::{OverpaymentImpactPreference, Rejection, Tside};
use crate::vault::Vault;

/// trackers reset at every due amount calculation
pub const DUE_CALC_TRACKERS: [&str; 2] = [ACCRUED_EXPECTED_INTEREST, OVERPAYMENT_SINCE_LAST_DUE_CALC];

pub fn get_overpayment_fee_rate(vault: &dyn Vault) -> Result<Decimal> {
    config::get_decimal(vault, PARAM_OVERPAYMENT_FEE_RATE, None)
}

pub fn get_overpayment_preference(vault: &dyn Vault, at: Option<DateTime<Utc>>) -> Result<OverpaymentImpactPreference> {
    OverpaymentImpactPreference::from_key(&config::get_union(vault, PARAM_OVERPAYMENT_IMPACT_PREFERENCE, at)?)
}

/// largest fee an overpayment can attract: the fee on the overpayment that
/// exactly clears the principal once the fee is taken out of it.
///
/// X - X*r = P, so the fee is P/(1-r) - P. a rate of 1 or more charges nothing
pub fn get_max_overpayment_fee(fee_rate: Decimal, principal: Money, precision: u32) -> Money {
    if fee_rate >= Decimal::ONE {
        return Money::ZERO;
    }
    let maximum_overpayment = principal / (Decimal::ONE - fee_rate);
    (maximum_overpayment - principal).round_dp(precision)
}

/// fee on an overpayment. a rate of 1 or more charges nothing
pub fn get_overpayment_fee(principal_repaid: Money, fee_rate: Decimal, precision: u32) -> Money {
    if fee_rate >= Decimal::ONE {
        return Money::ZERO;
    }
    (principal_repaid * fee_rate).round_dp(precision)
}

/// fee on `overpayment_amount`, capped at the maximum fee for the principal
/// outstanding before the overpayment
pub fn get_capped_overpayment_fee(
    vault: &dyn Vault,
    overpayment_amount: Money,
    balances: &BalanceSnapshot,
    denomination: &str,
) -> Result<Money> {
    let fee_rate = get_overpayment_fee_rate(vault)?;
    let principal = get_outstanding_principal(balances, denomination);
    let max_fee = get_max_overpayment_fee(fee_rate, principal, REPAYMENT_PRECISION);
    Ok(get_overpayment_fee(overpayment_amount, fee_rate, REPAYMENT_PRECISION).min(max_fee))
}

/// most a single repayment may be: all outstanding debt plus the largest possible fee
pub fn get_max_overpayment_amount(vault: &dyn Vault, balances: &BalanceSnapshot, denomination: &str) -> Result<Money> {
    let fee_rate = get_overpayment_fee_rate(vault)?;
    let principal = get_outstanding_principal(balances, denomination);
    Ok(get_total_outstanding_debt(balances, denomination) + get_max_overpayment_fee(fee_rate, principal, REPAYMENT_PRECISION))
}

/// reject repayments exceeding everything owed plus the maximum fee
pub fn validate_overpayment(
    vault: &dyn Vault,
    repayment_amount: Money,
    balances: &BalanceSnapshot,
    denomination: &str,
) -> Result<Option<Rejection>> {
    if !repayment_amount.is_positive() {
        return Ok(None);
    }
    if repayment_amount > get_max_overpayment_amount(vault, balances, denomination)? {
        return Ok(Some(Rejection::against_terms("Cannot pay more than is owed.")));
    }
    Ok(None)
}

/// the same limit applied to a repayment split across several loans. the fee
/// rate comes from the supervising account
pub fn validate_overpayment_across_supervisees(
    main_vault: &dyn Vault,
    repayment_amount: Money,
    denomination: &str,
    supervisee_balances: &[&BalanceSnapshot],
) -> Result<Option<Rejection>> {
    let fee_rate = get_overpayment_fee_rate(main_vault)?;
    let merged = BalanceSnapshot::merged(supervisee_balances, Tside::Asset);

    let max_fee = get_max_overpayment_fee(fee_rate, merged.net_at(PRINCIPAL, denomination), REPAYMENT_PRECISION);
    let total_outstanding = merged
        .sum_nets(&ALL_OUTSTANDING, denomination)
        .round_dp(REPAYMENT_PRECISION);
    let max_repayment = (max_fee + total_outstanding).round_dp(REPAYMENT_PRECISION);

    if repayment_amount > max_repayment {
        return Ok(Some(Rejection::against_terms(format!(
            "The repayment amount {} {} exceeds the total maximum repayment amount of {} {}.",
            repayment_amount, denomination, max_repayment, denomination
        ))));
    }
    Ok(None)
}

/// charge the fee as a penalty owed by the customer
pub fn charge_overpayment_fee(
    vault: &dyn Vault,
    overpayment_amount: Money,
    overpayment_fee: Money,
    denomination: &str,
) -> Result<Vec<CustomInstruction>> {
    let income_account = config::get_text(vault, PARAM_OVERPAYMENT_FEE_INCOME_ACCOUNT, None)?;
    let postings = create_postings(
        overpayment_fee,
        vault.account_id(),
        PENALTIES,
        &income_account,
        DEFAULT,
        denomination,
    );
    if postings.is_empty() {
        return Ok(Vec::new());
    }

    tracing::debug!(account_id = vault.account_id(), %overpayment_amount, %overpayment_fee, "overpayment fee charged");
    Ok(vec![CustomInstruction::new(postings)
        .with_description(format!(
            "Charge overpayment fee of {} on overpayment of {}",
            overpayment_fee, overpayment_amount
        ))
        .with_event(CHARGE_OVERPAYMENT_FEE)
        .with_detail("gl_impacted", "true")
        .override_restrictions()])
}

/// route an overpayment to principal first, tracking how much was overpaid,
/// then use anything left to repay accrued interest
pub fn handle_overpayment(
    vault: &dyn Vault,
    overpayment_amount: Money,
    denomination: &str,
    balances: &BalanceSnapshot,
) -> Result<Vec<Posting>> {
    if !overpayment_amount.is_positive() {
        return Ok(Vec::new());
    }

    let account_id = vault.account_id();
    let outstanding_principal = get_outstanding_principal(balances, denomination);
    let to_principal = overpayment_amount.min(outstanding_principal).non_negative();

    let mut postings = Vec::new();
    if to_principal.is_positive() {
        postings.extend(create_postings(to_principal, account_id, DEFAULT, account_id, PRINCIPAL, denomination));
        for tracker in [OVERPAYMENT, OVERPAYMENT_SINCE_LAST_DUE_CALC] {
            postings.extend(create_postings(to_principal, account_id, tracker, account_id, INTERNAL_CONTRA, denomination));
        }
    }

    let remaining = overpayment_amount - to_principal;
    tracing::debug!(account_id, %to_principal, %remaining, "overpayment routed");
    postings.extend(repay_accrued_interest(vault, remaining, balances, denomination)?);
    Ok(postings)
}

/// principal repaid through emis beyond what was expected, because
/// overpayments lowered the interest that accrued since
pub fn track_emi_principal_excess(
    vault: &dyn Vault,
    balances: &BalanceSnapshot,
    denomination: &str,
) -> Result<Vec<CustomInstruction>> {
    let precision = get_application_precision(vault)?;
    // expected interest covers emi and non-emi interest, so compare with the total
    let actual_interest = get_interest_to_apply(balances, denomination, precision).total_rounded;
    let expected_interest = balances.rounded_net_at(ACCRUED_EXPECTED_INTEREST, denomination, precision);

    let postings = create_postings(
        expected_interest - actual_interest,
        vault.account_id(),
        EMI_PRINCIPAL_EXCESS,
        vault.account_id(),
        INTERNAL_CONTRA,
        denomination,
    );
    if postings.is_empty() {
        return Ok(Vec::new());
    }
    Ok(vec![CustomInstruction::new(postings)
        .with_description(format!(
            "Increase principal excess due to expected interest {} being larger than actual interest {}",
            expected_interest, actual_interest
        ))
        .override_restrictions()])
}

pub fn reset_due_amount_calc_overpayment_trackers(
    account_id: &str,
    balances: &BalanceSnapshot,
    denomination: &str,
) -> Vec<CustomInstruction> {
    let postings = reset_tracker_balances(
        balances,
        account_id,
        &DUE_CALC_TRACKERS,
        INTERNAL_CONTRA,
        denomination,
        Tside::Asset,
    );
    if postings.is_empty() {
        return Vec::new();
    }
    vec![CustomInstruction::new(postings)
        .with_description("Resetting overpayment trackers")
        .override_restrictions()]
}

/// tracker postings to clear once the loan is closed
pub fn get_residual_cleanup_postings(balances: &BalanceSnapshot, account_id: &str, denomination: &str) -> Vec<Posting> {
    reset_tracker_balances(
        balances,
        account_id,
        &[ACCRUED_EXPECTED_INTEREST, EMI_PRINCIPAL_EXCESS, OVERPAYMENT, OVERPAYMENT_SINCE_LAST_DUE_CALC],
        INTERNAL_CONTRA,
        denomination,
        Tside::Asset,
    )
}

/// overpayments either shorten the term, keeping the emi, or lower the emi
/// at the next due amount calculation, keeping the term
#[derive(Debug, Clone, Copy, Default)]
pub struct OverpaymentFeature;

impl ReamortisationCondition for OverpaymentFeature {
    /// the tracker holds every overpayment since the last due amount
    /// calculation, so only the period end matters
    fn should_trigger_reamortisation(
        &self,
        vault: &dyn Vault,
        _period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        _elapsed_term: u32,
    ) -> Result<bool> {
        if get_overpayment_preference(vault, Some(period_end))? != OverpaymentImpactPreference::ReduceEmi {
            return Ok(false);
        }
        let denomination = config::get_denomination(vault)?;
        let overpaid = vault
            .balances_at(period_end)
            .net_at(OVERPAYMENT_SINCE_LAST_DUE_CALC, &denomination);
        Ok(overpaid.is_positive())
    }
}

impl PrincipalAdjustment for OverpaymentFeature {
    /// principal as if no overpayment had been made, so reducing the term
    /// keeps the emi unchanged
    fn calculate_principal_adjustment(
        &self,
        vault: &dyn Vault,
        balances: &BalanceSnapshot,
        denomination: &str,
    ) -> Result<Money> {
        match get_overpayment_preference(vault, None)? {
            OverpaymentImpactPreference::ReduceEmi => Ok(Money::ZERO),
            OverpaymentImpactPreference::ReduceTerm => {
                Ok(balances.sum_nets(&[OVERPAYMENT, EMI_PRINCIPAL_EXCESS], denomination))
            }
        }
    }
}
