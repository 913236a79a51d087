use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, MathematicalOps};

use crate::addresses::{EMI, PRINCIPAL};
use crate::amortisation::{calculate_elapsed_term, Amortisation, AmortisationInputs};
use crate::balances::BalanceSnapshot;
use crate::config::{self, PARAM_PRINCIPAL, PARAM_TOTAL_REPAYMENT_COUNT};
use crate::decimal::{round_decimal, Money, Rate, Rounding};
use crate::errors::{LendingError, Result};
use crate::types::TermDetails;
use crate::vault::Vault;

/// level installment on a declining principal, optionally leaving a lump sum
/// outstanding at the end of the term:
///
/// EMI = (P - L/(1+R)^N) * R * (1+R)^N / ((1+R)^N - 1)
pub fn calculate_declining_balance_payment(
    remaining_principal: Money,
    periodic_rate: Rate,
    remaining_term: u32,
    precision: u32,
    lump_sum: Money,
) -> Result<Money> {
    if remaining_term == 0 {
        return Ok(remaining_principal);
    }

    let r = periodic_rate.as_decimal();
    if r.is_zero() {
        return Ok((remaining_principal / Decimal::from(remaining_term)).round_dp(precision));
    }

    let payment = (Decimal::ONE + r)
        .checked_powu(u64::from(remaining_term))
        .and_then(|compound| {
            let discounted_principal =
                remaining_principal.as_decimal().checked_sub(lump_sum.as_decimal().checked_div(compound)?)?;
            discounted_principal
                .checked_mul(r)?
                .checked_mul(compound)?
                .checked_div(compound.checked_sub(Decimal::ONE)?)
        })
        .ok_or_else(|| LendingError::CalculationError {
            message: format!(
                "payment for {} over {} terms at {} is out of range",
                remaining_principal, remaining_term, r
            ),
        })?;

    Ok(Money::from_decimal(payment).round_dp(precision))
}

/// terms left to repay `remaining_principal` at `emi`, counting a partial
/// term as a full one
pub fn calculate_remaining_term(emi: Money, remaining_principal: Money, monthly_rate: Rate) -> Result<u32> {
    if emi.is_zero() {
        return Ok(0);
    }

    let emi = emi.as_decimal();
    let principal = remaining_principal.as_decimal();
    let r = monthly_rate.as_decimal();

    let terms = if r > Decimal::ZERO {
        let monthly_interest = principal * r;
        if emi <= monthly_interest {
            return Err(LendingError::CalculationError {
                message: format!("emi {} does not cover monthly interest {}", emi, monthly_interest),
            });
        }
        let numerator = (emi / (emi - monthly_interest)).checked_ln();
        let denominator = (Decimal::ONE + r).checked_ln();
        match (numerator, denominator) {
            (Some(n), Some(d)) if !d.is_zero() => n / d,
            _ => {
                return Err(LendingError::CalculationError {
                    message: format!("cannot derive remaining term for emi {} and rate {}", emi, r),
                })
            }
        }
    } else {
        principal / emi
    };

    round_decimal(terms, 2, Rounding::HalfUp)
        .ceil()
        .to_u32()
        .ok_or_else(|| LendingError::CalculationError {
            message: format!("remaining term {} out of range", terms),
        })
}

/// standard annuity amortisation
#[derive(Debug, Clone, Copy, Default)]
pub struct DecliningPrincipal;

impl Amortisation for DecliningPrincipal {
    fn calculate_emi(
        &self,
        vault: &dyn Vault,
        effective_datetime: DateTime<Utc>,
        use_expected_term: bool,
        principal_amount: Option<Money>,
        inputs: &AmortisationInputs<'_>,
        balances: &BalanceSnapshot,
    ) -> Result<Money> {
        let principal = match principal_amount {
            Some(amount) => amount,
            None => Money::from_decimal(config::get_decimal(vault, PARAM_PRINCIPAL, None)?),
        };
        let monthly_rate = inputs.monthly_rate(vault, effective_datetime)?;
        let remaining_term = self
            .term_details(vault, effective_datetime, use_expected_term, inputs, balances)?
            .remaining_term;

        let denomination = config::get_denomination(vault)?;
        let principal = principal + inputs.principal_adjustment(vault, balances, &denomination)?;

        calculate_declining_balance_payment(principal, monthly_rate, remaining_term, 2, Money::ZERO)
    }

    /// remaining term is derived from the emi unless the expected term is
    /// requested. the derived value is not capped by the expected term
    fn term_details(
        &self,
        vault: &dyn Vault,
        effective_datetime: DateTime<Utc>,
        use_expected_term: bool,
        inputs: &AmortisationInputs<'_>,
        balances: &BalanceSnapshot,
    ) -> Result<TermDetails> {
        let original_term = config::get_u32(vault, PARAM_TOTAL_REPAYMENT_COUNT, None)?;
        if effective_datetime == vault.account_creation_datetime() {
            return Ok(TermDetails::new(0, original_term));
        }

        let denomination = config::get_denomination(vault)?;
        let principal = balances.net_at(PRINCIPAL, &denomination);
        let elapsed = calculate_elapsed_term(balances, &denomination);
        let expected_remaining = if principal.is_positive() {
            original_term.saturating_sub(elapsed)
        } else {
            0
        };

        let emi = balances.net_at(EMI, &denomination);
        if use_expected_term || emi.is_zero() || !principal.is_positive() {
            return Ok(TermDetails::new(elapsed, expected_remaining));
        }

        // adjustments only feed emi recalculation, overpayments must shorten the derived term
        let remaining = calculate_remaining_term(emi, principal, inputs.monthly_rate(vault, effective_datetime)?)?;

        Ok(TermDetails::new(elapsed, remaining))
    }
}
