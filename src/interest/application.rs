use crate::addresses::{ACCRUED_INTEREST, DEFAULT, INTEREST_DUE, NON_EMI_ACCRUED_INTEREST};
use crate::balances::BalanceSnapshot;
use crate::config::{self, PARAM_ACCRUED_INTEREST_RECEIVABLE_ACCOUNT, PARAM_APPLICATION_PRECISION, PARAM_INTEREST_RECEIVED_ACCOUNT};
use crate::decimal::Money;
use crate::errors::Result;
use crate::postings::{accrual_application_postings, ApplicationLegs, Posting};
use crate::types::InterestAmounts;
use crate::vault::Vault;

/// internal accounts on either side of an interest application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationAccounts {
    pub accrued_interest_receivable: String,
    pub interest_received: String,
    pub precision: u32,
}

impl ApplicationAccounts {
    pub fn from_vault(vault: &dyn Vault) -> Result<Self> {
        Ok(Self {
            accrued_interest_receivable: config::get_text(vault, PARAM_ACCRUED_INTEREST_RECEIVABLE_ACCOUNT, None)?,
            interest_received: config::get_text(vault, PARAM_INTEREST_RECEIVED_ACCOUNT, None)?,
            precision: get_application_precision(vault)?,
        })
    }

    fn legs(&self, account_id: &str, denomination: &str, accrual_address: &str, application_address: &str) -> ApplicationLegs {
        ApplicationLegs {
            customer_account: account_id.to_string(),
            denomination: denomination.to_string(),
            accrual_customer_address: accrual_address.to_string(),
            accrual_internal_account: self.accrued_interest_receivable.clone(),
            application_customer_address: application_address.to_string(),
            application_internal_account: self.interest_received.clone(),
            payable: false,
        }
    }
}

pub fn get_application_precision(vault: &dyn Vault) -> Result<u32> {
    config::get_u32(vault, PARAM_APPLICATION_PRECISION, None)
}

/// accrued interest split into its emi and non-emi components, each rounded on its own
pub fn get_interest_to_apply(balances: &BalanceSnapshot, denomination: &str, precision: u32) -> InterestAmounts {
    let emi_accrued = balances.net_at(ACCRUED_INTEREST, denomination);
    let non_emi_accrued = balances.net_at(NON_EMI_ACCRUED_INTEREST, denomination);

    InterestAmounts {
        emi_accrued,
        emi_rounded_accrued: emi_accrued.round_dp(precision),
        non_emi_accrued,
        non_emi_rounded_accrued: non_emi_accrued.round_dp(precision),
        total_rounded: (emi_accrued + non_emi_accrued).round_dp(precision),
    }
}

/// move accrued interest to INTEREST_DUE. each component applies its rounded
/// amount and reverses its unrounded accrual, so no remainder is left behind
pub fn interest_application_postings(
    account_id: &str,
    denomination: &str,
    amounts: &InterestAmounts,
    accounts: &ApplicationAccounts,
) -> Vec<Posting> {
    let components = [
        (NON_EMI_ACCRUED_INTEREST, amounts.non_emi_rounded_accrued, amounts.non_emi_accrued),
        (ACCRUED_INTEREST, amounts.emi_rounded_accrued, amounts.emi_accrued),
    ];

    components
        .iter()
        .flat_map(|(address, rounded, accrued)| {
            let legs = accounts.legs(account_id, denomination, address, INTEREST_DUE);
            accrual_application_postings(&legs, *rounded, *accrued)
        })
        .collect()
}

/// apply all accrued interest held on the account
pub fn apply_interest(vault: &dyn Vault, balances: &BalanceSnapshot, denomination: &str) -> Result<Vec<Posting>> {
    let accounts = ApplicationAccounts::from_vault(vault)?;
    let amounts = get_interest_to_apply(balances, denomination, accounts.precision);
    Ok(interest_application_postings(vault.account_id(), denomination, &amounts, &accounts))
}

/// repay accrued interest straight from a repayment, non-emi interest first.
/// modelled as application to DEFAULT, which offsets the incoming funds
pub fn repay_accrued_interest(
    vault: &dyn Vault,
    repayment_amount: Money,
    balances: &BalanceSnapshot,
    denomination: &str,
) -> Result<Vec<Posting>> {
    if !repayment_amount.is_positive() {
        return Ok(Vec::new());
    }

    let accounts = ApplicationAccounts::from_vault(vault)?;
    let mut remaining = repayment_amount;
    let mut postings = Vec::new();

    for address in [NON_EMI_ACCRUED_INTEREST, ACCRUED_INTEREST] {
        if !remaining.is_positive() {
            break;
        }
        let accrued = balances.net_at(address, denomination);
        let rounded = accrued.round_dp(accounts.precision);

        let (application_amount, accrual_amount) = if rounded <= remaining {
            (rounded, accrued)
        } else {
            (remaining, remaining)
        };
        if !application_amount.is_positive() {
            continue;
        }

        let legs = accounts.legs(vault.account_id(), denomination, address, DEFAULT);
        postings.extend(accrual_application_postings(&legs, application_amount, accrual_amount));
        remaining -= application_amount;
    }

    Ok(postings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LoanConfig, ParameterValue};
    use crate::postings::CustomInstruction;
    use crate::types::Tside;
    use crate::vault::InMemoryVault;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn vault() -> InMemoryVault {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        InMemoryVault::from_config(&LoanConfig::fixed_rate_loan("loan", created, "GBP", dec!(1000), dec!(0.1), 12))
    }

    fn accrued(emi: rust_decimal::Decimal, non_emi: rust_decimal::Decimal) -> BalanceSnapshot {
        BalanceSnapshot::new(Tside::Asset, None)
            .with_net(ACCRUED_INTEREST, "GBP", Money::from_decimal(emi))
            .with_net(NON_EMI_ACCRUED_INTEREST, "GBP", Money::from_decimal(non_emi))
    }

    #[test]
    fn test_components_round_independently() {
        let amounts = get_interest_to_apply(&accrued(dec!(1.005), dec!(2.005)), "GBP", 2);

        assert_eq!(amounts.emi_rounded_accrued, Money::from_decimal(dec!(1.01)));
        assert_eq!(amounts.non_emi_rounded_accrued, Money::from_decimal(dec!(2.01)));
        assert_eq!(amounts.total_rounded, Money::from_decimal(dec!(3.01)));
        assert_ne!(amounts.total_rounded, amounts.component_rounded_total());
    }

    #[test]
    fn test_get_interest_to_apply_is_idempotent() {
        let balances = accrued(dec!(12.34567), dec!(0.00321));
        assert_eq!(
            get_interest_to_apply(&balances, "GBP", 2),
            get_interest_to_apply(&balances, "GBP", 2)
        );
    }

    #[test]
    fn test_apply_interest_clears_accruals() {
        let vault = vault();
        let balances = accrued(dec!(10.12345), dec!(3.00001));

        let postings = apply_interest(&vault, &balances, "GBP").unwrap();
        let applied = balances.with_instructions(&[CustomInstruction::new(postings)], "loan");

        assert_eq!(applied.net_at(ACCRUED_INTEREST, "GBP"), Money::ZERO);
        assert_eq!(applied.net_at(NON_EMI_ACCRUED_INTEREST, "GBP"), Money::ZERO);
        assert_eq!(applied.net_at(INTEREST_DUE, "GBP"), Money::from_decimal(dec!(13.12)));
    }

    #[test]
    fn test_apply_interest_uses_application_precision() {
        let mut vault = vault();
        vault.set_parameter(
            PARAM_APPLICATION_PRECISION,
            ParameterValue::Integer(3),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        );
        let balances = accrued(dec!(10.12345), dec!(0));

        let postings = apply_interest(&vault, &balances, "GBP").unwrap();
        let applied = balances.with_instructions(&[CustomInstruction::new(postings)], "loan");
        assert_eq!(applied.net_at(INTEREST_DUE, "GBP"), Money::from_decimal(dec!(10.123)));
    }

    #[test]
    fn test_nothing_to_apply() {
        let vault = vault();
        let balances = BalanceSnapshot::new(Tside::Asset, None);
        assert!(apply_interest(&vault, &balances, "GBP").unwrap().is_empty());
    }

    #[test]
    fn test_repay_non_emi_interest_first() {
        let vault = vault();
        let balances = accrued(dec!(5.00456), dec!(3.00123));

        let postings = repay_accrued_interest(&vault, Money::from_major(4), &balances, "GBP").unwrap();
        let repaid = balances.with_instructions(&[CustomInstruction::new(postings)], "loan");

        assert_eq!(repaid.net_at(NON_EMI_ACCRUED_INTEREST, "GBP"), Money::ZERO);
        assert_eq!(repaid.net_at(ACCRUED_INTEREST, "GBP"), Money::from_decimal(dec!(4.00456)));
        assert_eq!(repaid.net_at(DEFAULT, "GBP"), Money::from_major(4));
    }

    #[test]
    fn test_repay_more_than_accrued() {
        let vault = vault();
        let balances = accrued(dec!(5.00456), dec!(0));

        let postings = repay_accrued_interest(&vault, Money::from_major(100), &balances, "GBP").unwrap();
        let repaid = balances.with_instructions(&[CustomInstruction::new(postings)], "loan");

        assert_eq!(repaid.net_at(ACCRUED_INTEREST, "GBP"), Money::ZERO);
        assert_eq!(repaid.net_at(DEFAULT, "GBP"), Money::from_decimal(dec!(5.00)));
        assert!(repay_accrued_interest(&vault, Money::ZERO, &balances, "GBP").unwrap().is_empty());
    }
}
