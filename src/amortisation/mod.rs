pub mod declining_principal;
pub mod emi;
pub mod interest_only;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;

use crate::addresses::DUE_CALC_EVENT_COUNTER;
use crate::balances::BalanceSnapshot;
use crate::decimal::{Money, Rate};
use crate::errors::Result;
use crate::interest::rate::InterestRate;
use crate::types::TermDetails;
use crate::vault::Vault;

pub use declining_principal::{
    calculate_declining_balance_payment, calculate_remaining_term, DecliningPrincipal,
};
pub use emi::{amortise, update_emi};
pub use interest_only::InterestOnly;

/// amount added to the principal before an emi or remaining term is derived
pub trait PrincipalAdjustment {
    fn calculate_principal_adjustment(
        &self,
        vault: &dyn Vault,
        balances: &BalanceSnapshot,
        denomination: &str,
    ) -> Result<Money>;
}

/// features an amortisation method consults
#[derive(Clone, Copy, Default)]
pub struct AmortisationInputs<'a> {
    /// no rate means the loan is amortised interest free
    pub interest_rate: Option<&'a dyn InterestRate>,
    pub principal_adjustments: &'a [&'a dyn PrincipalAdjustment],
}

impl<'a> AmortisationInputs<'a> {
    pub fn new(interest_rate: &'a dyn InterestRate, principal_adjustments: &'a [&'a dyn PrincipalAdjustment]) -> Self {
        Self {
            interest_rate: Some(interest_rate),
            principal_adjustments,
        }
    }

    /// monthly rate at `at`, zero when no rate feature is configured
    pub fn monthly_rate(&self, vault: &dyn Vault, at: DateTime<Utc>) -> Result<Rate> {
        match self.interest_rate {
            Some(rate) => rate.monthly_rate(vault, Some(at)),
            None => Ok(Rate::ZERO),
        }
    }

    pub fn principal_adjustment(&self, vault: &dyn Vault, balances: &BalanceSnapshot, denomination: &str) -> Result<Money> {
        let mut total = Money::ZERO;
        for adjustment in self.principal_adjustments {
            total += adjustment.calculate_principal_adjustment(vault, balances, denomination)?;
        }
        Ok(total)
    }
}

/// how a loan's emi and term are derived
pub trait Amortisation {
    /// emi for the remaining term. `principal_amount` defaults to the principal parameter
    fn calculate_emi(
        &self,
        vault: &dyn Vault,
        effective_datetime: DateTime<Utc>,
        use_expected_term: bool,
        principal_amount: Option<Money>,
        inputs: &AmortisationInputs<'_>,
        balances: &BalanceSnapshot,
    ) -> Result<Money>;

    fn term_details(
        &self,
        vault: &dyn Vault,
        effective_datetime: DateTime<Utc>,
        use_expected_term: bool,
        inputs: &AmortisationInputs<'_>,
        balances: &BalanceSnapshot,
    ) -> Result<TermDetails>;

    /// when true the final due event is left to another feature
    fn override_final_event(&self) -> bool {
        false
    }
}

/// number of due amount calculations that have run
pub fn calculate_elapsed_term(balances: &BalanceSnapshot, denomination: &str) -> u32 {
    balances
        .net_at(DUE_CALC_EVENT_COUNTER, denomination)
        .as_decimal()
        .to_u32()
        .unwrap_or(0)
}
