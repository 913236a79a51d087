use chrono::{DateTime, Utc};

use crate::amortisation::{calculate_elapsed_term, Amortisation, AmortisationInputs};
use crate::balances::BalanceSnapshot;
use crate::config::{self, PARAM_TOTAL_REPAYMENT_COUNT};
use crate::decimal::Money;
use crate::errors::Result;
use crate::types::TermDetails;
use crate::vault::Vault;

/// only interest falls due until the final event, which moves the whole
/// remaining principal to due
#[derive(Debug, Clone, Copy, Default)]
pub struct InterestOnly;

impl Amortisation for InterestOnly {
    fn calculate_emi(
        &self,
        _vault: &dyn Vault,
        _effective_datetime: DateTime<Utc>,
        _use_expected_term: bool,
        _principal_amount: Option<Money>,
        _inputs: &AmortisationInputs<'_>,
        _balances: &BalanceSnapshot,
    ) -> Result<Money> {
        Ok(Money::ZERO)
    }

    /// term is counted purely from due amount calculations
    fn term_details(
        &self,
        vault: &dyn Vault,
        effective_datetime: DateTime<Utc>,
        _use_expected_term: bool,
        _inputs: &AmortisationInputs<'_>,
        balances: &BalanceSnapshot,
    ) -> Result<TermDetails> {
        let original_term = config::get_u32(vault, PARAM_TOTAL_REPAYMENT_COUNT, None)?;
        if effective_datetime == vault.account_creation_datetime() {
            return Ok(TermDetails::new(0, original_term));
        }

        let elapsed = calculate_elapsed_term(balances, &config::get_denomination(vault)?);
        Ok(TermDetails::new(elapsed, original_term.saturating_sub(elapsed)))
    }
}
