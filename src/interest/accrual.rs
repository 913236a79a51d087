use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::addresses::{
    ACCRUED_EXPECTED_INTEREST, ACCRUED_INTEREST, ACCRUED_INTEREST_PENDING_CAPITALISATION, DUE_CALC_EVENT_COUNTER,
    EXPECTED_PRINCIPAL, INTERNAL_CONTRA, NON_EMI_ACCRUED_INTEREST, PRINCIPAL,
};
use crate::balances::BalanceSnapshot;
use crate::config::{
    self, PARAM_ACCRUAL_PRECISION, PARAM_ACCRUED_INTEREST_RECEIVABLE_ACCOUNT,
    PARAM_CAPITALISED_INTEREST_RECEIVABLE_ACCOUNT, PARAM_CAPITALISE_INTEREST_DURING_HOLIDAY, PARAM_DAYS_IN_YEAR,
};
use crate::decimal::{Money, Rate, Rounding};
use crate::due_amount::schedule;
use crate::errors::Result;
use crate::events::{HookArguments, ACCRUE_INTEREST};
use crate::interest::capitalisation;
use crate::interest::rate::InterestRate;
use crate::postings::{accrual_postings, create_postings, standard_instruction_details, CustomInstruction};
use crate::vault::Vault;

/// number of days a yearly rate is spread over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DaysInYear {
    /// 366 in leap years, 365 otherwise
    #[default]
    Actual,
    Days360,
    Days365,
    Days366,
}

impl DaysInYear {
    /// parse a parameter key. unknown keys fall back to actual
    pub fn from_key(key: &str) -> Self {
        match key.trim().to_lowercase().as_str() {
            "360" => DaysInYear::Days360,
            "365" => DaysInYear::Days365,
            "366" => DaysInYear::Days366,
            _ => DaysInYear::Actual,
        }
    }

    /// get year basis for the convention
    pub fn year_basis(self, year: i32) -> u32 {
        match self {
            DaysInYear::Days360 => 360,
            DaysInYear::Days365 => 365,
            DaysInYear::Days366 => 366,
            DaysInYear::Actual => {
                if is_leap_year(year) {
                    366
                } else {
                    365
                }
            }
        }
    }
}

/// check if year is a leap year
fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}

/// how daily accruals are sized and rounded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccrualSettings {
    pub days_in_year: DaysInYear,
    pub precision: u32,
    pub rounding: Rounding,
}

impl AccrualSettings {
    pub fn from_vault(vault: &dyn Vault, at: Option<DateTime<Utc>>) -> Result<Self> {
        Ok(Self {
            days_in_year: DaysInYear::from_key(&config::get_union(vault, PARAM_DAYS_IN_YEAR, at)?),
            precision: config::get_u32(vault, PARAM_ACCRUAL_PRECISION, at)?,
            rounding: Rounding::HalfUp,
        })
    }
}

/// one day of accrued interest
#[derive(Debug, Clone, PartialEq)]
pub struct AccrualDetail {
    pub amount: Money,
    pub daily_rate: Rate,
    pub description: String,
}

/// where a daily accrual is booked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccrualLegs {
    pub customer_account: String,
    pub customer_address: String,
    pub internal_account: String,
    pub denomination: String,
    pub payable: bool,
}

/// one day's interest on `effective_balance`. None when nothing accrues,
/// i.e. a zero balance or an amount that rounds to zero or below
pub fn calculate_daily_accrual(
    effective_balance: Money,
    yearly_rate: Rate,
    effective_datetime: DateTime<Utc>,
    settings: &AccrualSettings,
) -> Option<AccrualDetail> {
    if effective_balance.is_zero() {
        return None;
    }

    let daily_rate = yearly_rate.daily_rate(settings.days_in_year.year_basis(effective_datetime.year()));
    let amount = (effective_balance * daily_rate).round_with(settings.precision, settings.rounding);
    if !amount.is_positive() {
        return None;
    }

    Some(AccrualDetail {
        amount,
        daily_rate,
        description: format!(
            "Daily interest accrued at {:.5}% on balance of {:.2}",
            daily_rate.as_percentage(),
            effective_balance.as_decimal()
        ),
    })
}

/// accrual instruction for one day, or nothing when no interest accrues
pub fn daily_accrual(
    legs: &AccrualLegs,
    effective_balance: Money,
    yearly_rate: Rate,
    effective_datetime: DateTime<Utc>,
    settings: &AccrualSettings,
    event_type: &str,
    account_type: &str,
) -> Vec<CustomInstruction> {
    let Some(detail) = calculate_daily_accrual(effective_balance, yearly_rate, effective_datetime, settings) else {
        return Vec::new();
    };

    let postings = accrual_postings(
        &legs.customer_account,
        &legs.customer_address,
        &legs.internal_account,
        &legs.denomination,
        detail.amount,
        legs.payable,
        false,
    );

    vec![CustomInstruction::new(postings)
        .with_details(standard_instruction_details(&detail.description, event_type, true, account_type))
        .override_restrictions()]
}

/// accrual address for a given day. interest accrued more than one period
/// before the first due amount calculation is not covered by the emi
pub fn accrual_address(
    vault: &dyn Vault,
    balances: &BalanceSnapshot,
    accrual_datetime: DateTime<Utc>,
    denomination: &str,
) -> Result<&'static str> {
    if balances.net_at(DUE_CALC_EVENT_COUNTER, denomination).is_zero() {
        let first_due = schedule::get_first_due_amount_calculation_datetime(vault)?;
        if accrual_datetime <= schedule::add_months(first_due, -1)? {
            return Ok(NON_EMI_ACCRUED_INTEREST);
        }
    }
    Ok(ACCRUED_INTEREST)
}

/// receivable interest on the end of day principal.
/// `inflight` instructions are applied to the principal first, e.g. interest
/// capitalised in the same event
pub fn daily_accrual_logic(
    vault: &dyn Vault,
    hook: &HookArguments,
    interest_rate: &dyn InterestRate,
    account_type: &str,
    inflight: &[CustomInstruction],
) -> Result<Vec<CustomInstruction>> {
    let midnight = schedule::start_of_day(hook.effective_datetime);
    let denomination = config::get_denomination(vault)?;
    let balances = vault
        .balances_at(midnight)
        .with_instructions(inflight, vault.account_id());
    let effective_balance = balances.net_at(PRINCIPAL, &denomination);

    let (customer_address, internal_account) = if capitalisation::is_interest_accrual_blocked(vault, hook.effective_datetime)? {
        if !config::get_bool(vault, PARAM_CAPITALISE_INTEREST_DURING_HOLIDAY, None)? {
            tracing::debug!(account_id = vault.account_id(), "interest accrual blocked, nothing to capitalise");
            return Ok(Vec::new());
        }
        (
            ACCRUED_INTEREST_PENDING_CAPITALISATION,
            config::get_text(vault, PARAM_CAPITALISED_INTEREST_RECEIVABLE_ACCOUNT, None)?,
        )
    } else {
        (
            accrual_address(vault, &balances, midnight, &denomination)?,
            config::get_text(vault, PARAM_ACCRUED_INTEREST_RECEIVABLE_ACCOUNT, None)?,
        )
    };

    let legs = AccrualLegs {
        customer_account: vault.account_id().to_string(),
        customer_address: customer_address.to_string(),
        internal_account,
        denomination,
        payable: false,
    };

    Ok(daily_accrual(
        &legs,
        effective_balance,
        interest_rate.annual_rate(vault, Some(hook.effective_datetime))?,
        midnight,
        &AccrualSettings::from_vault(vault, None)?,
        hook.event_type_or(ACCRUE_INTEREST),
        account_type,
    ))
}

/// interest the schedule expected, accrued on principal as if no
/// overpayment had been made. booked against the internal contra address
pub fn track_interest_on_expected_principal(
    vault: &dyn Vault,
    hook: &HookArguments,
    interest_rate: &dyn InterestRate,
) -> Result<Vec<CustomInstruction>> {
    let midnight = schedule::start_of_day(hook.effective_datetime);
    let denomination = config::get_denomination(vault)?;
    let balances = vault.balances_at(midnight);
    let expected_principal = balances.sum_nets(&EXPECTED_PRINCIPAL, &denomination);
    let yearly_rate = interest_rate.annual_rate(vault, Some(hook.effective_datetime))?;
    let settings = AccrualSettings::from_vault(vault, None)?;

    let Some(detail) = calculate_daily_accrual(expected_principal, yearly_rate, midnight, &settings) else {
        return Ok(Vec::new());
    };

    let postings = create_postings(
        detail.amount,
        vault.account_id(),
        ACCRUED_EXPECTED_INTEREST,
        vault.account_id(),
        INTERNAL_CONTRA,
        &denomination,
    );

    Ok(vec![CustomInstruction::new(postings)
        .with_description(format!(
            "Tracking expected interest at yearly rate {} on expected principal {}",
            yearly_rate.as_decimal(),
            expected_principal
        ))
        .override_restrictions()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addresses::{DEFAULT, OVERPAYMENT};
    use crate::config::{LoanConfig, ParameterValue, PARAM_INTEREST_ACCRUAL_BLOCKING_FLAGS, REPAYMENT_HOLIDAY_FLAG};
    use crate::interest::rate::FixedRate;
    use crate::vault::InMemoryVault;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn settings(precision: u32) -> AccrualSettings {
        AccrualSettings {
            days_in_year: DaysInYear::Days365,
            precision,
            rounding: Rounding::HalfUp,
        }
    }

    fn created() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn loan() -> InMemoryVault {
        let config = LoanConfig::fixed_rate_loan("loan", created(), "GBP", dec!(10000), dec!(0.0365), 12);
        let mut vault = InMemoryVault::from_config(&config);
        let disbursement = CustomInstruction::new(create_postings(
            Money::from_major(10000),
            "loan",
            PRINCIPAL,
            "deposit",
            DEFAULT,
            "GBP",
        ));
        vault.commit(&[disbursement], created()).unwrap();
        vault
    }

    #[test]
    fn test_days_in_year_keys() {
        assert_eq!(DaysInYear::from_key("360"), DaysInYear::Days360);
        assert_eq!(DaysInYear::from_key("actual"), DaysInYear::Actual);
        assert_eq!(DaysInYear::from_key("banana"), DaysInYear::Actual);
        assert_eq!(DaysInYear::Actual.year_basis(2024), 366);
        assert_eq!(DaysInYear::Actual.year_basis(2023), 365);
        assert_eq!(DaysInYear::Days360.year_basis(2024), 360);
    }

    #[test]
    fn test_leap_year() {
        assert!(is_leap_year(2024));
        assert!(!is_leap_year(2023));
        assert!(is_leap_year(2000));
        assert!(!is_leap_year(1900));
    }

    #[test]
    fn test_daily_accrual_amount() {
        let detail = calculate_daily_accrual(
            Money::from_major(10000),
            Rate::from_decimal(dec!(0.0365)),
            created(),
            &settings(5),
        )
        .unwrap();

        assert_eq!(detail.daily_rate, Rate::from_decimal(dec!(0.0001)));
        assert_eq!(detail.amount, Money::from_major(1));
        assert!(detail.description.starts_with("Daily interest accrued at"));
    }

    #[test]
    fn test_no_accrual_for_zero_balance_or_rate() {
        let rate = Rate::from_decimal(dec!(0.05));
        assert!(calculate_daily_accrual(Money::ZERO, rate, created(), &settings(5)).is_none());
        assert!(calculate_daily_accrual(Money::from_major(100), Rate::ZERO, created(), &settings(5)).is_none());
        assert!(calculate_daily_accrual(Money::from_major(-100), rate, created(), &settings(5)).is_none());
        // 0.00136.. rounds to zero at 2dp
        assert!(calculate_daily_accrual(Money::from_major(10), rate, created(), &settings(2)).is_none());
    }

    #[test]
    fn test_daily_accrual_postings() {
        let legs = AccrualLegs {
            customer_account: "loan".to_string(),
            customer_address: ACCRUED_INTEREST.to_string(),
            internal_account: "RECEIVABLE".to_string(),
            denomination: "GBP".to_string(),
            payable: false,
        };

        let instructions = daily_accrual(
            &legs,
            Money::from_major(10000),
            Rate::from_decimal(dec!(0.0365)),
            created(),
            &settings(5),
            ACCRUE_INTEREST,
            "LOAN",
        );

        assert_eq!(instructions.len(), 1);
        assert!(instructions[0].override_all_restrictions);
        let balances = instructions[0].balances("loan", crate::types::Tside::Asset);
        assert_eq!(balances.net_at(ACCRUED_INTEREST, "GBP"), Money::from_major(1));
    }

    #[test]
    fn test_accrual_before_first_period_is_non_emi() {
        let vault = loan();
        // default due day 28, so the first due date is 2024-02-28
        let early = HookArguments::scheduled(Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap(), ACCRUE_INTEREST);
        let late = HookArguments::scheduled(Utc.with_ymd_and_hms(2024, 2, 10, 0, 0, 0).unwrap(), ACCRUE_INTEREST);

        let early_postings = daily_accrual_logic(&vault, &early, &FixedRate, "LOAN", &[]).unwrap();
        let late_postings = daily_accrual_logic(&vault, &late, &FixedRate, "LOAN", &[]).unwrap();

        let early_balances = early_postings[0].balances("loan", vault.tside());
        assert_eq!(early_balances.net_at(NON_EMI_ACCRUED_INTEREST, "GBP"), Money::from_major(1));
        let late_balances = late_postings[0].balances("loan", vault.tside());
        assert_eq!(late_balances.net_at(ACCRUED_INTEREST, "GBP"), Money::from_major(1));
    }

    #[test]
    fn test_holiday_accrues_pending_capitalisation() {
        let mut vault = loan();
        let at = created() + Duration::days(40);
        vault.set_flag(REPAYMENT_HOLIDAY_FLAG, true, created() + Duration::days(35));

        let hook = HookArguments::scheduled(at, ACCRUE_INTEREST);
        let instructions = daily_accrual_logic(&vault, &hook, &FixedRate, "LOAN", &[]).unwrap();
        let balances = instructions[0].balances("loan", vault.tside());
        assert!(balances.net_at(ACCRUED_INTEREST_PENDING_CAPITALISATION, "GBP").is_positive());
        assert_eq!(instructions[0].postings[0].credit.account_id, "CAPITALISED_INTEREST_RECEIVABLE");

        vault.set_parameter(
            PARAM_CAPITALISE_INTEREST_DURING_HOLIDAY,
            ParameterValue::Boolean(false),
            created(),
        );
        assert!(daily_accrual_logic(&vault, &hook, &FixedRate, "LOAN", &[]).unwrap().is_empty());

        vault.set_parameter(PARAM_INTEREST_ACCRUAL_BLOCKING_FLAGS, ParameterValue::Text("[]".to_string()), created());
        assert_eq!(daily_accrual_logic(&vault, &hook, &FixedRate, "LOAN", &[]).unwrap().len(), 1);
    }

    #[test]
    fn test_expected_interest_includes_overpayments() {
        let mut vault = loan();
        let overpayment = CustomInstruction::new(
            create_postings(Money::from_major(1000), "loan", DEFAULT, "loan", PRINCIPAL, "GBP")
                .into_iter()
                .chain(create_postings(Money::from_major(1000), "loan", OVERPAYMENT, "loan", INTERNAL_CONTRA, "GBP"))
                .collect(),
        );
        vault.commit(&[overpayment], created() + Duration::days(1)).unwrap();

        let hook = HookArguments::scheduled(created() + Duration::days(3), ACCRUE_INTEREST);
        let instructions = track_interest_on_expected_principal(&vault, &hook, &FixedRate).unwrap();
        let balances = instructions[0].balances("loan", vault.tside());
        // accrued on 10000 rather than 9000
        assert_eq!(balances.net_at(ACCRUED_EXPECTED_INTEREST, "GBP"), Money::from_major(1));
    }
}
