use chrono::{DateTime, Utc};

use crate::addresses::{DEFAULT, INTERNAL_CONTRA};
use crate::balances::BalanceSnapshot;
use crate::config::ParameterValue;
use crate::decimal::Money;
use crate::due_amount::calculation::{schedule_logic, DueAmountFeatures};
use crate::due_amount::schedule::add_months;
use crate::errors::Result;
use crate::events::{HookArguments, PROCESS_REPAYMENTS};
use crate::payments::repayment::distribute_repayment_for_multiple_targets;
use crate::postings::{create_postings, CustomInstruction};
use crate::types::Tside;
use crate::vault::{CalendarEvent, Vault};

/// a loan seen through its supervising account. balances belong to the
/// loan, parameters fall back to the main account and schedule history is
/// the main account's
pub struct SupervisedLoan<'a> {
    pub loan: &'a dyn Vault,
    pub main: &'a dyn Vault,
    pub effective_datetime: DateTime<Utc>,
}

impl<'a> SupervisedLoan<'a> {
    pub fn new(loan: &'a dyn Vault, main: &'a dyn Vault, effective_datetime: DateTime<Utc>) -> Self {
        Self {
            loan,
            main,
            effective_datetime,
        }
    }
}

impl Vault for SupervisedLoan<'_> {
    fn account_id(&self) -> &str {
        self.loan.account_id()
    }

    fn tside(&self) -> Tside {
        self.loan.tside()
    }

    fn account_creation_datetime(&self) -> DateTime<Utc> {
        self.loan.account_creation_datetime()
    }

    fn balances_at(&self, at: DateTime<Utc>) -> BalanceSnapshot {
        self.loan.balances_at(at)
    }

    fn live_balances(&self) -> BalanceSnapshot {
        self.loan.live_balances()
    }

    fn parameter_timeseries(&self, name: &str) -> Vec<(DateTime<Utc>, ParameterValue)> {
        let series = self.loan.parameter_timeseries(name);
        if series.is_empty() {
            return self.main.parameter_timeseries(name);
        }
        series
    }

    /// when the supervisor has already run the event at this instant, the
    /// previous run is a month earlier
    fn last_execution_datetime(&self, event_type: &str) -> Option<DateTime<Utc>> {
        let last = self.main.last_execution_datetime(event_type)?;
        if last == self.effective_datetime {
            return Some(add_months(last, -1).unwrap_or(last));
        }
        Some(last)
    }

    fn flag_timeseries(&self, flag: &str) -> Vec<(DateTime<Utc>, bool)> {
        let series = self.loan.flag_timeseries(flag);
        if series.is_empty() {
            return self.main.flag_timeseries(flag);
        }
        series
    }

    fn calendar_events(&self, calendar_ids: &[String]) -> Vec<CalendarEvent> {
        self.main.calendar_events(calendar_ids)
    }
}

/// oldest first, then by account id
pub fn sort_supervisees(supervisees: &mut [&dyn Vault]) {
    supervisees.sort_by(|a, b| {
        a.account_creation_datetime()
            .cmp(&b.account_creation_datetime())
            .then_with(|| a.account_id().cmp(b.account_id()))
    });
}

/// one view of all supervisee balances, as of `at` or live
pub fn aggregate_balances(supervisees: &[&dyn Vault], at: Option<DateTime<Utc>>) -> BalanceSnapshot {
    let snapshots: Vec<BalanceSnapshot> = supervisees
        .iter()
        .map(|vault| match at {
            Some(at) => vault.balances_at(at),
            None => vault.live_balances(),
        })
        .collect();
    let refs: Vec<&BalanceSnapshot> = snapshots.iter().collect();
    BalanceSnapshot::merged(&refs, Tside::Asset)
}

/// sum of addresses across supervisees, rounded per supervisee
pub fn sum_balances_across_supervisees(
    balances: &[&BalanceSnapshot],
    addresses: &[&str],
    denomination: &str,
    precision: u32,
) -> Money {
    balances
        .iter()
        .map(|snapshot| snapshot.sum_nets(addresses, denomination).round_dp(precision))
        .sum()
}

/// due amount calculation for a supervised loan, run by the supervisor
pub fn supervisor_schedule_logic(
    loan: &dyn Vault,
    main: &dyn Vault,
    hook: &HookArguments,
    account_type: &str,
    features: &DueAmountFeatures<'_>,
) -> Result<Vec<CustomInstruction>> {
    let supervised = SupervisedLoan::new(loan, main, hook.effective_datetime);
    schedule_logic(&supervised, hook, account_type, features, None)
}

/// spread a repayment received on the main account over the supervised
/// loans, oldest loan first. loans other than the main account are funded
/// through their internal contra address. returns instructions per loan and
/// the unallocated remainder
pub fn generate_repayment_postings_for_multiple_targets(
    main_account_id: &str,
    targets: &[&dyn Vault],
    repayment_amount: Money,
    denomination: &str,
    effective_datetime: DateTime<Utc>,
    repayment_hierarchy: &[&[&str]],
) -> (Vec<(String, Vec<CustomInstruction>)>, Money) {
    let mut sorted = targets.to_vec();
    sort_supervisees(&mut sorted);

    let snapshots: Vec<(String, BalanceSnapshot)> = sorted
        .iter()
        .map(|target| (target.account_id().to_string(), target.balances_at(effective_datetime)))
        .collect();
    let balances_per_target: Vec<(&str, &BalanceSnapshot)> = snapshots
        .iter()
        .map(|(account_id, balances)| (account_id.as_str(), balances))
        .collect();

    let distribution =
        distribute_repayment_for_multiple_targets(&balances_per_target, repayment_amount, denomination, repayment_hierarchy);

    let instructions = distribution
        .per_target
        .iter()
        .map(|(account_id, repayments)| {
            let debit_address = if account_id == main_account_id { DEFAULT } else { INTERNAL_CONTRA };
            let postings: Vec<_> = repayments
                .iter()
                .flat_map(|(address, amounts)| {
                    create_postings(amounts.rounded, account_id, debit_address, account_id, address, denomination)
                })
                .collect();

            let instructions = if postings.is_empty() {
                Vec::new()
            } else {
                vec![CustomInstruction::new(postings)
                    .with_description("Process a repayment")
                    .with_event(PROCESS_REPAYMENTS)]
            };
            (account_id.clone(), instructions)
        })
        .collect();

    (instructions, distribution.remaining)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addresses::{GROUPED_REPAYMENT_HIERARCHY, INTEREST_DUE, PRINCIPAL, PRINCIPAL_DUE, PRINCIPAL_OVERDUE};
    use crate::amortisation::{AmortisationInputs, DecliningPrincipal};
    use crate::config::{self, LoanConfig, PARAM_OVERPAYMENT_FEE_RATE};
    use crate::events::DUE_AMOUNT_CALCULATION;
    use crate::interest::rate::FixedRate;
    use crate::vault::InMemoryVault;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn created() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn loan(account_id: &str, created: DateTime<Utc>) -> InMemoryVault {
        InMemoryVault::from_config(&LoanConfig::fixed_rate_loan(account_id, created, "GBP", dec!(1000), dec!(0.12), 12))
    }

    fn fund(vault: &mut InMemoryVault, address: &str, amount: i64) {
        let account_id = vault.account_id().to_string();
        vault
            .commit(
                &[CustomInstruction::new(create_postings(
                    Money::from_major(amount),
                    &account_id,
                    address,
                    &account_id,
                    INTERNAL_CONTRA,
                    "GBP",
                ))],
                created(),
            )
            .unwrap();
    }

    #[test]
    fn test_parameters_fall_back_to_main_account() {
        let loan = loan("loan", created());
        let mut main = InMemoryVault::new("main", created());
        main.set_parameter(PARAM_OVERPAYMENT_FEE_RATE, ParameterValue::Decimal(dec!(0.02)), created());

        let supervised = SupervisedLoan::new(&loan, &main, created());
        assert_eq!(config::get_decimal(&supervised, PARAM_OVERPAYMENT_FEE_RATE, None).unwrap(), dec!(0.02));
        assert_eq!(config::get_denomination(&supervised).unwrap(), "GBP");
        assert_eq!(supervised.account_id(), "loan");
    }

    #[test]
    fn test_last_execution_comes_from_main_account() {
        let loan = loan("loan", created());
        let mut main = InMemoryVault::new("main", created());
        let due = Utc.with_ymd_and_hms(2024, 3, 28, 0, 0, 0).unwrap();
        main.record_execution(DUE_AMOUNT_CALCULATION, due);

        // the supervisor ran first at this instant
        let supervised = SupervisedLoan::new(&loan, &main, due);
        assert_eq!(
            supervised.last_execution_datetime(DUE_AMOUNT_CALCULATION),
            Some(Utc.with_ymd_and_hms(2024, 2, 28, 0, 0, 0).unwrap())
        );

        let later = SupervisedLoan::new(&loan, &main, due + Duration::days(1));
        assert_eq!(later.last_execution_datetime(DUE_AMOUNT_CALCULATION), Some(due));
        assert_eq!(later.last_execution_datetime("OTHER"), None);
    }

    #[test]
    fn test_aggregate_balances() {
        let mut first = loan("first", created());
        let mut second = loan("second", created());
        fund(&mut first, PRINCIPAL, 600);
        fund(&mut second, PRINCIPAL, 400);
        fund(&mut second, INTEREST_DUE, 5);

        let aggregate = aggregate_balances(&[&first, &second], Some(created()));
        assert_eq!(aggregate.net_at(PRINCIPAL, "GBP"), Money::from_major(1000));
        assert_eq!(aggregate.net_at(INTEREST_DUE, "GBP"), Money::from_major(5));

        let first_balances = first.live_balances();
        let second_balances = second.live_balances();
        assert_eq!(
            sum_balances_across_supervisees(&[&first_balances, &second_balances], &[PRINCIPAL, INTEREST_DUE], "GBP", 2),
            Money::from_major(1005)
        );
    }

    #[test]
    fn test_supervisor_schedule_logic_matches_solo_account() {
        let mut loan = loan("loan", created());
        fund(&mut loan, PRINCIPAL, 1000);
        let main = InMemoryVault::new("main", created());

        let features = DueAmountFeatures {
            amortisation: &DecliningPrincipal,
            apply_interest: true,
            reamortisation_conditions: &[],
            inputs: AmortisationInputs::new(&FixedRate, &[]),
        };
        let hook = HookArguments::scheduled(Utc.with_ymd_and_hms(2024, 2, 28, 0, 0, 0).unwrap(), DUE_AMOUNT_CALCULATION);

        let supervised = supervisor_schedule_logic(&loan, &main, &hook, "LOAN", &features).unwrap();
        let solo = schedule_logic(&loan, &hook, "LOAN", &features, None).unwrap();
        assert_eq!(supervised, solo);
    }

    #[test]
    fn test_repayment_across_supervised_loans() {
        let mut older = loan("older", created());
        let mut newer = loan("newer", created() + Duration::days(1));
        fund(&mut older, PRINCIPAL_DUE, 30);
        fund(&mut newer, PRINCIPAL_OVERDUE, 10);
        fund(&mut newer, PRINCIPAL_DUE, 30);

        let (per_target, remaining) = generate_repayment_postings_for_multiple_targets(
            "newer",
            &[&newer, &older],
            Money::from_major(50),
            "GBP",
            created() + Duration::days(2),
            &GROUPED_REPAYMENT_HIERARCHY,
        );

        assert_eq!(remaining, Money::ZERO);
        assert_eq!(per_target[0].0, "older");
        assert_eq!(per_target[1].0, "newer");

        // overdue on the newer loan first, then the older loan's due principal
        let older_moved = per_target[0].1[0].balances("older", Tside::Asset);
        assert_eq!(older_moved.net_at(PRINCIPAL_DUE, "GBP"), Money::from_major(-30));
        assert_eq!(older_moved.net_at(INTERNAL_CONTRA, "GBP"), Money::from_major(30));

        let newer_moved = per_target[1].1[0].balances("newer", Tside::Asset);
        assert_eq!(newer_moved.net_at(PRINCIPAL_OVERDUE, "GBP"), Money::from_major(-10));
        assert_eq!(newer_moved.net_at(PRINCIPAL_DUE, "GBP"), Money::from_major(-10));
        assert_eq!(newer_moved.net_at(DEFAULT, "GBP"), Money::from_major(20));
    }
}
