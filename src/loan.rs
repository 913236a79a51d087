use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::addresses::{CAPITALISED_INTEREST_TRACKER, DEFAULT, EMI, INTERNAL_CONTRA, PENALTIES, PRINCIPAL};
use crate::amortisation::emi::get_expected_emi;
use crate::amortisation::{amortise, update_emi, Amortisation, AmortisationInputs, DecliningPrincipal, InterestOnly, PrincipalAdjustment};
use crate::balances::BalanceSnapshot;
use crate::config::{
    self, ParameterValue, DUE_AMOUNT_CALCULATION_PREFIX, INTEREST_ACCRUAL_PREFIX, PARAM_DEPOSIT_ACCOUNT,
    PARAM_DUE_AMOUNT_CALCULATION_DAY, PARAM_PRINCIPAL,
};
use crate::decimal::Money;
use crate::due_amount::calculation::{
    self as due_calculation, due_amount_notification, schedule_logic, update_due_amount_calculation_counter,
    DueAmountFeatures,
};
use crate::due_amount::reamortisation::{
    get_repayment_holiday_impact_preference, is_due_amount_calculation_blocked, reject_repayment,
    ReamortisationCondition, RepaymentHoliday,
};
use crate::due_amount::schedule::{
    daily_scheduled_event, due_amount_calculation_scheduled_event, get_actual_next_repayment_date,
    get_next_due_amount_calculation_datetime, monthly_scheduled_event, next_datetime_after_calendar_events,
    start_of_day, validate_due_amount_calculation_day_change,
};
use crate::errors::{LendingError, Result};
use crate::events::{
    HookArguments, HookResult, UpdateEventTypeDirective, ACCOUNT_ACTIVATION, ACCOUNT_CLOSURE, ACCRUE_INTEREST,
    DUE_AMOUNT_CALCULATION, PROCESS_REPAYMENTS,
};
use crate::interest::{
    daily_accrual_logic, handle_interest_capitalisation, is_interest_accrual_blocked,
    track_interest_on_expected_principal, FixedRate, InterestRate, VariableRate,
};
use crate::payments::overpayment::{
    self, charge_overpayment_fee, get_capped_overpayment_fee, handle_overpayment,
    reset_due_amount_calc_overpayment_trackers, track_emi_principal_excess, validate_overpayment, OverpaymentFeature,
};
use crate::payments::repayment::{
    generate_repayment_postings, get_outstanding_principal, get_total_due_amount, get_total_outstanding_debt,
};
use crate::postings::{create_postings, reset_tracker_balances, standard_instruction_details, CustomInstruction};
use crate::types::{Rejection, RejectionReason, RepaymentHolidayImpactPreference, Tside};
use crate::vault::Vault;

const PRINCIPAL_ADJUSTMENTS: &[&dyn PrincipalAdjustment] = &[&OverpaymentFeature];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AmortisationMethod {
    #[default]
    DecliningPrincipal,
    InterestOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RateType {
    #[default]
    Fixed,
    Variable,
}

/// values shown alongside the account, derived from its balances
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedParameters {
    pub next_repayment_date: DateTime<Utc>,
    pub emi: Money,
    pub remaining_term: u32,
    pub total_outstanding_debt: Money,
    pub total_due: Money,
    pub outstanding_principal: Money,
}

/// a loan product: the features it is built from and the hooks the
/// ledger calls on each of its accounts
#[derive(Debug, Clone)]
pub struct LoanProduct {
    pub product_name: String,
    pub account_type: String,
    pub amortisation_method: AmortisationMethod,
    pub rate_type: RateType,
    pub repayment_holiday: RepaymentHoliday,
    /// calendars whose events the displayed repayment date avoids; empty means all
    pub calendar_ids: Vec<String>,
}

impl Default for LoanProduct {
    fn default() -> Self {
        Self::new("LOAN")
    }
}

impl LoanProduct {
    pub fn new(product_name: &str) -> Self {
        Self {
            product_name: product_name.to_string(),
            account_type: product_name.to_uppercase(),
            amortisation_method: AmortisationMethod::default(),
            rate_type: RateType::default(),
            repayment_holiday: RepaymentHoliday::with_impact_preference(),
            calendar_ids: Vec::new(),
        }
    }

    pub fn with_amortisation_method(mut self, amortisation_method: AmortisationMethod) -> Self {
        self.amortisation_method = amortisation_method;
        self
    }

    pub fn with_rate_type(mut self, rate_type: RateType) -> Self {
        self.rate_type = rate_type;
        self
    }

    pub fn with_account_type(mut self, account_type: &str) -> Self {
        self.account_type = account_type.to_string();
        self
    }

    pub fn with_calendar_ids(mut self, calendar_ids: &[&str]) -> Self {
        self.calendar_ids = calendar_ids.iter().map(|id| id.to_string()).collect();
        self
    }

    pub fn amortisation(&self) -> &'static dyn Amortisation {
        match self.amortisation_method {
            AmortisationMethod::DecliningPrincipal => &DecliningPrincipal,
            AmortisationMethod::InterestOnly => &InterestOnly,
        }
    }

    pub fn interest_rate(&self) -> &'static dyn InterestRate {
        match self.rate_type {
            RateType::Fixed => &FixedRate,
            RateType::Variable => &VariableRate,
        }
    }

    pub fn inputs(&self) -> AmortisationInputs<'static> {
        AmortisationInputs::new(self.interest_rate(), PRINCIPAL_ADJUSTMENTS)
    }

    /// a variable rate reamortises whenever the rate moves
    pub fn reamortisation_conditions(&self) -> Vec<&dyn ReamortisationCondition> {
        let mut conditions: Vec<&dyn ReamortisationCondition> = Vec::with_capacity(3);
        conditions.push(&OverpaymentFeature);
        conditions.push(&self.repayment_holiday);
        if self.rate_type == RateType::Variable {
            conditions.push(&VariableRate);
        }
        conditions
    }

    /// disburse the principal, set the initial emi and register the
    /// accrual and due amount calculation schedules
    pub fn activation_hook(&self, vault: &dyn Vault, hook: &HookArguments) -> Result<HookResult> {
        let effective_datetime = hook.effective_datetime;
        let account_id = vault.account_id();
        let denomination = config::get_denomination(vault)?;
        let principal = Money::from_decimal(config::get_decimal(vault, PARAM_PRINCIPAL, None)?);
        let deposit_account = config::get_text(vault, PARAM_DEPOSIT_ACCOUNT, None)?;

        let mut instructions = Vec::new();
        let disbursement = create_postings(principal, account_id, PRINCIPAL, &deposit_account, DEFAULT, &denomination);
        if !disbursement.is_empty() {
            instructions.push(CustomInstruction::new(disbursement).with_details(standard_instruction_details(
                &format!("Principal disbursement of {}", principal),
                ACCOUNT_ACTIVATION,
                true,
                &self.account_type,
            )));
        }
        instructions.extend(amortise(
            vault,
            effective_datetime,
            self.amortisation(),
            None,
            &self.inputs(),
            None,
            ACCOUNT_ACTIVATION,
        )?);

        let scheduled_events = vec![
            daily_scheduled_event(
                vault,
                ACCRUE_INTEREST,
                start_of_day(effective_datetime) + Duration::days(1),
                INTEREST_ACCRUAL_PREFIX,
            )?,
            due_amount_calculation_scheduled_event(vault, effective_datetime)?,
        ];

        tracing::info!(account_id, %principal, %deposit_account, "loan activated");
        Ok(HookResult {
            instructions,
            scheduled_events,
            ..Default::default()
        })
    }

    /// only repayments in the loan's denomination are accepted, and only up
    /// to everything owed plus the largest possible overpayment fee
    pub fn pre_posting_hook(
        &self,
        vault: &dyn Vault,
        hook: &HookArguments,
        instructions: &[CustomInstruction],
    ) -> Result<HookResult> {
        if instructions.iter().all(|i| i.override_all_restrictions) {
            return Ok(HookResult::default());
        }

        let account_id = vault.account_id();
        let denomination = config::get_denomination(vault)?;
        let wrong_denomination = instructions
            .iter()
            .flat_map(|i| &i.postings)
            .filter(|p| p.debit.account_id == account_id || p.credit.account_id == account_id)
            .any(|p| p.denomination != denomination);
        if wrong_denomination {
            return Ok(HookResult::rejected(Rejection::new(
                format!(
                    "Cannot make transactions in the given denomination, transactions must be one of {}",
                    denomination
                ),
                RejectionReason::WrongDenomination,
            )));
        }

        let net = movement(vault, instructions).net_at(DEFAULT, &denomination);
        if net.is_positive() {
            return Ok(HookResult::rejected(Rejection::against_terms(
                "Debiting from this account is not allowed.",
            )));
        }
        let repayment_amount = -net;
        if !repayment_amount.is_positive() {
            return Ok(HookResult::default());
        }

        if let Some(rejection) = reject_repayment(vault, hook.effective_datetime)? {
            return Ok(HookResult::rejected(rejection));
        }
        if let Some(rejection) = validate_overpayment(vault, repayment_amount, &vault.live_balances(), &denomination)? {
            tracing::debug!(account_id, %repayment_amount, "repayment exceeds what is owed");
            return Ok(HookResult::rejected(rejection));
        }
        Ok(HookResult::default())
    }

    /// distribute a committed repayment. whatever is left once everything
    /// due is cleared is an overpayment: the fee is charged and settled
    /// from it and the rest reduces the principal
    pub fn post_posting_hook(
        &self,
        vault: &dyn Vault,
        hook: &HookArguments,
        instructions: &[CustomInstruction],
    ) -> Result<HookResult> {
        let account_id = vault.account_id();
        let denomination = config::get_denomination(vault)?;
        let repayment_amount = -movement(vault, instructions).net_at(DEFAULT, &denomination);
        if !repayment_amount.is_positive() {
            return Ok(HookResult::default());
        }

        let balances = vault.live_balances();
        let (mut result, overpayment_amount) =
            generate_repayment_postings(account_id, &balances, repayment_amount, &denomination);

        if overpayment_amount.is_positive() {
            let fee = get_capped_overpayment_fee(vault, overpayment_amount, &balances, &denomination)?;
            result.extend(charge_overpayment_fee(vault, overpayment_amount, fee, &denomination)?);

            let mut postings = handle_overpayment(vault, overpayment_amount - fee, &denomination, &balances)?;
            postings.extend(create_postings(fee, account_id, DEFAULT, account_id, PENALTIES, &denomination));
            if !postings.is_empty() {
                result.push(CustomInstruction::new(postings).with_details(standard_instruction_details(
                    "Process repayment overpayment",
                    PROCESS_REPAYMENTS,
                    true,
                    &self.account_type,
                )));
            }
        }

        tracing::info!(
            account_id,
            %repayment_amount,
            %overpayment_amount,
            effective_datetime = %hook.effective_datetime,
            "repayment processed"
        );
        Ok(HookResult::with_instructions(result))
    }

    pub fn scheduled_event_hook(&self, vault: &dyn Vault, hook: &HookArguments) -> Result<HookResult> {
        match hook.event_type.as_deref() {
            Some(ACCRUE_INTEREST) => self.accrue_interest(vault, hook),
            Some(DUE_AMOUNT_CALCULATION) => self.calculate_due_amounts(vault, hook),
            other => Err(LendingError::InvalidConfiguration {
                message: format!("unsupported scheduled event {:?}", other),
            }),
        }
    }

    fn accrue_interest(&self, vault: &dyn Vault, hook: &HookArguments) -> Result<HookResult> {
        // capitalised interest is accrued on from the same day
        let mut instructions = handle_interest_capitalisation(vault, hook.effective_datetime, &self.account_type)?;
        let accruals = daily_accrual_logic(vault, hook, self.interest_rate(), &self.account_type, &instructions)?;
        instructions.extend(accruals);

        if !is_interest_accrual_blocked(vault, hook.effective_datetime)? {
            instructions.extend(track_interest_on_expected_principal(vault, hook, self.interest_rate())?);
        }
        Ok(HookResult::with_instructions(instructions))
    }

    fn calculate_due_amounts(&self, vault: &dyn Vault, hook: &HookArguments) -> Result<HookResult> {
        let effective_datetime = hook.effective_datetime;
        let account_id = vault.account_id();
        let denomination = config::get_denomination(vault)?;

        if is_due_amount_calculation_blocked(vault, effective_datetime)? {
            // a holiday that increases the emi still uses up a term
            let preference = get_repayment_holiday_impact_preference(vault, effective_datetime)?;
            tracing::info!(account_id, ?preference, "due amount calculation blocked");
            if preference != RepaymentHolidayImpactPreference::IncreaseEmi {
                return Ok(HookResult::default());
            }
            let postings = update_due_amount_calculation_counter(account_id, &denomination);
            return Ok(HookResult::with_instructions(vec![CustomInstruction::new(postings)
                .with_details(standard_instruction_details(
                    "Updating due amount calculation counter during repayment holiday",
                    DUE_AMOUNT_CALCULATION,
                    false,
                    &self.account_type,
                ))
                .override_restrictions()]));
        }

        let balances = vault.balances_at(effective_datetime);
        let conditions = self.reamortisation_conditions();
        let features = DueAmountFeatures {
            amortisation: self.amortisation(),
            apply_interest: true,
            reamortisation_conditions: &conditions,
            inputs: self.inputs(),
        };

        let mut instructions = schedule_logic(vault, hook, &self.account_type, &features, Some(&balances))?;
        let notifications = due_amount_notification(
            &self.product_name,
            vault,
            &instructions,
            &denomination,
            effective_datetime,
        )
        .into_iter()
        .collect();
        instructions.extend(track_emi_principal_excess(vault, &balances, &denomination)?);
        instructions.extend(reset_due_amount_calc_overpayment_trackers(account_id, &balances, &denomination));

        Ok(HookResult {
            instructions,
            notifications,
            ..Default::default()
        })
    }

    /// a loan closes only once nothing is owed. its trackers and emi are
    /// cleared on the way out
    pub fn deactivation_hook(&self, vault: &dyn Vault, hook: &HookArguments) -> Result<HookResult> {
        let account_id = vault.account_id();
        let denomination = config::get_denomination(vault)?;
        let balances = vault.live_balances();

        let outstanding = get_total_outstanding_debt(&balances, &denomination);
        if outstanding.is_positive() {
            tracing::debug!(account_id, %outstanding, "loan still owes");
            return Ok(HookResult::rejected(Rejection::against_terms(
                "The loan cannot be closed until all outstanding debt is repaid.",
            )));
        }

        let mut postings = due_calculation::get_residual_cleanup_postings(&balances, account_id, &denomination);
        postings.extend(overpayment::get_residual_cleanup_postings(&balances, account_id, &denomination));
        postings.extend(reset_tracker_balances(
            &balances,
            account_id,
            &[CAPITALISED_INTEREST_TRACKER],
            INTERNAL_CONTRA,
            &denomination,
            Tside::Asset,
        ));
        postings.extend(update_emi(account_id, &denomination, balances.net_at(EMI, &denomination), Money::ZERO));

        if postings.is_empty() {
            return Ok(HookResult::default());
        }
        tracing::info!(account_id, effective_datetime = %hook.effective_datetime, "loan closed");
        Ok(HookResult::with_instructions(vec![CustomInstruction::new(postings)
            .with_details(standard_instruction_details(
                "Clear off all residual balances",
                ACCOUNT_CLOSURE,
                false,
                &self.account_type,
            ))
            .override_restrictions()]))
    }

    pub fn pre_parameter_change_hook(
        &self,
        vault: &dyn Vault,
        _hook: &HookArguments,
        updated: &BTreeMap<String, ParameterValue>,
    ) -> Result<HookResult> {
        let Some(value) = updated.get(PARAM_DUE_AMOUNT_CALCULATION_DAY) else {
            return Ok(HookResult::default());
        };
        if !value.as_int().map_or(false, |day| (1..=31).contains(&day)) {
            return Ok(HookResult::rejected(Rejection::against_terms(
                "The monthly repayment day must be between 1 and 31.",
            )));
        }
        Ok(validate_due_amount_calculation_day_change(vault)
            .map(HookResult::rejected)
            .unwrap_or_default())
    }

    /// move the due amount calculation schedule to a new day, skipping
    /// anything before the next date the new day gives
    pub fn post_parameter_change_hook(
        &self,
        vault: &dyn Vault,
        hook: &HookArguments,
        updated: &BTreeMap<String, ParameterValue>,
    ) -> Result<HookResult> {
        let Some(day) = updated
            .get(PARAM_DUE_AMOUNT_CALCULATION_DAY)
            .and_then(|value| value.as_int())
            .and_then(|day| u32::try_from(day).ok())
        else {
            return Ok(HookResult::default());
        };

        let effective_datetime = hook.effective_datetime;
        let balances = vault.balances_at(effective_datetime);
        let term = self
            .amortisation()
            .term_details(vault, effective_datetime, true, &self.inputs(), &balances)?;
        let next = get_next_due_amount_calculation_datetime(
            vault,
            effective_datetime,
            term.elapsed_term,
            term.remaining_term,
            Some(day),
        )?;
        let schedule = monthly_scheduled_event(vault, DUE_AMOUNT_CALCULATION, next, DUE_AMOUNT_CALCULATION_PREFIX, day)?;

        tracing::info!(account_id = vault.account_id(), day, %next, "moving due amount calculation");
        Ok(HookResult {
            schedule_updates: vec![UpdateEventTypeDirective {
                event_type: DUE_AMOUNT_CALCULATION.to_string(),
                expression: schedule.expression,
                skip_until: Some(next),
            }],
            ..Default::default()
        })
    }

    pub fn derived_parameters(&self, vault: &dyn Vault, effective_datetime: DateTime<Utc>) -> Result<DerivedParameters> {
        let denomination = config::get_denomination(vault)?;
        let balances = vault.balances_at(effective_datetime);
        let term = self
            .amortisation()
            .term_details(vault, effective_datetime, false, &self.inputs(), &balances)?;

        let next_repayment_date =
            get_actual_next_repayment_date(vault, effective_datetime, term.elapsed_term, term.remaining_term)?;

        Ok(DerivedParameters {
            next_repayment_date: next_datetime_after_calendar_events(
                next_repayment_date,
                &vault.calendar_events(&self.calendar_ids),
            ),
            emi: get_expected_emi(&balances, &denomination),
            remaining_term: term.remaining_term,
            total_outstanding_debt: get_total_outstanding_debt(&balances, &denomination),
            total_due: get_total_due_amount(&balances, &denomination),
            outstanding_principal: get_outstanding_principal(&balances, &denomination),
        })
    }
}

/// net effect of `instructions` on this account
fn movement(vault: &dyn Vault, instructions: &[CustomInstruction]) -> BalanceSnapshot {
    BalanceSnapshot::new(vault.tside(), None).with_instructions(instructions, vault.account_id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addresses::{
        ACCRUED_INTEREST, DUE_CALC_EVENT_COUNTER, INTEREST_DUE, NON_EMI_ACCRUED_INTEREST, OVERPAYMENT, PRINCIPAL_DUE,
    };
    use crate::config::{LoanConfig, PARAM_REPAYMENT_HOLIDAY_IMPACT_PREFERENCE, REPAYMENT_HOLIDAY_FLAG};
    use crate::events::CHARGE_OVERPAYMENT_FEE;
    use crate::vault::{CalendarEvent, InMemoryVault};
    use chrono::{Datelike, TimeZone};
    use hourglass_rs::{SafeTimeProvider, TimeSource};
    use rust_decimal_macros::dec;

    fn created() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
    }

    fn config() -> LoanConfig {
        LoanConfig::fixed_rate_loan("loan", created(), "GBP", dec!(1000), dec!(0.12), 12)
            .with_parameter(PARAM_DEPOSIT_ACCOUNT, ParameterValue::Text("deposit".to_string()))
    }

    fn activated(product: &LoanProduct, config: &LoanConfig) -> InMemoryVault {
        let mut vault = InMemoryVault::from_config(config);
        let result = product.activation_hook(&vault, &HookArguments::new(created())).unwrap();
        vault.commit(&result.instructions, created()).unwrap();
        vault
    }

    fn repayment(amount: Money, denomination: &str) -> CustomInstruction {
        CustomInstruction::new(create_postings(amount, "customer", DEFAULT, "loan", DEFAULT, denomination))
    }

    fn repay(product: &LoanProduct, vault: &mut InMemoryVault, amount: Money, at: DateTime<Utc>) -> HookResult {
        let instruction = repayment(amount, "GBP");
        let hook = HookArguments::new(at);
        let pre = product
            .pre_posting_hook(vault, &hook, std::slice::from_ref(&instruction))
            .unwrap();
        assert_eq!(pre.rejection, None);

        vault.commit(std::slice::from_ref(&instruction), at).unwrap();
        let post = product.post_posting_hook(vault, &hook, &[instruction]).unwrap();
        vault.commit(&post.instructions, at).unwrap();
        post
    }

    fn run_event(product: &LoanProduct, vault: &mut InMemoryVault, hook: &HookArguments) -> HookResult {
        let result = product.scheduled_event_hook(vault, hook).unwrap();
        vault.commit(&result.instructions, hook.effective_datetime).unwrap();
        vault.record_execution(hook.event_type_or(ACCRUE_INTEREST), hook.effective_datetime);
        result
    }

    #[test]
    fn test_activation() {
        let product = LoanProduct::default();
        let vault = InMemoryVault::from_config(&config());
        let result = product.activation_hook(&vault, &HookArguments::new(created())).unwrap();

        let balances = movement(&vault, &result.instructions);
        assert_eq!(balances.net_at(PRINCIPAL, "GBP"), Money::from_major(1000));
        assert_eq!(get_expected_emi(&balances, "GBP"), Money::from_decimal(dec!(88.85)));

        assert_eq!(result.scheduled_events.len(), 2);
        assert_eq!(result.scheduled_events[0].event_type, ACCRUE_INTEREST);
        assert_eq!(result.scheduled_events[0].start_datetime, at(2024, 1, 2));
        assert_eq!(result.scheduled_events[1].event_type, DUE_AMOUNT_CALCULATION);
        assert_eq!(result.scheduled_events[1].expression.day, Some(28));
    }

    #[test]
    fn test_activation_requires_deposit_account() {
        let product = LoanProduct::default();
        let config = LoanConfig::fixed_rate_loan("loan", created(), "GBP", dec!(1000), dec!(0.12), 12);
        let err = product
            .activation_hook(&InMemoryVault::from_config(&config), &HookArguments::new(created()))
            .unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_full_lifecycle() {
        let product = LoanProduct::default();
        let mut vault = activated(&product, &config());

        let time = SafeTimeProvider::new(TimeSource::Test(created()));
        let control = time.test_control().unwrap();
        let first_due = at(2024, 2, 28);

        let mut due_events = 0;
        while due_events < 12 {
            control.advance(Duration::days(1));
            let now = time.now();
            run_event(&product, &mut vault, &HookArguments::now(&time, Some(ACCRUE_INTEREST)));

            if now.day() == 28 && now >= first_due {
                let result = run_event(&product, &mut vault, &HookArguments::now(&time, Some(DUE_AMOUNT_CALCULATION)));
                assert_eq!(result.notifications.len(), 1);
                assert_eq!(result.notifications[0].notification_type, "LOAN_REPAYMENT");
                due_events += 1;

                let due = get_total_due_amount(&vault.live_balances(), "GBP");
                assert!(due.is_positive());
                let post = repay(&product, &mut vault, due, now);
                assert_eq!(post.instructions.len(), 1);
            }
        }

        assert_eq!(time.now(), at(2025, 1, 28));
        let balances = vault.live_balances();
        assert_eq!(balances.net_at(PRINCIPAL, "GBP"), Money::ZERO);
        assert_eq!(balances.net_at(ACCRUED_INTEREST, "GBP"), Money::ZERO);
        assert_eq!(balances.net_at(NON_EMI_ACCRUED_INTEREST, "GBP"), Money::ZERO);
        assert_eq!(balances.net_at(DEFAULT, "GBP"), Money::ZERO);
        assert_eq!(balances.net_at(DUE_CALC_EVENT_COUNTER, "GBP"), Money::from_major(12));
        assert_eq!(get_total_outstanding_debt(&balances, "GBP"), Money::ZERO);

        let closure = product.deactivation_hook(&vault, &HookArguments::new(time.now())).unwrap();
        assert_eq!(closure.rejection, None);
        vault.commit(&closure.instructions, time.now()).unwrap();

        let closed = vault.live_balances();
        assert_eq!(closed.net_at(DUE_CALC_EVENT_COUNTER, "GBP"), Money::ZERO);
        assert_eq!(closed.net_at(EMI, "GBP"), Money::ZERO);
    }

    #[test]
    fn test_first_due_amount_calculation() {
        let product = LoanProduct::default();
        let mut vault = activated(&product, &config());
        for day in 1..=58 {
            let hook = HookArguments::scheduled(created() + Duration::days(day), ACCRUE_INTEREST);
            run_event(&product, &mut vault, &hook);
        }

        let due_at = at(2024, 2, 28);
        let result = run_event(&product, &mut vault, &HookArguments::scheduled(due_at, DUE_AMOUNT_CALCULATION));
        let moved = movement(&vault, &result.instructions);
        let due_principal = moved.net_at(PRINCIPAL_DUE, "GBP");
        let due_interest = moved.net_at(INTEREST_DUE, "GBP");
        assert!(due_principal.is_positive());
        // the first period runs longer than a month, so more than the emi falls due
        assert!(due_principal + due_interest > Money::from_decimal(dec!(88.85)));

        let details = &result.notifications[0].notification_details;
        assert_eq!(details.get("due_date").map(|s| s.as_str()), Some("2024-02-28"));

        let balances = vault.live_balances();
        assert_eq!(balances.net_at(ACCRUED_INTEREST, "GBP"), Money::ZERO);
        assert_eq!(balances.net_at(NON_EMI_ACCRUED_INTEREST, "GBP"), Money::ZERO);
        assert_eq!(balances.net_at(DUE_CALC_EVENT_COUNTER, "GBP"), Money::ONE);
    }

    #[test]
    fn test_overpayment_reduces_principal_after_fee() {
        let product = LoanProduct::default();
        let mut vault = activated(&product, &config());

        let result = repay(&product, &mut vault, Money::from_major(200), at(2024, 1, 10));
        assert_eq!(result.instructions.len(), 2);
        assert_eq!(
            result.instructions[0].instruction_details.get("event").map(|s| s.as_str()),
            Some(CHARGE_OVERPAYMENT_FEE)
        );

        let balances = vault.live_balances();
        assert_eq!(balances.net_at(PRINCIPAL, "GBP"), Money::from_major(810));
        assert_eq!(balances.net_at(OVERPAYMENT, "GBP"), Money::from_major(190));
        assert_eq!(balances.net_at(PENALTIES, "GBP"), Money::ZERO);
        assert_eq!(balances.net_at(DEFAULT, "GBP"), Money::ZERO);
    }

    #[test]
    fn test_repayment_beyond_what_is_owed_is_rejected() {
        let product = LoanProduct::default();
        let vault = activated(&product, &config());

        let result = product
            .pre_posting_hook(
                &vault,
                &HookArguments::new(at(2024, 1, 10)),
                &[repayment(Money::from_major(2000), "GBP")],
            )
            .unwrap();
        assert_eq!(
            result.rejection,
            Some(Rejection::against_terms("Cannot pay more than is owed."))
        );
    }

    #[test]
    fn test_pre_posting_rejections() {
        let product = LoanProduct::default();
        let mut vault = activated(&product, &config());
        let hook = HookArguments::new(at(2024, 1, 10));

        let wrong_currency = product
            .pre_posting_hook(&vault, &hook, &[repayment(Money::from_major(10), "USD")])
            .unwrap();
        assert_eq!(
            wrong_currency.rejection.map(|r| r.reason_code),
            Some(RejectionReason::WrongDenomination)
        );

        let withdrawal = CustomInstruction::new(create_postings(
            Money::from_major(10),
            "loan",
            DEFAULT,
            "customer",
            DEFAULT,
            "GBP",
        ));
        let debit = product
            .pre_posting_hook(&vault, &hook, std::slice::from_ref(&withdrawal))
            .unwrap();
        assert!(debit.rejection.is_some());
        assert!(product
            .pre_posting_hook(&vault, &hook, &[withdrawal.override_restrictions()])
            .unwrap()
            .rejection
            .is_none());

        vault.set_flag(REPAYMENT_HOLIDAY_FLAG, true, at(2024, 1, 5));
        let during_holiday = product
            .pre_posting_hook(&vault, &hook, &[repayment(Money::from_major(10), "GBP")])
            .unwrap();
        assert_eq!(
            during_holiday.rejection,
            Some(Rejection::against_terms("Repayments are blocked for this account."))
        );
    }

    #[test]
    fn test_due_amount_calculation_during_holiday() {
        let product = LoanProduct::default();
        let mut vault = activated(&product, &config());
        vault.set_flag(REPAYMENT_HOLIDAY_FLAG, true, at(2024, 2, 1));

        let hook = HookArguments::scheduled(at(2024, 2, 28), DUE_AMOUNT_CALCULATION);
        let result = product.scheduled_event_hook(&vault, &hook).unwrap();
        assert!(result.notifications.is_empty());
        let moved = movement(&vault, &result.instructions);
        assert_eq!(moved.net_at(DUE_CALC_EVENT_COUNTER, "GBP"), Money::ONE);
        assert_eq!(moved.net_at(PRINCIPAL_DUE, "GBP"), Money::ZERO);

        vault.set_parameter(
            PARAM_REPAYMENT_HOLIDAY_IMPACT_PREFERENCE,
            ParameterValue::Union("increase_term".to_string()),
            at(2024, 2, 1),
        );
        assert!(product.scheduled_event_hook(&vault, &hook).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_scheduled_event() {
        let product = LoanProduct::default();
        let vault = activated(&product, &config());
        let hook = HookArguments::scheduled(at(2024, 1, 2), "MONTHLY_FEE");
        assert!(product.scheduled_event_hook(&vault, &hook).is_err());
    }

    #[test]
    fn test_closing_with_outstanding_debt_is_rejected() {
        let product = LoanProduct::default();
        let vault = activated(&product, &config());
        let result = product.deactivation_hook(&vault, &HookArguments::new(at(2024, 1, 10))).unwrap();
        assert!(result.rejection.is_some());
        assert!(result.instructions.is_empty());
    }

    #[test]
    fn test_due_day_change() {
        let product = LoanProduct::default();
        let mut vault = activated(&product, &config());
        let mut updated = BTreeMap::new();
        updated.insert(PARAM_DUE_AMOUNT_CALCULATION_DAY.to_string(), ParameterValue::Integer(10));

        let before_first_due = product
            .pre_parameter_change_hook(&vault, &HookArguments::new(at(2024, 1, 10)), &updated)
            .unwrap();
        assert!(before_first_due.rejection.is_some());

        run_event(&product, &mut vault, &HookArguments::scheduled(at(2024, 2, 28), DUE_AMOUNT_CALCULATION));
        let hook = HookArguments::new(at(2024, 3, 1));
        assert!(product
            .pre_parameter_change_hook(&vault, &hook, &updated)
            .unwrap()
            .rejection
            .is_none());

        let mut out_of_range = BTreeMap::new();
        out_of_range.insert(PARAM_DUE_AMOUNT_CALCULATION_DAY.to_string(), ParameterValue::Integer(32));
        assert!(product
            .pre_parameter_change_hook(&vault, &hook, &out_of_range)
            .unwrap()
            .rejection
            .is_some());

        vault.set_parameter(PARAM_DUE_AMOUNT_CALCULATION_DAY, ParameterValue::Integer(10), at(2024, 3, 1));
        let result = product.post_parameter_change_hook(&vault, &hook, &updated).unwrap();
        assert_eq!(result.schedule_updates.len(), 1);
        assert_eq!(result.schedule_updates[0].expression.day, Some(10));
        assert_eq!(result.schedule_updates[0].skip_until, Some(at(2024, 3, 10)));
    }

    #[test]
    fn test_derived_parameters() {
        let product = LoanProduct::default();
        let vault = activated(&product, &config());

        let derived = product.derived_parameters(&vault, at(2024, 1, 15)).unwrap();
        assert_eq!(derived.next_repayment_date, at(2024, 2, 28));
        assert_eq!(derived.emi, Money::from_decimal(dec!(88.85)));
        assert_eq!(derived.remaining_term, 12);
        assert_eq!(derived.outstanding_principal, Money::from_major(1000));
        assert_eq!(derived.total_outstanding_debt, Money::from_major(1000));
        assert_eq!(derived.total_due, Money::ZERO);
    }

    #[test]
    fn test_overpayment_shortens_remaining_term() {
        let product = LoanProduct::default();
        let mut vault = activated(&product, &config());

        // 475 of the 500 reaches principal, leaving 525 to clear at 88.85 a month
        repay(&product, &mut vault, Money::from_major(500), at(2024, 1, 10));
        assert_eq!(vault.live_balances().net_at(PRINCIPAL, "GBP"), Money::from_major(525));

        let derived = product.derived_parameters(&vault, at(2024, 1, 15)).unwrap();
        assert_eq!(derived.emi, Money::from_decimal(dec!(88.85)));
        assert_eq!(derived.remaining_term, 7);
    }

    #[test]
    fn test_paid_off_loan_has_no_remaining_term() {
        let product = LoanProduct::default();
        let mut vault = activated(&product, &config());

        let everything = overpayment::get_max_overpayment_amount(&vault, &vault.live_balances(), "GBP").unwrap();
        repay(&product, &mut vault, everything, at(2024, 1, 10));
        assert_eq!(vault.live_balances().net_at(PRINCIPAL, "GBP"), Money::ZERO);

        let derived = product.derived_parameters(&vault, at(2024, 1, 15)).unwrap();
        assert_eq!(derived.remaining_term, 0);
        assert_eq!(derived.outstanding_principal, Money::ZERO);
    }

    #[test]
    fn test_next_repayment_date_skips_calendar_events() {
        let mut vault = activated(&LoanProduct::default(), &config());
        vault.add_calendar_event(CalendarEvent {
            id: "closure".to_string(),
            calendar_id: "bank_holidays".to_string(),
            start_datetime: at(2024, 2, 28),
            end_datetime: Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 59).unwrap(),
        });

        let derived = LoanProduct::default().derived_parameters(&vault, at(2024, 1, 15)).unwrap();
        assert_eq!(derived.next_repayment_date, at(2024, 3, 1));

        let other_calendar = LoanProduct::default().with_calendar_ids(&["weekends"]);
        let derived = other_calendar.derived_parameters(&vault, at(2024, 1, 15)).unwrap();
        assert_eq!(derived.next_repayment_date, at(2024, 2, 28));
    }

    #[test]
    fn test_variable_rate_product_reamortises_on_rate_change() {
        let product = LoanProduct::new("mortgage").with_rate_type(RateType::Variable);
        assert_eq!(product.account_type, "MORTGAGE");
        assert_eq!(product.reamortisation_conditions().len(), 3);
        assert_eq!(LoanProduct::default().reamortisation_conditions().len(), 2);
    }
}
