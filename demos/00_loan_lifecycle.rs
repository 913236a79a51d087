/// loan lifecycle - a 12 month loan driven day by day through an in-memory ledger
use chrono::{Datelike, Duration, TimeZone, Utc};
use lending_engine_rs::config::PARAM_DEPOSIT_ACCOUNT;
use lending_engine_rs::events::{ACCRUE_INTEREST, DUE_AMOUNT_CALCULATION};
use lending_engine_rs::payments::get_total_due_amount;
use lending_engine_rs::postings::create_postings;
use lending_engine_rs::{
    CustomInstruction, HookArguments, InMemoryVault, LoanConfig, LoanProduct, ParameterValue, SafeTimeProvider,
    TimeSource, Vault,
};
use rust_decimal_macros::dec;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let time = SafeTimeProvider::new(TimeSource::Test(created));
    let controller = time.test_control().unwrap();

    // $1,000 over 12 months at 12%
    let config = LoanConfig::fixed_rate_loan("loan", created, "USD", dec!(1000), dec!(0.12), 12)
        .with_parameter(PARAM_DEPOSIT_ACCOUNT, ParameterValue::Text("checking".to_string()));
    let product = LoanProduct::default();
    let mut vault = InMemoryVault::from_config(&config);

    let activation = product.activation_hook(&vault, &HookArguments::now(&time, None))?;
    vault.commit(&activation.instructions, time.now())?;
    println!("loan activated on {}", time.now().format("%Y-%m-%d"));

    let mut repayments = 0;
    while repayments < 12 {
        controller.advance(Duration::days(1));
        let now = time.now();

        let accrual = product.scheduled_event_hook(&vault, &HookArguments::now(&time, Some(ACCRUE_INTEREST)))?;
        vault.commit(&accrual.instructions, now)?;

        if now.day() != 28 || (now.month() == 1 && now.year() == 2024) {
            continue;
        }

        let due = product.scheduled_event_hook(&vault, &HookArguments::now(&time, Some(DUE_AMOUNT_CALCULATION)))?;
        vault.commit(&due.instructions, now)?;
        vault.record_execution(DUE_AMOUNT_CALCULATION, now);

        // the customer pays exactly what fell due
        let amount = get_total_due_amount(&vault.live_balances(), "USD");
        let repayment = CustomInstruction::new(create_postings(amount, "checking", "DEFAULT", "loan", "DEFAULT", "USD"));
        let hook = HookArguments::now(&time, None);
        if let Some(rejection) = product.pre_posting_hook(&vault, &hook, std::slice::from_ref(&repayment))?.rejection {
            println!("repayment rejected: {}", rejection.message);
            break;
        }
        vault.commit(std::slice::from_ref(&repayment), now)?;
        let processed = product.post_posting_hook(&vault, &hook, &[repayment])?;
        vault.commit(&processed.instructions, now)?;

        repayments += 1;
        let derived = product.derived_parameters(&vault, now)?;
        println!(
            "{}: paid ${}, principal left ${}, next repayment {}",
            now.format("%Y-%m-%d"),
            amount,
            derived.outstanding_principal,
            derived.next_repayment_date.format("%Y-%m-%d")
        );
    }

    let closure = product.deactivation_hook(&vault, &HookArguments::now(&time, None))?;
    match closure.rejection {
        Some(rejection) => println!("\nloan cannot close: {}", rejection.message),
        None => {
            vault.commit(&closure.instructions, time.now())?;
            println!("\nloan closed on {}", time.now().format("%Y-%m-%d"));
        }
    }

    Ok(())
}
