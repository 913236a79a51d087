/// overpayment - paying more than is due, with the fee taken out of the overpayment
use chrono::{TimeZone, Utc};
use lending_engine_rs::addresses::{OVERPAYMENT, PRINCIPAL};
use lending_engine_rs::config::PARAM_DEPOSIT_ACCOUNT;
use lending_engine_rs::postings::create_postings;
use lending_engine_rs::{CustomInstruction, HookArguments, InMemoryVault, LoanConfig, LoanProduct, Money, ParameterValue, Vault};
use rust_decimal_macros::dec;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let config = LoanConfig::fixed_rate_loan("loan", created, "GBP", dec!(10000), dec!(0.08), 24)
        .with_parameter(PARAM_DEPOSIT_ACCOUNT, ParameterValue::Text("current".to_string()));
    let product = LoanProduct::default();
    let mut vault = InMemoryVault::from_config(&config);

    let activation = product.activation_hook(&vault, &HookArguments::new(created))?;
    vault.commit(&activation.instructions, created)?;

    let paid_on = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
    let hook = HookArguments::new(paid_on);

    // more than the loan plus the largest fee is refused
    let too_much = CustomInstruction::new(create_postings(Money::from_major(20_000), "current", "DEFAULT", "loan", "DEFAULT", "GBP"));
    if let Some(rejection) = product.pre_posting_hook(&vault, &hook, &[too_much])?.rejection {
        println!("rejected: {}", rejection.message);
    }

    let overpayment = CustomInstruction::new(create_postings(Money::from_major(1_000), "current", "DEFAULT", "loan", "DEFAULT", "GBP"));
    vault.commit(std::slice::from_ref(&overpayment), paid_on)?;
    let processed = product.post_posting_hook(&vault, &hook, &[overpayment])?;
    vault.commit(&processed.instructions, paid_on)?;

    for instruction in &processed.instructions {
        println!("{}", instruction.description().unwrap_or("-"));
    }

    let balances = vault.live_balances();
    println!("principal: £{}", balances.net_at(PRINCIPAL, "GBP"));
    println!("overpaid:  £{}", balances.net_at(OVERPAYMENT, "GBP"));
    println!("emi:       £{}", product.derived_parameters(&vault, paid_on)?.emi);

    Ok(())
}
