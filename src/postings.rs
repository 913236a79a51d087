use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::addresses::DEFAULT;
use crate::balances::{Balance, BalanceCoordinate, BalanceSnapshot};
use crate::decimal::Money;
use crate::errors::{ensure_non_negative, Result};
use crate::types::{Phase, Tside, DEFAULT_ASSET};

/// one side of a movement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerAddress {
    pub account_id: String,
    pub address: String,
}

impl LedgerAddress {
    pub fn new(account_id: &str, address: &str) -> Self {
        Self {
            account_id: account_id.to_string(),
            address: address.to_string(),
        }
    }
}

/// balanced movement of a non-negative amount from one address to another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub amount: Money,
    pub debit: LedgerAddress,
    pub credit: LedgerAddress,
    pub denomination: String,
    pub asset: String,
    pub phase: Phase,
}

/// batch of postings committed atomically by the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CustomInstruction {
    pub postings: Vec<Posting>,
    pub instruction_details: BTreeMap<String, String>,
    pub override_all_restrictions: bool,
}

impl CustomInstruction {
    pub fn new(postings: Vec<Posting>) -> Self {
        Self {
            postings,
            instruction_details: BTreeMap::new(),
            override_all_restrictions: false,
        }
    }

    pub fn with_details(mut self, instruction_details: BTreeMap<String, String>) -> Self {
        self.instruction_details = instruction_details;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.instruction_details
            .insert("description".to_string(), description.into());
        self
    }

    pub fn with_event(self, event_type: impl Into<String>) -> Self {
        self.with_detail("event", event_type)
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<String>) -> Self {
        self.instruction_details.insert(key.to_string(), value.into());
        self
    }

    pub fn override_restrictions(mut self) -> Self {
        self.override_all_restrictions = true;
        self
    }

    pub fn description(&self) -> Option<&str> {
        self.instruction_details.get("description").map(|s| s.as_str())
    }

    /// net effect on one account's balances
    pub fn balances(&self, account_id: &str, tside: Tside) -> BalanceSnapshot {
        let mut legs: HashMap<BalanceCoordinate, (Money, Money)> = HashMap::new();

        for posting in &self.postings {
            if posting.debit.account_id == account_id {
                let coordinate = BalanceCoordinate::new(
                    &posting.debit.address,
                    &posting.asset,
                    &posting.denomination,
                    posting.phase,
                );
                legs.entry(coordinate).or_default().1 += posting.amount;
            }
            if posting.credit.account_id == account_id {
                let coordinate = BalanceCoordinate::new(
                    &posting.credit.address,
                    &posting.asset,
                    &posting.denomination,
                    posting.phase,
                );
                legs.entry(coordinate).or_default().0 += posting.amount;
            }
        }

        let balances = legs
            .into_iter()
            .map(|(coordinate, (credit, debit))| (coordinate, Balance::new(credit, debit, tside)))
            .collect();

        BalanceSnapshot::from_balances(balances, tside, None)
    }

    /// every leg must carry a non-negative amount
    pub fn validate(&self) -> Result<()> {
        for posting in &self.postings {
            ensure_non_negative(&format!("posting to {}", posting.credit.address), posting.amount)?;
        }
        Ok(())
    }
}

/// debit one address and credit another by `amount`.
/// nothing is produced when the amount is not positive
pub fn create_postings(
    amount: Money,
    debit_account: &str,
    debit_address: &str,
    credit_account: &str,
    credit_address: &str,
    denomination: &str,
) -> Vec<Posting> {
    if !amount.is_positive() {
        return Vec::new();
    }

    vec![Posting {
        amount,
        debit: LedgerAddress::new(debit_account, debit_address),
        credit: LedgerAddress::new(credit_account, credit_address),
        denomination: denomination.to_string(),
        asset: DEFAULT_ASSET.to_string(),
        phase: Phase::Committed,
    }]
}

/// bring tracker addresses back to zero against their contra address.
/// trackers are assumed to hold non-negative balances
pub fn reset_tracker_balances(
    balances: &BalanceSnapshot,
    account_id: &str,
    tracker_addresses: &[&str],
    contra_address: &str,
    denomination: &str,
    tside: Tside,
) -> Vec<Posting> {
    let mut postings = Vec::new();

    for address in tracker_addresses {
        let tracked = balances.net_at(address, denomination);
        if tracked.is_positive() {
            let (debit_address, credit_address) = match tside {
                Tside::Asset => (contra_address, *address),
                Tside::Liability => (*address, contra_address),
            };
            postings.extend(create_postings(
                tracked,
                account_id,
                debit_address,
                account_id,
                credit_address,
                denomination,
            ));
        }
    }

    postings
}

/// description metadata attached to instructions
pub fn standard_instruction_details(
    description: &str,
    event_type: &str,
    gl_impacted: bool,
    account_type: &str,
) -> BTreeMap<String, String> {
    let mut details = BTreeMap::new();
    details.insert("description".to_string(), description.to_string());
    details.insert("event".to_string(), event_type.to_string());
    details.insert("gl_impacted".to_string(), gl_impacted.to_string());
    details.insert("account_type".to_string(), account_type.to_string());
    details
}

/// postings for accruing a charge. receivable accruals debit the customer
/// address, payable accruals credit it; reversals swap the legs
pub fn accrual_postings(
    customer_account: &str,
    customer_address: &str,
    internal_account: &str,
    denomination: &str,
    amount: Money,
    payable: bool,
    reversal: bool,
) -> Vec<Posting> {
    if payable == reversal {
        create_postings(
            amount,
            customer_account,
            customer_address,
            internal_account,
            DEFAULT,
            denomination,
        )
    } else {
        create_postings(
            amount,
            internal_account,
            DEFAULT,
            customer_account,
            customer_address,
            denomination,
        )
    }
}

/// the addresses and accounts involved when accrued interest is applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationLegs {
    pub customer_account: String,
    pub denomination: String,
    pub accrual_customer_address: String,
    pub accrual_internal_account: String,
    pub application_customer_address: String,
    pub application_internal_account: String,
    pub payable: bool,
}

/// apply `application_amount` and reverse `accrual_amount` of the accrual,
/// which clears any rounding remainder along with it
pub fn accrual_application_postings(
    legs: &ApplicationLegs,
    application_amount: Money,
    accrual_amount: Money,
) -> Vec<Posting> {
    if !application_amount.is_positive() {
        return Vec::new();
    }

    let mut postings = if legs.payable {
        create_postings(
            application_amount,
            &legs.application_internal_account,
            DEFAULT,
            &legs.customer_account,
            &legs.application_customer_address,
            &legs.denomination,
        )
    } else {
        create_postings(
            application_amount,
            &legs.customer_account,
            &legs.application_customer_address,
            &legs.application_internal_account,
            DEFAULT,
            &legs.denomination,
        )
    };

    postings.extend(accrual_postings(
        &legs.customer_account,
        &legs.accrual_customer_address,
        &legs.accrual_internal_account,
        &legs.denomination,
        accrual_amount,
        legs.payable,
        true,
    ));

    postings
}
