use crate::addresses::{ALL_OUTSTANDING, DEFAULT, PRINCIPAL, REPAYMENT_HIERARCHY};
use crate::balances::BalanceSnapshot;
use crate::decimal::Money;
use crate::events::PROCESS_REPAYMENTS;
use crate::postings::{create_postings, CustomInstruction, Posting};

/// decimal places each due address is rounded to for repayment purposes
pub const REPAYMENT_PRECISION: u32 = 2;

/// how much of a repayment goes to one address. the rounded amount is what
/// moves, the unrounded amount is what it clears
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepaymentAmounts {
    pub unrounded: Money,
    pub rounded: Money,
}

/// repayment per address, in hierarchy order
pub type AddressRepayments = Vec<(String, RepaymentAmounts)>;

/// distribution of a repayment across one or more loans
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RepaymentDistribution {
    pub per_target: Vec<(String, AddressRepayments)>,
    /// what is left once everything due has been paid
    pub remaining: Money,
}

impl RepaymentDistribution {
    pub fn for_target(&self, account_id: &str) -> Option<&AddressRepayments> {
        self.per_target
            .iter()
            .find(|(target, _)| target == account_id)
            .map(|(_, repayments)| repayments)
    }
}

/// spread a repayment over the hierarchy, clearing each address in turn.
/// balances that round to zero are skipped
pub fn distribute_repayment_for_single_target(
    balances: &BalanceSnapshot,
    repayment_amount: Money,
    denomination: &str,
    repayment_hierarchy: &[&str],
) -> (AddressRepayments, Money) {
    let mut remaining = repayment_amount;
    let mut per_address = Vec::new();

    for address in repayment_hierarchy {
        let unrounded_balance = balances.net_at(address, denomination);
        let rounded_balance = unrounded_balance.round_dp(REPAYMENT_PRECISION);
        let rounded_repayment = rounded_balance.min(remaining);
        if rounded_repayment.is_zero() {
            continue;
        }

        // a full repayment clears the unrounded balance, a partial one only what was paid
        let unrounded_repayment = if rounded_balance <= remaining {
            unrounded_balance
        } else {
            remaining
        };
        per_address.push((
            address.to_string(),
            RepaymentAmounts {
                unrounded: unrounded_repayment,
                rounded: rounded_repayment,
            },
        ));
        remaining -= rounded_repayment;
    }

    (per_address, remaining)
}

/// spread a repayment over several loans. each group of the hierarchy is
/// paid on every target, in the order given, before moving to the next group
pub fn distribute_repayment_for_multiple_targets(
    balances_per_target: &[(&str, &BalanceSnapshot)],
    repayment_amount: Money,
    denomination: &str,
    repayment_hierarchy: &[&[&str]],
) -> RepaymentDistribution {
    let mut distribution = RepaymentDistribution {
        per_target: balances_per_target
            .iter()
            .map(|(target, _)| (target.to_string(), Vec::new()))
            .collect(),
        remaining: repayment_amount,
    };

    for addresses in repayment_hierarchy {
        for (index, (_, balances)) in balances_per_target.iter().enumerate() {
            let (per_address, remaining) =
                distribute_repayment_for_single_target(balances, distribution.remaining, denomination, addresses);
            distribution.per_target[index].1.extend(per_address);
            distribution.remaining = remaining;

            if distribution.remaining.is_zero() {
                return distribution;
            }
        }
    }

    distribution
}

/// move the repaid amounts out of DEFAULT onto the addresses they clear
pub fn repayment_postings(account_id: &str, denomination: &str, repayments: &AddressRepayments) -> Vec<Posting> {
    repayments
        .iter()
        .flat_map(|(address, amounts)| {
            create_postings(amounts.rounded, account_id, DEFAULT, account_id, address, denomination)
        })
        .collect()
}

/// distribute a repayment over the standard hierarchy. returns the
/// instructions and whatever was paid beyond the amount due
pub fn generate_repayment_postings(
    account_id: &str,
    balances: &BalanceSnapshot,
    repayment_amount: Money,
    denomination: &str,
) -> (Vec<CustomInstruction>, Money) {
    if !repayment_amount.is_positive() {
        return (Vec::new(), Money::ZERO);
    }

    let (per_address, remaining) =
        distribute_repayment_for_single_target(balances, repayment_amount, denomination, &REPAYMENT_HIERARCHY);
    let postings = repayment_postings(account_id, denomination, &per_address);
    tracing::debug!(account_id, %repayment_amount, %remaining, "repayment distributed");

    if postings.is_empty() {
        return (Vec::new(), remaining);
    }
    let instruction = CustomInstruction::new(postings)
        .with_description("Process a repayment")
        .with_event(PROCESS_REPAYMENTS);
    (vec![instruction], remaining)
}

/// everything currently due, rounded after summing
pub fn get_total_due_amount(balances: &BalanceSnapshot, denomination: &str) -> Money {
    balances
        .sum_nets(&REPAYMENT_HIERARCHY, denomination)
        .round_dp(REPAYMENT_PRECISION)
}

/// everything owed including principal not yet due and accrued interest
pub fn get_total_outstanding_debt(balances: &BalanceSnapshot, denomination: &str) -> Money {
    balances
        .sum_nets(&ALL_OUTSTANDING, denomination)
        .round_dp(REPAYMENT_PRECISION)
}

pub fn get_outstanding_principal(balances: &BalanceSnapshot, denomination: &str) -> Money {
    balances.net_at(PRINCIPAL, denomination)
}

/// a repayment beyond what is currently due
pub fn is_posting_an_overpayment(repayment_amount: Money, balances: &BalanceSnapshot, denomination: &str) -> bool {
    repayment_amount > get_total_due_amount(balances, denomination)
}
