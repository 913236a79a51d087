use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::decimal::Money;
use crate::postings::CustomInstruction;
use crate::types::{Phase, Tside, DEFAULT_ASSET};

/// key of one balance within an account
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BalanceCoordinate {
    pub address: String,
    pub asset: String,
    pub denomination: String,
    pub phase: Phase,
}

impl BalanceCoordinate {
    pub fn new(address: &str, asset: &str, denomination: &str, phase: Phase) -> Self {
        Self {
            address: address.to_string(),
            asset: asset.to_string(),
            denomination: denomination.to_string(),
            phase,
        }
    }

    /// committed balance in the default asset
    pub fn committed(address: &str, denomination: &str) -> Self {
        Self::new(address, DEFAULT_ASSET, denomination, Phase::Committed)
    }
}

/// credit, debit and net legs of a single balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Balance {
    pub credit: Money,
    pub debit: Money,
    pub net: Money,
}

impl Balance {
    pub fn new(credit: Money, debit: Money, tside: Tside) -> Self {
        Self {
            credit,
            debit,
            net: tside.net(credit, debit),
        }
    }

    /// a balance holding only a net value, as seen in fixtures
    pub fn from_net(net: Money, tside: Tside) -> Self {
        match (tside, net.is_negative()) {
            (Tside::Asset, false) | (Tside::Liability, true) => {
                Balance::new(Money::ZERO, net.abs(), tside)
            }
            _ => Balance::new(net.abs(), Money::ZERO, tside),
        }
    }

    fn combine(self, other: Balance, tside: Tside) -> Balance {
        Balance::new(self.credit + other.credit, self.debit + other.debit, tside)
    }
}

/// immutable view of an account's balances at one instant.
/// absent coordinates read as zero
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BalanceSnapshot {
    balances: HashMap<BalanceCoordinate, Balance>,
    tside: Tside,
    timestamp: Option<DateTime<Utc>>,
}

impl BalanceSnapshot {
    pub fn new(tside: Tside, timestamp: Option<DateTime<Utc>>) -> Self {
        Self {
            balances: HashMap::new(),
            tside,
            timestamp,
        }
    }

    pub fn from_balances(
        balances: HashMap<BalanceCoordinate, Balance>,
        tside: Tside,
        timestamp: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            balances,
            tside,
            timestamp,
        }
    }

    /// builder used by adapters and fixtures
    pub fn with_net(mut self, address: &str, denomination: &str, net: Money) -> Self {
        self.balances.insert(
            BalanceCoordinate::committed(address, denomination),
            Balance::from_net(net, self.tside),
        );
        self
    }

    pub fn tside(&self) -> Tside {
        self.tside
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    pub fn get(&self, coordinate: &BalanceCoordinate) -> Balance {
        self.balances.get(coordinate).copied().unwrap_or_default()
    }

    pub fn coordinates(&self) -> impl Iterator<Item = &BalanceCoordinate> {
        self.balances.keys()
    }

    /// committed net at an address
    pub fn net_at(&self, address: &str, denomination: &str) -> Money {
        self.get(&BalanceCoordinate::committed(address, denomination)).net
    }

    /// committed net at an address, rounded half-up
    pub fn rounded_net_at(&self, address: &str, denomination: &str, decimal_places: u32) -> Money {
        self.net_at(address, denomination).round_dp(decimal_places)
    }

    /// sum of committed nets across addresses
    pub fn sum_nets(&self, addresses: &[&str], denomination: &str) -> Money {
        addresses
            .iter()
            .map(|address| self.net_at(address, denomination))
            .sum()
    }

    /// sum of committed nets, each rounded before summing
    pub fn sum_rounded_nets(&self, addresses: &[&str], denomination: &str, decimal_places: u32) -> Money {
        addresses
            .iter()
            .map(|address| self.rounded_net_at(address, denomination, decimal_places))
            .sum()
    }

    /// combine snapshots from several accounts into one aggregate view
    pub fn merged(snapshots: &[&BalanceSnapshot], tside: Tside) -> BalanceSnapshot {
        let mut balances: HashMap<BalanceCoordinate, Balance> = HashMap::new();
        let mut timestamp = None;

        for snapshot in snapshots {
            timestamp = timestamp.max(snapshot.timestamp);
            for (coordinate, balance) in &snapshot.balances {
                let entry = balances.entry(coordinate.clone()).or_default();
                *entry = entry.combine(*balance, tside);
            }
        }

        BalanceSnapshot::from_balances(balances, tside, timestamp)
    }

    /// new snapshot with the instructions' effect on `account_id` applied.
    /// the original is left untouched
    pub fn with_instructions(&self, instructions: &[CustomInstruction], account_id: &str) -> BalanceSnapshot {
        let mut merged = self.clone();
        for instruction in instructions {
            let delta = instruction.balances(account_id, self.tside);
            for (coordinate, balance) in delta.balances {
                let entry = merged.balances.entry(coordinate).or_default();
                *entry = entry.combine(balance, self.tside);
            }
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addresses::{DEFAULT, INTEREST_DUE, PRINCIPAL, PRINCIPAL_DUE};
    use crate::postings::create_postings;
    use rust_decimal_macros::dec;

    #[test]
    fn test_missing_coordinate_is_zero() {
        let snapshot = BalanceSnapshot::new(Tside::Asset, None);
        assert_eq!(snapshot.net_at(PRINCIPAL, "GBP"), Money::ZERO);
        assert_eq!(snapshot.get(&BalanceCoordinate::committed(PRINCIPAL, "GBP")), Balance::default());
    }

    #[test]
    fn test_from_net_respects_tside() {
        let asset = Balance::from_net(Money::from_major(10), Tside::Asset);
        assert_eq!(asset.debit, Money::from_major(10));
        assert_eq!(asset.net, Money::from_major(10));

        let liability = Balance::from_net(Money::from_major(10), Tside::Liability);
        assert_eq!(liability.credit, Money::from_major(10));
        assert_eq!(liability.net, Money::from_major(10));

        let negative = Balance::from_net(Money::from_major(-5), Tside::Asset);
        assert_eq!(negative.credit, Money::from_major(5));
        assert_eq!(negative.net, Money::from_major(-5));
    }

    #[test]
    fn test_sum_and_rounded_sum() {
        let snapshot = BalanceSnapshot::new(Tside::Asset, None)
            .with_net(PRINCIPAL_DUE, "GBP", Money::from_decimal(dec!(10.005)))
            .with_net(INTEREST_DUE, "GBP", Money::from_decimal(dec!(1.005)));

        let addresses = [PRINCIPAL_DUE, INTEREST_DUE];
        assert_eq!(snapshot.sum_nets(&addresses, "GBP"), Money::from_decimal(dec!(11.010)));
        assert_eq!(snapshot.sum_rounded_nets(&addresses, "GBP", 2), Money::from_decimal(dec!(11.02)));
        assert_eq!(snapshot.sum_nets(&addresses, "USD"), Money::ZERO);
    }

    #[test]
    fn test_merged_snapshots() {
        let first = BalanceSnapshot::new(Tside::Asset, None).with_net(PRINCIPAL, "GBP", Money::from_major(100));
        let second = BalanceSnapshot::new(Tside::Asset, None).with_net(PRINCIPAL, "GBP", Money::from_major(50));

        let merged = BalanceSnapshot::merged(&[&first, &second], Tside::Asset);
        assert_eq!(merged.net_at(PRINCIPAL, "GBP"), Money::from_major(150));
    }

    #[test]
    fn test_with_instructions_leaves_original_untouched() {
        let snapshot = BalanceSnapshot::new(Tside::Asset, None).with_net(PRINCIPAL, "GBP", Money::from_major(100));
        let instruction = CustomInstruction::new(create_postings(
            Money::from_major(40),
            "loan",
            DEFAULT,
            "loan",
            PRINCIPAL,
            "GBP",
        ));

        let updated = snapshot.with_instructions(&[instruction], "loan");
        assert_eq!(updated.net_at(PRINCIPAL, "GBP"), Money::from_major(60));
        assert_eq!(updated.net_at(DEFAULT, "GBP"), Money::from_major(40));
        assert_eq!(snapshot.net_at(PRINCIPAL, "GBP"), Money::from_major(100));
    }
}
