use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::balances::{Balance, BalanceCoordinate, BalanceSnapshot};
use crate::config::{self, LoanConfig, ParameterLookup, ParameterValue};
use crate::decimal::Money;
use crate::errors::Result;
use crate::postings::CustomInstruction;
use crate::types::Tside;

/// calendar event a schedule should not land on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub calendar_id: String,
    pub start_datetime: DateTime<Utc>,
    pub end_datetime: DateTime<Utc>,
}

impl CalendarEvent {
    /// inclusive of both ends
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        self.start_datetime <= at && at <= self.end_datetime
    }
}

/// read-only view of a loan account supplied by the hosting ledger
pub trait Vault {
    fn account_id(&self) -> &str;

    fn tside(&self) -> Tside {
        Tside::Asset
    }

    fn account_creation_datetime(&self) -> DateTime<Utc>;

    /// balances as of `at`, inclusive
    fn balances_at(&self, at: DateTime<Utc>) -> BalanceSnapshot;

    fn live_balances(&self) -> BalanceSnapshot;

    /// (effective from, value) pairs in ascending order
    fn parameter_timeseries(&self, name: &str) -> Vec<(DateTime<Utc>, ParameterValue)>;

    fn last_execution_datetime(&self, event_type: &str) -> Option<DateTime<Utc>>;

    /// (effective from, active) pairs in ascending order
    fn flag_timeseries(&self, flag: &str) -> Vec<(DateTime<Utc>, bool)>;

    fn calendar_events(&self, calendar_ids: &[String]) -> Vec<CalendarEvent>;

    /// resolve a parameter at `at` (latest when None), falling back to its default
    fn get_parameter(&self, name: &str, at: Option<DateTime<Utc>>) -> ParameterLookup {
        let series = self.parameter_timeseries(name);
        let found = match at {
            Some(at) => series.iter().rev().find(|(from, _)| *from <= at),
            None => series.last(),
        };

        match found {
            Some((_, value)) => ParameterLookup::Present(value.clone()),
            None => match config::default_for(name) {
                Some(default) => ParameterLookup::AbsentWithDefault(default),
                None => ParameterLookup::Absent,
            },
        }
    }

    fn is_flag_active(&self, flag: &str, at: DateTime<Utc>) -> bool {
        self.flag_timeseries(flag)
            .iter()
            .rev()
            .find(|(from, _)| *from <= at)
            .map(|(_, active)| *active)
            .unwrap_or(false)
    }

    fn any_flag_active(&self, flags: &[String], at: DateTime<Utc>) -> bool {
        flags.iter().any(|flag| self.is_flag_active(flag, at))
    }
}

/// account held entirely in memory. used by tests and by hosts that
/// fetch ledger data up front
#[derive(Debug, Clone, Default)]
pub struct InMemoryVault {
    account_id: String,
    tside: Tside,
    creation_datetime: DateTime<Utc>,
    instructions: Vec<(DateTime<Utc>, CustomInstruction)>,
    parameters: HashMap<String, Vec<(DateTime<Utc>, ParameterValue)>>,
    flags: HashMap<String, Vec<(DateTime<Utc>, bool)>>,
    executions: HashMap<String, Vec<DateTime<Utc>>>,
    calendar_events: Vec<CalendarEvent>,
}

impl InMemoryVault {
    pub fn new(account_id: &str, creation_datetime: DateTime<Utc>) -> Self {
        Self {
            account_id: account_id.to_string(),
            creation_datetime,
            ..Default::default()
        }
    }

    /// account with every configured parameter effective from creation
    pub fn from_config(config: &LoanConfig) -> Self {
        let mut vault = Self::new(&config.account_id, config.creation_datetime);
        vault.tside = config.tside;
        for (name, value) in &config.parameters {
            vault.set_parameter(name, value.clone(), config.creation_datetime);
        }
        vault
    }

    pub fn set_parameter(&mut self, name: &str, value: ParameterValue, effective_from: DateTime<Utc>) {
        let series = self.parameters.entry(name.to_string()).or_default();
        series.push((effective_from, value));
        series.sort_by_key(|(from, _)| *from);
    }

    pub fn set_flag(&mut self, flag: &str, active: bool, effective_from: DateTime<Utc>) {
        let series = self.flags.entry(flag.to_string()).or_default();
        series.push((effective_from, active));
        series.sort_by_key(|(from, _)| *from);
    }

    pub fn add_calendar_event(&mut self, event: CalendarEvent) {
        self.calendar_events.push(event);
    }

    pub fn record_execution(&mut self, event_type: &str, at: DateTime<Utc>) {
        self.executions.entry(event_type.to_string()).or_default().push(at);
    }

    /// commit instructions with the given value datetime
    pub fn commit(&mut self, instructions: &[CustomInstruction], value_datetime: DateTime<Utc>) -> Result<()> {
        for instruction in instructions {
            instruction.validate()?;
        }
        self.instructions
            .extend(instructions.iter().cloned().map(|i| (value_datetime, i)));
        Ok(())
    }

    pub fn committed_instructions(&self) -> impl Iterator<Item = &CustomInstruction> {
        self.instructions.iter().map(|(_, i)| i)
    }

    fn snapshot(&self, until: Option<DateTime<Utc>>) -> BalanceSnapshot {
        let mut legs: HashMap<BalanceCoordinate, (Money, Money)> = HashMap::new();

        for (value_datetime, instruction) in &self.instructions {
            if until.map_or(false, |until| *value_datetime > until) {
                continue;
            }
            let delta = instruction.balances(&self.account_id, self.tside);
            for coordinate in delta.coordinates() {
                let balance = delta.get(coordinate);
                let entry = legs.entry(coordinate.clone()).or_default();
                entry.0 += balance.credit;
                entry.1 += balance.debit;
            }
        }

        let balances = legs
            .into_iter()
            .map(|(coordinate, (credit, debit))| (coordinate, Balance::new(credit, debit, self.tside)))
            .collect();

        BalanceSnapshot::from_balances(balances, self.tside, until)
    }
}

impl Vault for InMemoryVault {
    fn account_id(&self) -> &str {
        &self.account_id
    }

    fn tside(&self) -> Tside {
        self.tside
    }

    fn account_creation_datetime(&self) -> DateTime<Utc> {
        self.creation_datetime
    }

    fn balances_at(&self, at: DateTime<Utc>) -> BalanceSnapshot {
        self.snapshot(Some(at))
    }

    fn live_balances(&self) -> BalanceSnapshot {
        self.snapshot(None)
    }

    fn parameter_timeseries(&self, name: &str) -> Vec<(DateTime<Utc>, ParameterValue)> {
        self.parameters.get(name).cloned().unwrap_or_default()
    }

    fn last_execution_datetime(&self, event_type: &str) -> Option<DateTime<Utc>> {
        self.executions
            .get(event_type)
            .and_then(|runs| runs.iter().max().copied())
    }

    fn flag_timeseries(&self, flag: &str) -> Vec<(DateTime<Utc>, bool)> {
        self.flags.get(flag).cloned().unwrap_or_default()
    }

    fn calendar_events(&self, calendar_ids: &[String]) -> Vec<CalendarEvent> {
        self.calendar_events
            .iter()
            .filter(|event| calendar_ids.is_empty() || calendar_ids.contains(&event.calendar_id))
            .cloned()
            .collect()
    }
}
