use chrono::{DateTime, Utc};
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::postings::CustomInstruction;
use crate::types::Rejection;

// scheduled event types
pub const DUE_AMOUNT_CALCULATION: &str = "DUE_AMOUNT_CALCULATION";
pub const ACCRUE_INTEREST: &str = "ACCRUE_INTEREST";

// instruction event tags
pub const ACCOUNT_ACTIVATION: &str = "ACCOUNT_ACTIVATION";
pub const ACCOUNT_CLOSURE: &str = "ACCOUNT_CLOSURE";
pub const PROCESS_REPAYMENTS: &str = "PROCESS_REPAYMENTS";
pub const CHARGE_OVERPAYMENT_FEE: &str = "CHARGE_OVERPAYMENT_FEE";
pub const END_OF_REPAYMENT_HOLIDAY: &str = "END_OF_REPAYMENT_HOLIDAY";

/// arguments the runtime passes to every hook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookArguments {
    pub effective_datetime: DateTime<Utc>,
    pub event_type: Option<String>,
}

impl HookArguments {
    pub fn new(effective_datetime: DateTime<Utc>) -> Self {
        Self {
            effective_datetime,
            event_type: None,
        }
    }

    pub fn scheduled(effective_datetime: DateTime<Utc>, event_type: &str) -> Self {
        Self {
            effective_datetime,
            event_type: Some(event_type.to_string()),
        }
    }

    /// hook arguments effective now, as seen by the time provider
    pub fn now(time_provider: &SafeTimeProvider, event_type: Option<&str>) -> Self {
        Self {
            effective_datetime: time_provider.now(),
            event_type: event_type.map(|e| e.to_string()),
        }
    }

    pub fn event_type_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.event_type.as_deref().unwrap_or(fallback)
    }
}

/// cron-like trigger; unset fields match every value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ScheduleExpression {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl ScheduleExpression {
    pub fn daily(hour: u32, minute: u32, second: u32) -> Self {
        Self {
            hour,
            minute,
            second,
            ..Default::default()
        }
    }

    /// a single trigger at exactly `at`
    pub fn one_off(at: DateTime<Utc>) -> Self {
        use chrono::{Datelike, Timelike};
        Self {
            year: Some(at.year()),
            month: Some(at.month()),
            day: Some(at.day()),
            hour: at.hour(),
            minute: at.minute(),
            second: at.second(),
        }
    }
}

/// directive registering an event schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledEvent {
    pub event_type: String,
    pub start_datetime: DateTime<Utc>,
    pub expression: ScheduleExpression,
    pub skip: bool,
}

/// directive moving an existing schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateEventTypeDirective {
    pub event_type: String,
    pub expression: ScheduleExpression,
    /// triggers before this instant are skipped
    pub skip_until: Option<DateTime<Utc>>,
}

/// customer-facing notification payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountNotification {
    pub notification_type: String,
    pub notification_details: BTreeMap<String, String>,
}

/// everything a hook hands back to the runtime
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HookResult {
    pub instructions: Vec<CustomInstruction>,
    pub rejection: Option<Rejection>,
    pub notifications: Vec<AccountNotification>,
    pub scheduled_events: Vec<ScheduledEvent>,
    pub schedule_updates: Vec<UpdateEventTypeDirective>,
}

impl HookResult {
    pub fn rejected(rejection: Rejection) -> Self {
        Self {
            rejection: Some(rejection),
            ..Default::default()
        }
    }

    pub fn with_instructions(instructions: Vec<CustomInstruction>) -> Self {
        Self {
            instructions,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
            && self.rejection.is_none()
            && self.notifications.is_empty()
            && self.scheduled_events.is_empty()
            && self.schedule_updates.is_empty()
    }
}
