use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, TimeZone, Utc};

use crate::config::{self, DUE_AMOUNT_CALCULATION_PREFIX, PARAM_DUE_AMOUNT_CALCULATION_DAY};
use crate::errors::{LendingError, Result};
use crate::events::{ScheduleExpression, ScheduledEvent, DUE_AMOUNT_CALCULATION};
use crate::types::Rejection;
use crate::vault::{CalendarEvent, Vault};

/// midnight at the start of `dt`'s day
pub fn start_of_day(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| Utc.from_utc_datetime(&midnight))
        .unwrap_or(dt)
}

/// shift by whole months. the day is clamped to the end of shorter months
pub fn add_months(dt: DateTime<Utc>, months: i32) -> Result<DateTime<Utc>> {
    let shifted = if months >= 0 {
        dt.checked_add_months(Months::new(months.unsigned_abs()))
    } else {
        dt.checked_sub_months(Months::new(months.unsigned_abs()))
    };
    shifted.ok_or_else(|| LendingError::InvalidDate {
        message: format!("cannot shift {} by {} months", dt, months),
    })
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

/// same month with the day replaced, falling back to the month's last day
pub fn with_day(dt: DateTime<Utc>, day: u32) -> Result<DateTime<Utc>> {
    let day = day.clamp(1, days_in_month(dt.year(), dt.month()));
    dt.with_day(day).ok_or_else(|| LendingError::InvalidDate {
        message: format!("day {} is not valid for {}", day, dt),
    })
}

fn with_time(dt: DateTime<Utc>, (hour, minute, second): (u32, u32, u32)) -> Result<DateTime<Utc>> {
    dt.date_naive()
        .and_hms_opt(hour, minute, second)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| LendingError::InvalidDate {
            message: format!("{:02}:{:02}:{:02} is not a time of day", hour, minute, second),
        })
}

/// `months` after `dt` on `day`, or the month's last day
fn months_later_on_day(dt: DateTime<Utc>, months: i32, day: u32) -> Result<DateTime<Utc>> {
    with_day(add_months(with_day(dt, 1)?, months)?, day)
}

/// core monthly date rule.
/// without a previous execution the first date falls on `day` at least one
/// month after `start`, and not before `effective_datetime`. otherwise the
/// next date is one month after the previous execution, moving to the new
/// day if it changed and the change can still apply to this cycle
pub fn calculate_next_due_amount_calculation_datetime(
    start_datetime: DateTime<Utc>,
    day: u32,
    time_of_day: (u32, u32, u32),
    effective_datetime: DateTime<Utc>,
    last_execution_datetime: Option<DateTime<Utc>>,
) -> Result<DateTime<Utc>> {
    let next = match last_execution_datetime {
        None => {
            let start = start_of_day(start_datetime);
            let earliest = add_months(start, 1)?;
            let mut months = 1;
            let mut next = months_later_on_day(start, months, day)?;
            while next < earliest || next < effective_datetime {
                months += 1;
                next = months_later_on_day(start, months, day)?;
            }
            next
        }
        Some(last) => {
            let day_changed = last.day() != day;
            if day_changed && (last.month() == effective_datetime.month() || day > effective_datetime.day()) {
                months_later_on_day(last, 1, day)?
            } else {
                add_months(last, 1)?
            }
        }
    };

    with_time(next, time_of_day)
}

fn due_amount_calculation_day(vault: &dyn Vault) -> Result<u32> {
    let day = config::get_u32(vault, PARAM_DUE_AMOUNT_CALCULATION_DAY, None)?;
    if !(1..=31).contains(&day) {
        return Err(LendingError::InvalidParameter {
            name: PARAM_DUE_AMOUNT_CALCULATION_DAY.to_string(),
            message: format!("{} is not a day of the month", day),
        });
    }
    Ok(day)
}

pub fn get_first_due_amount_calculation_datetime(vault: &dyn Vault) -> Result<DateTime<Utc>> {
    let created = vault.account_creation_datetime();
    calculate_next_due_amount_calculation_datetime(
        created,
        due_amount_calculation_day(vault)?,
        config::get_schedule_time(vault, DUE_AMOUNT_CALCULATION_PREFIX, None)?,
        created,
        None,
    )
}

/// next due amount calculation as of `effective_datetime`.
/// the terms are passed in because the last execution is only known as of
/// live, which is wrong for past-dated queries
pub fn get_next_due_amount_calculation_datetime(
    vault: &dyn Vault,
    effective_datetime: DateTime<Utc>,
    elapsed_term: u32,
    remaining_term: u32,
    day_override: Option<u32>,
) -> Result<DateTime<Utc>> {
    if elapsed_term == 0 {
        return get_first_due_amount_calculation_datetime(vault);
    }
    let Some(last_execution) = vault.last_execution_datetime(DUE_AMOUNT_CALCULATION) else {
        return get_first_due_amount_calculation_datetime(vault);
    };
    if remaining_term == 0 {
        return Ok(last_execution);
    }

    let day = match day_override {
        Some(day) => day,
        None => due_amount_calculation_day(vault)?,
    };
    let last_execution = (last_execution <= effective_datetime).then_some(last_execution);

    calculate_next_due_amount_calculation_datetime(
        vault.account_creation_datetime(),
        day,
        config::get_schedule_time(vault, DUE_AMOUNT_CALCULATION_PREFIX, None)?,
        effective_datetime,
        last_execution,
    )
}

/// next repayment date for display between events. when the day parameter
/// changed since the last execution, earlier values are replayed newest
/// first until one gives a date that is still ahead
pub fn get_actual_next_repayment_date(
    vault: &dyn Vault,
    effective_datetime: DateTime<Utc>,
    elapsed_term: u32,
    remaining_term: u32,
) -> Result<DateTime<Utc>> {
    let mut next = get_next_due_amount_calculation_datetime(vault, effective_datetime, elapsed_term, remaining_term, None)?;
    let Some(last_execution) = vault.last_execution_datetime(DUE_AMOUNT_CALCULATION) else {
        return Ok(next);
    };

    let history = vault.parameter_timeseries(PARAM_DUE_AMOUNT_CALCULATION_DAY);
    let stale_date = add_months(last_execution, 1)?;

    // newest value was already used, walk back from the one before it
    for (changed_at, value) in history.iter().rev().skip(1) {
        if !(next < effective_datetime && next == stale_date) {
            break;
        }
        if *changed_at <= last_execution {
            break;
        }
        let Some(previous_day) = value.as_int().and_then(|d| u32::try_from(d).ok()) else {
            break;
        };
        tracing::trace!(previous_day, %changed_at, "replaying due amount calculation day");
        next = get_next_due_amount_calculation_datetime(
            vault,
            effective_datetime,
            elapsed_term,
            remaining_term,
            Some(previous_day),
        )?;
    }

    Ok(next)
}

/// the due day can only move once the first due amount calculation has run
pub fn validate_due_amount_calculation_day_change(vault: &dyn Vault) -> Option<Rejection> {
    if vault.last_execution_datetime(DUE_AMOUNT_CALCULATION).is_none() {
        return Some(Rejection::against_terms(
            "It is not possible to change the monthly repayment day if the first repayment date has not passed.",
        ));
    }
    None
}

/// first datetime at or after `dt` that no calendar event covers
pub fn next_datetime_after_calendar_events(dt: DateTime<Utc>, calendar_events: &[CalendarEvent]) -> DateTime<Utc> {
    let mut next = dt;
    while calendar_events.iter().any(|event| event.covers(next)) {
        next += Duration::days(1);
    }
    next
}

/// daily schedule at the `<prefix>_hour|minute|second` parameters
pub fn daily_scheduled_event(
    vault: &dyn Vault,
    event_type: &str,
    start_datetime: DateTime<Utc>,
    prefix: &str,
) -> Result<ScheduledEvent> {
    let (hour, minute, second) = config::get_schedule_time(vault, prefix, None)?;
    Ok(ScheduledEvent {
        event_type: event_type.to_string(),
        start_datetime,
        expression: ScheduleExpression::daily(hour, minute, second),
        skip: false,
    })
}

/// monthly schedule on `day`, which the runtime moves to the last valid
/// day of shorter months
pub fn monthly_scheduled_event(
    vault: &dyn Vault,
    event_type: &str,
    start_datetime: DateTime<Utc>,
    prefix: &str,
    day: u32,
) -> Result<ScheduledEvent> {
    let (hour, minute, second) = config::get_schedule_time(vault, prefix, None)?;
    let start_datetime = (start_datetime - Duration::seconds(1)).max(vault.account_creation_datetime());
    Ok(ScheduledEvent {
        event_type: event_type.to_string(),
        start_datetime,
        expression: ScheduleExpression {
            day: Some(day),
            hour,
            minute,
            second,
            ..Default::default()
        },
        skip: false,
    })
}

/// monthly due amount calculation starting a month after opening
pub fn due_amount_calculation_scheduled_event(
    vault: &dyn Vault,
    account_opening_datetime: DateTime<Utc>,
) -> Result<ScheduledEvent> {
    monthly_scheduled_event(
        vault,
        DUE_AMOUNT_CALCULATION,
        add_months(start_of_day(account_opening_datetime), 1)?,
        DUE_AMOUNT_CALCULATION_PREFIX,
        due_amount_calculation_day(vault)?,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LoanConfig, ParameterValue};
    use crate::vault::InMemoryVault;
    use rust_decimal_macros::dec;

    fn dt(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
    }

    fn vault(created: DateTime<Utc>, day: i64) -> InMemoryVault {
        let config = LoanConfig::fixed_rate_loan("loan", created, "GBP", dec!(1000), dec!(0.1), 12)
            .with_parameter(PARAM_DUE_AMOUNT_CALCULATION_DAY, ParameterValue::Integer(day));
        InMemoryVault::from_config(&config)
    }

    #[test]
    fn test_date_helpers() {
        assert_eq!(start_of_day(Utc.with_ymd_and_hms(2024, 3, 5, 13, 4, 5).unwrap()), dt(2024, 3, 5));
        assert_eq!(add_months(dt(2024, 1, 31), 1).unwrap(), dt(2024, 2, 29));
        assert_eq!(add_months(dt(2024, 3, 31), -1).unwrap(), dt(2024, 2, 29));
        assert_eq!(days_in_month(2023, 2), 28);
        assert_eq!(days_in_month(2024, 12), 31);
        assert_eq!(with_day(dt(2024, 4, 10), 31).unwrap(), dt(2024, 4, 30));
    }

    #[test]
    fn test_first_due_date() {
        assert_eq!(
            get_first_due_amount_calculation_datetime(&vault(dt(2024, 1, 1), 28)).unwrap(),
            dt(2024, 2, 28)
        );
        // the first date is at least a month after opening
        assert_eq!(
            get_first_due_amount_calculation_datetime(&vault(dt(2024, 1, 20), 5)).unwrap(),
            dt(2024, 3, 5)
        );
        assert_eq!(
            get_first_due_amount_calculation_datetime(&vault(dt(2024, 1, 10), 31)).unwrap(),
            dt(2024, 2, 29)
        );
    }

    #[test]
    fn test_first_due_date_uses_schedule_time() {
        let mut vault = vault(dt(2024, 1, 1), 15);
        vault.set_parameter("due_amount_calculation_hour", ParameterValue::Integer(1), dt(2024, 1, 1));
        vault.set_parameter("due_amount_calculation_minute", ParameterValue::Integer(2), dt(2024, 1, 1));
        assert_eq!(
            get_first_due_amount_calculation_datetime(&vault).unwrap(),
            Utc.with_ymd_and_hms(2024, 2, 15, 1, 2, 0).unwrap()
        );
    }

    #[test]
    fn test_next_due_date_lifecycle() {
        let mut vault = vault(dt(2024, 1, 1), 28);
        assert_eq!(
            get_next_due_amount_calculation_datetime(&vault, dt(2024, 1, 15), 0, 12, None).unwrap(),
            dt(2024, 2, 28)
        );

        vault.record_execution(DUE_AMOUNT_CALCULATION, dt(2024, 2, 28));
        assert_eq!(
            get_next_due_amount_calculation_datetime(&vault, dt(2024, 3, 1), 1, 11, None).unwrap(),
            dt(2024, 3, 28)
        );
        // finished loans keep reporting the final date
        assert_eq!(
            get_next_due_amount_calculation_datetime(&vault, dt(2024, 3, 1), 1, 0, None).unwrap(),
            dt(2024, 2, 28)
        );
    }

    #[test]
    fn test_day_change_after_this_months_event() {
        // moved from the 1st to the 15th, effective before the 15th
        let last = dt(2024, 3, 1);
        let next = calculate_next_due_amount_calculation_datetime(dt(2024, 1, 1), 15, (0, 0, 0), dt(2024, 3, 10), Some(last))
            .unwrap();
        assert_eq!(next, dt(2024, 4, 15));
    }

    #[test]
    fn test_day_change_before_this_months_event() {
        let last = dt(2024, 2, 10);
        // later day still fits in the current month
        let later = calculate_next_due_amount_calculation_datetime(dt(2024, 1, 1), 20, (0, 0, 0), dt(2024, 3, 5), Some(last))
            .unwrap();
        assert_eq!(later, dt(2024, 3, 20));
        // earlier day than today keeps this month's date
        let earlier = calculate_next_due_amount_calculation_datetime(dt(2024, 1, 1), 2, (0, 0, 0), dt(2024, 3, 5), Some(last))
            .unwrap();
        assert_eq!(earlier, dt(2024, 3, 10));
    }

    #[test]
    fn test_actual_next_repayment_date_keeps_pending_date() {
        let mut vault = vault(dt(2024, 1, 1), 10);
        vault.record_execution(DUE_AMOUNT_CALCULATION, dt(2024, 2, 10));
        vault.set_parameter(PARAM_DUE_AMOUNT_CALCULATION_DAY, ParameterValue::Integer(5), dt(2024, 3, 3));

        // the 5th has passed by the time of the change, so March keeps the 10th
        assert_eq!(get_actual_next_repayment_date(&vault, dt(2024, 3, 7), 1, 11).unwrap(), dt(2024, 3, 10));
        // earlier values predate the last execution, nothing to replay
        assert_eq!(get_actual_next_repayment_date(&vault, dt(2024, 3, 12), 1, 11).unwrap(), dt(2024, 3, 10));
    }

    #[test]
    fn test_actual_next_repayment_date_replays_history() {
        let mut vault = vault(dt(2024, 1, 1), 10);
        vault.record_execution(DUE_AMOUNT_CALCULATION, dt(2024, 2, 10));
        vault.set_parameter(PARAM_DUE_AMOUNT_CALCULATION_DAY, ParameterValue::Integer(20), dt(2024, 3, 1));
        vault.set_parameter(PARAM_DUE_AMOUNT_CALCULATION_DAY, ParameterValue::Integer(5), dt(2024, 3, 2));

        // the latest value points at 10 March which is already behind us,
        // the 20th set before it still lands ahead
        assert_eq!(get_actual_next_repayment_date(&vault, dt(2024, 3, 12), 1, 11).unwrap(), dt(2024, 3, 20));
    }

    #[test]
    fn test_day_change_validation() {
        let mut vault = vault(dt(2024, 1, 1), 28);
        let rejection = validate_due_amount_calculation_day_change(&vault).unwrap();
        assert!(rejection.message.starts_with("It is not possible to change the monthly repayment day"));

        vault.record_execution(DUE_AMOUNT_CALCULATION, dt(2024, 2, 28));
        assert!(validate_due_amount_calculation_day_change(&vault).is_none());
    }

    #[test]
    fn test_calendar_roll_forward() {
        let events = vec![CalendarEvent {
            id: "bank_holiday".to_string(),
            calendar_id: "uk".to_string(),
            start_datetime: dt(2024, 3, 28),
            end_datetime: Utc.with_ymd_and_hms(2024, 3, 29, 23, 59, 59).unwrap(),
        }];
        assert_eq!(next_datetime_after_calendar_events(dt(2024, 3, 28), &events), dt(2024, 3, 30));
        assert_eq!(next_datetime_after_calendar_events(dt(2024, 3, 27), &events), dt(2024, 3, 27));
    }

    #[test]
    fn test_due_amount_calculation_schedule() {
        let vault = vault(Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap(), 12);
        let event = due_amount_calculation_scheduled_event(&vault, vault.account_creation_datetime()).unwrap();
        assert_eq!(event.event_type, DUE_AMOUNT_CALCULATION);
        assert_eq!(event.start_datetime, Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap());
        assert_eq!(event.expression.day, Some(12));
        assert_eq!(event.expression.month, None);
    }
}
