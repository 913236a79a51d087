pub mod calculation;
pub mod reamortisation;
pub mod schedule;

pub use calculation::{
    calculate_due_principal, due_amount_notification, get_residual_cleanup_postings, schedule_logic, DueAmountFeatures,
};
pub use reamortisation::{is_due_amount_calculation_blocked, reject_repayment, ReamortisationCondition, RepaymentHoliday};
pub use schedule::{
    get_actual_next_repayment_date, get_first_due_amount_calculation_datetime, get_next_due_amount_calculation_datetime,
    next_datetime_after_calendar_events, validate_due_amount_calculation_day_change,
};
