pub mod accrual;
pub mod application;
pub mod capitalisation;
pub mod rate;

pub use accrual::{
    calculate_daily_accrual, daily_accrual, daily_accrual_logic, track_interest_on_expected_principal, AccrualDetail,
    AccrualLegs, AccrualSettings, DaysInYear,
};
pub use application::{apply_interest, get_interest_to_apply, repay_accrued_interest, ApplicationAccounts};
pub use capitalisation::{capitalise_interest, handle_interest_capitalisation, is_interest_accrual_blocked};
pub use rate::{FixedRate, InterestRate, VariableRate};
