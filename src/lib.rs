pub mod addresses;
pub mod amortisation;
pub mod balances;
pub mod config;
pub mod decimal;
pub mod due_amount;
pub mod errors;
pub mod events;
pub mod interest;
pub mod loan;
pub mod payments;
pub mod postings;
pub mod supervisor;
pub mod types;
pub mod vault;

// re-export key types
pub use balances::{Balance, BalanceCoordinate, BalanceSnapshot};
pub use config::{LoanConfig, ParameterValue};
pub use decimal::{Money, Rate, Rounding};
pub use errors::{LendingError, Result};
pub use events::{AccountNotification, HookArguments, HookResult, ScheduledEvent, UpdateEventTypeDirective};
pub use loan::{AmortisationMethod, DerivedParameters, LoanProduct, RateType};
pub use postings::{CustomInstruction, Posting};
pub use supervisor::SupervisedLoan;
pub use types::{
    InterestAmounts, OverpaymentImpactPreference, Rejection, RejectionReason, RepaymentHolidayImpactPreference,
    TermDetails, Tside,
};
pub use vault::{CalendarEvent, InMemoryVault, Vault};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
