// balance addresses used on loan accounts

pub const DEFAULT: &str = "DEFAULT";
pub const INTERNAL_CONTRA: &str = "INTERNAL_CONTRA";

// principal
pub const PRINCIPAL: &str = "PRINCIPAL";
pub const PRINCIPAL_DUE: &str = "PRINCIPAL_DUE";
pub const PRINCIPAL_OVERDUE: &str = "PRINCIPAL_OVERDUE";
pub const EMI: &str = "EMI";

// interest
pub const ACCRUED_INTEREST: &str = "ACCRUED_INTEREST";
pub const NON_EMI_ACCRUED_INTEREST: &str = "NON_EMI_ACCRUED_INTEREST";
pub const INTEREST_DUE: &str = "INTEREST_DUE";
pub const INTEREST_OVERDUE: &str = "INTEREST_OVERDUE";
pub const PENALTIES: &str = "PENALTIES";
pub const ACCRUED_INTEREST_PENDING_CAPITALISATION: &str = "ACCRUED_INTEREST_PENDING_CAPITALISATION";

// trackers, always balanced against INTERNAL_CONTRA
pub const DUE_CALC_EVENT_COUNTER: &str = "DUE_CALC_EVENT_COUNTER";
pub const OVERPAYMENT: &str = "OVERPAYMENT";
pub const OVERPAYMENT_SINCE_LAST_DUE_CALC: &str = "OVERPAYMENT_SINCE_LAST_DUE_CALC";
pub const EMI_PRINCIPAL_EXCESS: &str = "EMI_PRINCIPAL_EXCESS";
pub const ACCRUED_EXPECTED_INTEREST: &str = "ACCRUED_EXPECTED_INTEREST";
pub const CAPITALISED_INTEREST_TRACKER: &str = "CAPITALISED_INTEREST_TRACKER";

/// order in which a repayment clears what is owed
pub const REPAYMENT_HIERARCHY: [&str; 5] = [
    PRINCIPAL_OVERDUE,
    INTEREST_OVERDUE,
    PENALTIES,
    PRINCIPAL_DUE,
    INTEREST_DUE,
];

/// the same order, grouped for distribution across several loans
pub const GROUPED_REPAYMENT_HIERARCHY: [&[&str]; 3] = [
    &[PRINCIPAL_OVERDUE, INTEREST_OVERDUE],
    &[PENALTIES],
    &[PRINCIPAL_DUE, INTEREST_DUE],
];

/// interest accrued but not yet applied
pub const ACCRUED_INTEREST_ADDRESSES: [&str; 2] = [NON_EMI_ACCRUED_INTEREST, ACCRUED_INTEREST];

/// everything the customer owes right now
pub const ALL_OUTSTANDING: [&str; 9] = [
    PRINCIPAL_OVERDUE,
    INTEREST_OVERDUE,
    PENALTIES,
    PRINCIPAL_DUE,
    INTEREST_DUE,
    PRINCIPAL,
    NON_EMI_ACCRUED_INTEREST,
    ACCRUED_INTEREST,
    ACCRUED_INTEREST_PENDING_CAPITALISATION,
];

/// principal the schedule assumed before any overpayment
pub const EXPECTED_PRINCIPAL: [&str; 3] = [PRINCIPAL, OVERPAYMENT, EMI_PRINCIPAL_EXCESS];
