pub mod overpayment;
pub mod repayment;

pub use overpayment::{
    charge_overpayment_fee, get_max_overpayment_fee, get_overpayment_fee, handle_overpayment, validate_overpayment,
    validate_overpayment_across_supervisees, OverpaymentFeature,
};
pub use repayment::{
    distribute_repayment_for_multiple_targets, distribute_repayment_for_single_target, generate_repayment_postings,
    get_outstanding_principal, get_total_due_amount, get_total_outstanding_debt, is_posting_an_overpayment,
    RepaymentAmounts, RepaymentDistribution,
};
