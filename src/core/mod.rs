mod engine;
pub mod solver;
mod types;

pub use engine::{
    annuity_future_value, compare_strategies, future_value,
    real_rate_of_return, run_projection, run_yearly_balance_trace, social_security_income,
    total_balance, valuation_adjusted_rate, withdrawal,
};
pub use types::{
    ASSUMED_CAPE_RATIO, CapeParams, DEFAULT_RETIREMENT_DURATION_YEARS, DEFAULT_WITHDRAWAL_RATE,
    FOUR_PERCENT_RULE_EXPLAINER, HISTORICAL_CAPE_RATIO, ProjectionInputs, ProjectionResult,
    SocialSecurityIncome, WithdrawalPlan, WithdrawalStrategy, YearBalance,
};
