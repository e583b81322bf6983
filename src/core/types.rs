use serde::Serialize;

pub const DEFAULT_WITHDRAWAL_RATE: f64 = 0.04;
pub const DEFAULT_RETIREMENT_DURATION_YEARS: i64 = 30;

/// Shiller CAPE ratio assumed for today's market. Fixed, not looked up.
pub const ASSUMED_CAPE_RATIO: f64 = 25.0;
/// Long-run historical average CAPE ratio.
pub const HISTORICAL_CAPE_RATIO: f64 = 16.0;

pub const FOUR_PERCENT_RULE_EXPLAINER: &str = "The 4% rule suggests that you can safely withdraw 4% \
of your retirement portfolio each year without running out of money for at least 30 years. This \
calculation assumes your investments continue to grow during retirement.";

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CapeParams {
    pub cape_ratio: f64,
    pub normal_cape: f64,
    pub base_rate: f64,
    pub min_rate: f64,
    pub max_rate: f64,
}

impl Default for CapeParams {
    fn default() -> Self {
        Self {
            cape_ratio: ASSUMED_CAPE_RATIO,
            normal_cape: HISTORICAL_CAPE_RATIO,
            base_rate: DEFAULT_WITHDRAWAL_RATE,
            min_rate: 0.02,
            max_rate: 0.06,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum WithdrawalStrategy {
    FixedPercentage { rate: f64 },
    /// Spread the balance evenly over a fixed number of years. Durations
    /// `<= 0` are replaced by [`DEFAULT_RETIREMENT_DURATION_YEARS`].
    FixedDivisor { duration_years: i64 },
    ValuationAdjusted(CapeParams),
}

impl Default for WithdrawalStrategy {
    fn default() -> Self {
        WithdrawalStrategy::FixedPercentage {
            rate: DEFAULT_WITHDRAWAL_RATE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionInputs {
    pub current_savings: f64,
    pub monthly_contribution: f64,
    pub annual_return_rate: f64,
    pub years_to_retirement: u32,
    pub nominal_return_rate: Option<f64>,
    pub inflation_rate: Option<f64>,
    pub social_security_monthly: Option<f64>,
    pub years_until_social_security: u32,
    pub withdrawal_strategy: WithdrawalStrategy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalPlan {
    pub annual: f64,
    pub monthly: f64,
    pub effective_rate: f64,
    pub label: String,
    pub explanation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialSecurityIncome {
    pub monthly_benefit: f64,
    pub annual_benefit: f64,
    pub total_annual_income: f64,
    pub total_monthly_income: f64,
    pub years_until_start: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionResult {
    pub total_savings: f64,
    pub savings_growth: f64,
    pub contributions_growth: f64,
    pub annual_withdrawal: f64,
    pub monthly_withdrawal: f64,
    pub effective_withdrawal_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub real_rate_of_return: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub social_security: Option<SocialSecurityIncome>,
    pub strategy_label: String,
    pub strategy_explanation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearBalance {
    pub year: u32,
    pub contributed: f64,
    pub savings_growth: f64,
    pub contributions_growth: f64,
    pub total: f64,
}
