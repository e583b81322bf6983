use serde::Serialize;

use super::{
    ProjectionInputs, ProjectionResult, annuity_future_value, future_value, run_projection,
    withdrawal,
};
use crate::error::{NestEggError, Result};

const INCOME_EPSILON: f64 = 1e-9;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum GoalType {
    RequiredContribution,
    YearsToTarget,
}

#[derive(Debug, Clone, Copy)]
pub struct GoalSolveConfig {
    pub goal_type: GoalType,
    pub target_monthly_income: f64,
    pub max_years: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalSolveResult {
    pub goal_type: GoalType,
    pub target_monthly_income: f64,
    /// Part of the target left for portfolio withdrawals once social
    /// security is counted.
    pub portfolio_monthly_target: f64,
    pub solved_value: Option<f64>,
    pub projected_monthly_income: Option<f64>,
    pub feasible: bool,
    pub message: String,
}

pub fn solve_goal(inputs: &ProjectionInputs, config: GoalSolveConfig) -> Result<GoalSolveResult> {
    validate_config(config)?;

    let social_security = inputs
        .social_security_monthly
        .filter(|monthly| monthly.is_finite() && *monthly > 0.0)
        .unwrap_or(0.0);
    let portfolio_monthly_target = (config.target_monthly_income - social_security).max(0.0);

    let (solved_value, feasible, message) = match config.goal_type {
        GoalType::RequiredContribution => solve_required_contribution(inputs, portfolio_monthly_target),
        GoalType::YearsToTarget => solve_years_to_target(inputs, config),
    };

    let projected_monthly_income = solved_value.map(|value| {
        let candidate = candidate_inputs(inputs, config.goal_type, value);
        monthly_income(&run_projection(&candidate))
    });

    Ok(GoalSolveResult {
        goal_type: config.goal_type,
        target_monthly_income: config.target_monthly_income,
        portfolio_monthly_target,
        solved_value,
        projected_monthly_income,
        feasible,
        message,
    })
}

fn solve_required_contribution(
    inputs: &ProjectionInputs,
    portfolio_monthly_target: f64,
) -> (Option<f64>, bool, String) {
    // Every strategy withdraws a fixed share of the balance, so the
    // required balance follows directly from the effective rate.
    let effective_rate = withdrawal(1.0, &inputs.withdrawal_strategy).effective_rate;
    if portfolio_monthly_target <= 0.0 {
        return (
            Some(0.0),
            true,
            "Social security alone meets the target income.".to_string(),
        );
    }
    if effective_rate <= 0.0 {
        return (
            None,
            false,
            "The selected strategy never withdraws from the portfolio.".to_string(),
        );
    }

    let required_balance = portfolio_monthly_target * 12.0 / effective_rate;
    let grown_savings = future_value(
        inputs.current_savings,
        inputs.annual_return_rate,
        inputs.years_to_retirement,
    );
    let shortfall = required_balance - grown_savings;
    if shortfall <= 0.0 {
        return (
            Some(0.0),
            true,
            "Current savings already meet the target income.".to_string(),
        );
    }

    let per_dollar = annuity_future_value(1.0, inputs.annual_return_rate, inputs.years_to_retirement);
    if per_dollar <= 0.0 {
        return (
            None,
            false,
            "No monthly contribution can close the gap before retirement.".to_string(),
        );
    }

    (
        Some(shortfall / per_dollar),
        true,
        "Solved required monthly contribution.".to_string(),
    )
}

fn solve_years_to_target(
    inputs: &ProjectionInputs,
    config: GoalSolveConfig,
) -> (Option<f64>, bool, String) {
    let reached = (0..=config.max_years).find(|&years| {
        let candidate = candidate_inputs(inputs, GoalType::YearsToTarget, years as f64);
        monthly_income(&run_projection(&candidate)) + INCOME_EPSILON >= config.target_monthly_income
    });

    match reached {
        Some(years) => (
            Some(years as f64),
            true,
            "Solved years until the target income is reached.".to_string(),
        ),
        None => (
            None,
            false,
            format!(
                "Target income is not reached within {} years.",
                config.max_years
            ),
        ),
    }
}

fn candidate_inputs(base: &ProjectionInputs, goal_type: GoalType, value: f64) -> ProjectionInputs {
    let mut inputs = base.clone();
    match goal_type {
        GoalType::RequiredContribution => inputs.monthly_contribution = value.max(0.0),
        GoalType::YearsToTarget => inputs.years_to_retirement = value.max(0.0) as u32,
    }
    inputs
}

/// Withdrawal plus social security when a benefit is present.
fn monthly_income(result: &ProjectionResult) -> f64 {
    result
        .social_security
        .map(|ss| ss.total_monthly_income)
        .unwrap_or(result.monthly_withdrawal)
}

fn validate_config(config: GoalSolveConfig) -> Result<()> {
    if !config.target_monthly_income.is_finite() || config.target_monthly_income < 0.0 {
        return Err(NestEggError::InvalidGoal(
            "target monthly income must be >= 0".to_string(),
        ));
    }
    if config.goal_type == GoalType::YearsToTarget && config.max_years == 0 {
        return Err(NestEggError::InvalidGoal(
            "max years must be > 0".to_string(),
        ));
    }
    Ok(())
}
