//! Plain-text rendering of a projection for the terminal.

use crate::core::solver::{GoalSolveResult, GoalType};
use crate::core::{FOUR_PERCENT_RULE_EXPLAINER, ProjectionResult, WithdrawalPlan, YearBalance};
use crate::format::{format_currency, format_percent};

/// Optional sections appended after the main summary.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReportSections<'a> {
    pub schedule: Option<&'a [YearBalance]>,
    pub comparison: Option<&'a [WithdrawalPlan]>,
    pub goal: Option<&'a GoalSolveResult>,
}

pub fn render_report(result: &ProjectionResult, sections: ReportSections<'_>) -> String {
    let mut lines = vec![
        "Retirement Estimate".to_string(),
        "===================".to_string(),
        format!(
            "Total savings at retirement:  {}",
            format_currency(result.total_savings)
        ),
        format!(
            "  Growth of current savings:  {}",
            format_currency(result.savings_growth)
        ),
        format!(
            "  Growth of contributions:    {}",
            format_currency(result.contributions_growth)
        ),
        format!(
            "Annual withdrawal ({}): {}",
            result.strategy_label,
            format_currency(result.annual_withdrawal)
        ),
        format!(
            "Monthly withdrawal:           {}",
            format_currency(result.monthly_withdrawal)
        ),
    ];

    if let Some(real_rate) = result.real_rate_of_return {
        lines.push(format!(
            "Real rate of return:          {}",
            format_percent(real_rate, 2)
        ));
    }

    if let Some(ss) = result.social_security {
        lines.push(format!(
            "Social security:              {} per month, starting in {} years",
            format_currency(ss.monthly_benefit),
            ss.years_until_start
        ));
        lines.push(format!(
            "Total monthly income:         {}",
            format_currency(ss.total_monthly_income)
        ));
    }

    lines.push(String::new());
    lines.push(result.strategy_explanation.clone());

    if let Some(comparison) = sections.comparison {
        lines.push(String::new());
        lines.push("Strategy comparison".to_string());
        for plan in comparison {
            lines.push(format!(
                "  {:<28} {:>6}  {:>14} / year  {:>12} / month",
                plan.label,
                format_percent(plan.effective_rate * 100.0, 2),
                format_currency(plan.annual),
                format_currency(plan.monthly)
            ));
        }
    }

    if let Some(schedule) = sections.schedule {
        lines.push(String::new());
        lines.push("Year-by-year balance".to_string());
        lines.push(format!(
            "  {:>4}  {:>14}  {:>14}",
            "Year", "Contributed", "Balance"
        ));
        for row in schedule {
            lines.push(format!(
                "  {:>4}  {:>14}  {:>14}",
                row.year,
                format_currency(row.contributed),
                format_currency(row.total)
            ));
        }
    }

    if let Some(goal) = sections.goal {
        lines.push(String::new());
        lines.extend(goal_lines(goal));
    }

    lines.push(String::new());
    lines.push("About the 4% Rule".to_string());
    lines.push(FOUR_PERCENT_RULE_EXPLAINER.to_string());

    lines.join("\n")
}

fn goal_lines(goal: &GoalSolveResult) -> Vec<String> {
    let mut lines = vec![format!(
        "Goal: {} per month in retirement",
        format_currency(goal.target_monthly_income)
    )];

    match (goal.goal_type, goal.solved_value) {
        (GoalType::RequiredContribution, Some(value)) => lines.push(format!(
            "  Required monthly contribution: {}",
            format_currency(value)
        )),
        (GoalType::YearsToTarget, Some(value)) => {
            lines.push(format!("  Years until retirement: {value}"))
        }
        (_, None) => {}
    }
    if let Some(income) = goal.projected_monthly_income {
        lines.push(format!(
            "  Projected monthly income: {}",
            format_currency(income)
        ));
    }
    lines.push(format!("  {}", goal.message));
    lines
}
