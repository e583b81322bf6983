use super::types::{
    CapeParams, DEFAULT_RETIREMENT_DURATION_YEARS, DEFAULT_WITHDRAWAL_RATE, ProjectionInputs,
    ProjectionResult, SocialSecurityIncome, WithdrawalPlan, WithdrawalStrategy, YearBalance,
};

const MONTHS_PER_YEAR: f64 = 12.0;
const RATE_EPSILON: f64 = 1e-12;

/// Per-period growth multiplier. Losses beyond -100% wipe the balance out
/// rather than flipping its sign.
fn growth_factor(rate: f64) -> f64 {
    (1.0 + rate).max(0.0)
}

/// Compound growth of a lump sum over whole years.
pub fn future_value(current_savings: f64, annual_return_rate: f64, years_to_retirement: u32) -> f64 {
    if years_to_retirement == 0 {
        return current_savings;
    }
    current_savings * growth_factor(annual_return_rate).powf(years_to_retirement as f64)
}

/// Future value of a level monthly contribution, compounded monthly at
/// `annual_return_rate / 12`.
pub fn annuity_future_value(
    monthly_contribution: f64,
    annual_return_rate: f64,
    years_to_retirement: u32,
) -> f64 {
    let periods = years_to_retirement as f64 * MONTHS_PER_YEAR;
    let monthly_rate = annual_return_rate / MONTHS_PER_YEAR;
    if monthly_rate.abs() < RATE_EPSILON {
        return monthly_contribution * periods;
    }

    let compounded = growth_factor(monthly_rate).powf(periods);
    monthly_contribution * (compounded - 1.0) / monthly_rate
}

pub fn total_balance(inputs: &ProjectionInputs) -> f64 {
    future_value(
        inputs.current_savings,
        inputs.annual_return_rate,
        inputs.years_to_retirement,
    ) + annuity_future_value(
        inputs.monthly_contribution,
        inputs.annual_return_rate,
        inputs.years_to_retirement,
    )
}

fn effective_duration_years(duration_years: i64) -> i64 {
    if duration_years > 0 {
        duration_years
    } else {
        DEFAULT_RETIREMENT_DURATION_YEARS
    }
}

/// Starting rate scaled by how far the market's CAPE sits from its
/// historical norm, bounded to `[min_rate, max_rate]`.
pub fn valuation_adjusted_rate(params: &CapeParams) -> f64 {
    let factor = if params.cape_ratio.is_finite() && params.cape_ratio > 0.0 {
        params.normal_cape / params.cape_ratio
    } else {
        1.0
    };
    (params.base_rate * factor)
        .max(params.min_rate)
        .min(params.max_rate)
}

pub fn withdrawal(total_balance: f64, strategy: &WithdrawalStrategy) -> WithdrawalPlan {
    let (annual, effective_rate, label, explanation) = match *strategy {
        WithdrawalStrategy::FixedPercentage { rate } => {
            let pct = display_percent(rate);
            (
                total_balance * rate,
                rate,
                format!("{pct}% Rule"),
                format!(
                    "Withdraw {pct}% of your retirement balance each year. The 4% rule has \
                     historically sustained a portfolio for at least 30 years."
                ),
            )
        }
        WithdrawalStrategy::FixedDivisor { duration_years } => {
            let years = effective_duration_years(duration_years);
            (
                total_balance / years as f64,
                1.0 / years as f64,
                format!("Fixed Duration ({years} years)"),
                format!(
                    "Spread your retirement balance evenly over {years} years, withdrawing \
                     1/{years} of it each year."
                ),
            )
        }
        WithdrawalStrategy::ValuationAdjusted(params) => {
            let rate = valuation_adjusted_rate(&params);
            (
                total_balance * rate,
                rate,
                "CAPE-Adjusted Rate".to_string(),
                format!(
                    "With a market CAPE ratio of {} against a historical average of {}, the \
                     starting withdrawal rate is adjusted to {:.1}%.",
                    params.cape_ratio,
                    params.normal_cape,
                    rate * 100.0
                ),
            )
        }
    };

    WithdrawalPlan {
        annual,
        monthly: annual / MONTHS_PER_YEAR,
        effective_rate,
        label,
        explanation,
    }
}

fn display_percent(rate: f64) -> f64 {
    (rate * 100.0 * 100.0).round() / 100.0
}

/// Inflation-adjusted return in percent. `None` when either rate was not
/// supplied or inflation is at or below -100%.
pub fn real_rate_of_return(nominal_rate: Option<f64>, inflation_rate: Option<f64>) -> Option<f64> {
    let (nominal, inflation) = (nominal_rate?, inflation_rate?);
    let deflator = 1.0 + inflation;
    if !deflator.is_finite() || deflator <= 0.0 {
        return None;
    }

    let real = ((1.0 + nominal) / deflator - 1.0) * 100.0;
    real.is_finite().then_some(real)
}

pub fn social_security_income(
    monthly_benefit: f64,
    annual_withdrawal: f64,
    years_until_start: u32,
) -> Option<SocialSecurityIncome> {
    if !monthly_benefit.is_finite() || monthly_benefit <= 0.0 {
        return None;
    }

    let annual_benefit = monthly_benefit * MONTHS_PER_YEAR;
    let total_annual_income = annual_withdrawal + annual_benefit;
    Some(SocialSecurityIncome {
        monthly_benefit,
        annual_benefit,
        total_annual_income,
        total_monthly_income: total_annual_income / MONTHS_PER_YEAR,
        years_until_start,
    })
}

pub fn run_projection(inputs: &ProjectionInputs) -> ProjectionResult {
    let savings_growth = future_value(
        inputs.current_savings,
        inputs.annual_return_rate,
        inputs.years_to_retirement,
    );
    let contributions_growth = annuity_future_value(
        inputs.monthly_contribution,
        inputs.annual_return_rate,
        inputs.years_to_retirement,
    );
    let total_savings = savings_growth + contributions_growth;
    let plan = withdrawal(total_savings, &inputs.withdrawal_strategy);

    let social_security = inputs.social_security_monthly.and_then(|monthly| {
        social_security_income(monthly, plan.annual, inputs.years_until_social_security)
    });

    ProjectionResult {
        total_savings,
        savings_growth,
        contributions_growth,
        annual_withdrawal: plan.annual,
        monthly_withdrawal: plan.monthly,
        effective_withdrawal_rate: plan.effective_rate,
        real_rate_of_return: real_rate_of_return(inputs.nominal_return_rate, inputs.inflation_rate),
        social_security,
        strategy_label: plan.label,
        strategy_explanation: plan.explanation,
    }
}

/// The same balance under every strategy with its standard parameters.
pub fn compare_strategies(total_balance: f64, duration_years: i64) -> Vec<WithdrawalPlan> {
    [
        WithdrawalStrategy::FixedPercentage {
            rate: DEFAULT_WITHDRAWAL_RATE,
        },
        WithdrawalStrategy::FixedDivisor { duration_years },
        WithdrawalStrategy::ValuationAdjusted(CapeParams::default()),
    ]
    .iter()
    .map(|strategy| withdrawal(total_balance, strategy))
    .collect()
}

/// End-of-year balances up to retirement. The last row equals
/// [`total_balance`].
pub fn run_yearly_balance_trace(inputs: &ProjectionInputs) -> Vec<YearBalance> {
    (1..=inputs.years_to_retirement)
        .map(|year| {
            let savings_growth = future_value(inputs.current_savings, inputs.annual_return_rate, year);
            let contributions_growth =
                annuity_future_value(inputs.monthly_contribution, inputs.annual_return_rate, year);
            YearBalance {
                year,
                contributed: inputs.monthly_contribution * MONTHS_PER_YEAR * year as f64,
                savings_growth,
                contributions_growth,
                total: savings_growth + contributions_growth,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn assert_approx_tol(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    fn sample_inputs() -> ProjectionInputs {
        ProjectionInputs {
            current_savings: 50_000.0,
            monthly_contribution: 1_000.0,
            annual_return_rate: 0.07,
            years_to_retirement: 30,
            nominal_return_rate: None,
            inflation_rate: None,
            social_security_monthly: None,
            years_until_social_security: 0,
            withdrawal_strategy: WithdrawalStrategy::default(),
        }
    }

    #[test]
    fn future_value_with_zero_years_returns_savings_unchanged() {
        assert_eq!(future_value(123_456.78, 0.07, 0), 123_456.78);
        assert_eq!(future_value(10.0, -1.0, 0), 10.0);
    }

    #[test]
    fn future_value_at_minus_one_hundred_percent_is_total_loss() {
        assert_eq!(future_value(10_000.0, -1.0, 5), 0.0);
        assert_eq!(future_value(10_000.0, -3.5, 5), 0.0);
    }

    #[test]
    fn annuity_with_zero_rate_is_sum_of_contributions() {
        assert_eq!(annuity_future_value(250.0, 0.0, 10), 30_000.0);
        assert_eq!(annuity_future_value(250.0, 0.0, 0), 0.0);
    }

    #[test]
    fn annuity_matches_hand_calculation_for_one_year() {
        // 12 deposits of 100 at 1% per month: 100 * (1.01^12 - 1) / 0.01
        let expected = 100.0 * (1.01_f64.powi(12) - 1.0) / 0.01;
        assert_approx(annuity_future_value(100.0, 0.12, 1), expected);
        assert_approx_tol(expected, 1_268.25, 0.01);
    }

    #[test]
    fn oracle_default_scenario_matches_closed_form() {
        let inputs = sample_inputs();
        let monthly_rate: f64 = 0.07 / 12.0;
        let expected_savings = 50_000.0 * 1.07_f64.powi(30);
        let expected_contributions =
            1_000.0 * ((1.0 + monthly_rate).powi(360) - 1.0) / monthly_rate;
        let expected_total = expected_savings + expected_contributions;

        let result = run_projection(&inputs);
        assert_approx(result.savings_growth, expected_savings);
        assert_approx(result.contributions_growth, expected_contributions);
        assert_approx(result.total_savings, expected_total);
        assert_approx(result.annual_withdrawal, expected_total * 0.04);
        assert_approx(result.monthly_withdrawal, expected_total * 0.04 / 12.0);

        assert_eq!(result.total_savings.round(), 1_600_584.0);
        assert_eq!(result.annual_withdrawal.round(), 64_023.0);
        assert_eq!(result.monthly_withdrawal.round(), 5_335.0);
        assert_eq!(result.strategy_label, "4% Rule");
        assert!(result.real_rate_of_return.is_none());
        assert!(result.social_security.is_none());
    }

    #[test]
    fn oracle_zero_growth_zero_contribution_keeps_savings_exact() {
        let mut inputs = sample_inputs();
        inputs.current_savings = 100_000.0;
        inputs.monthly_contribution = 0.0;
        inputs.annual_return_rate = 0.0;
        inputs.years_to_retirement = 10;

        let result = run_projection(&inputs);
        assert_eq!(result.total_savings, 100_000.0);
        assert_eq!(result.annual_withdrawal, 4_000.0);
    }

    #[test]
    fn fixed_divisor_uses_thirty_years_when_duration_is_not_positive() {
        let balance = 900_000.0;
        let default_plan = withdrawal(balance, &WithdrawalStrategy::FixedDivisor { duration_years: 30 });
        for duration_years in [0, -5] {
            let plan = withdrawal(balance, &WithdrawalStrategy::FixedDivisor { duration_years });
            assert_eq!(plan, default_plan);
        }
        assert_eq!(default_plan.annual, 30_000.0);
        assert!(default_plan.explanation.contains("30 years"));
    }

    #[test]
    fn fixed_divisor_explanation_names_duration_used() {
        let plan = withdrawal(250_000.0, &WithdrawalStrategy::FixedDivisor { duration_years: 25 });
        assert_eq!(plan.annual, 10_000.0);
        assert_eq!(plan.label, "Fixed Duration (25 years)");
        assert!(plan.explanation.contains("25 years"));
        assert!(plan.explanation.contains("1/25"));
    }

    #[test]
    fn valuation_adjusted_uses_documented_cape_constants() {
        let plan = withdrawal(
            1_000_000.0,
            &WithdrawalStrategy::ValuationAdjusted(CapeParams::default()),
        );
        // 4% * 16 / 25 = 2.56%
        assert_approx(plan.effective_rate, 0.0256);
        assert_approx(plan.annual, 25_600.0);
        assert_approx(plan.monthly, 25_600.0 / 12.0);
        assert!(plan.explanation.contains("2.6%"), "{}", plan.explanation);
    }

    #[test]
    fn valuation_adjusted_clamps_to_bounds() {
        let cheap = CapeParams {
            cape_ratio: 4.0,
            ..CapeParams::default()
        };
        let expensive = CapeParams {
            cape_ratio: 80.0,
            ..CapeParams::default()
        };
        assert_eq!(valuation_adjusted_rate(&cheap), 0.06);
        assert_eq!(valuation_adjusted_rate(&expensive), 0.02);
    }

    #[test]
    fn valuation_adjusted_ignores_non_positive_cape() {
        let params = CapeParams {
            cape_ratio: 0.0,
            ..CapeParams::default()
        };
        assert_eq!(valuation_adjusted_rate(&params), 0.04);
    }

    #[test]
    fn real_rate_of_return_requires_both_inputs() {
        assert!(real_rate_of_return(None, Some(0.03)).is_none());
        assert!(real_rate_of_return(Some(0.10), None).is_none());
        assert!(real_rate_of_return(None, None).is_none());
    }

    #[test]
    fn real_rate_of_return_matches_fisher_equation() {
        let real = real_rate_of_return(Some(0.10), Some(0.03)).expect("both inputs present");
        assert_approx_tol(real, 6.80, 0.005);
        assert_eq!(format!("{real:.2}"), "6.80");
    }

    #[test]
    fn real_rate_of_return_is_undefined_at_total_deflation() {
        assert!(real_rate_of_return(Some(0.05), Some(-1.0)).is_none());
        assert!(real_rate_of_return(Some(0.05), Some(-2.0)).is_none());
    }

    #[test]
    fn social_security_adds_to_withdrawal_income() {
        let ss = social_security_income(2_500.0, 64_024.0, 5).expect("benefit is positive");
        assert_eq!(ss.annual_benefit, 30_000.0);
        assert_eq!(ss.total_annual_income, 94_024.0);
        assert_approx_tol(ss.total_monthly_income, 7_835.33, 0.005);
        assert_eq!(ss.years_until_start, 5);
    }

    #[test]
    fn social_security_is_omitted_without_benefit() {
        assert!(social_security_income(0.0, 64_024.0, 5).is_none());
        assert!(social_security_income(-10.0, 64_024.0, 5).is_none());

        let mut inputs = sample_inputs();
        inputs.social_security_monthly = Some(0.0);
        assert!(run_projection(&inputs).social_security.is_none());
    }

    #[test]
    fn compare_strategies_covers_every_variant() {
        let plans = compare_strategies(1_200_000.0, 0);
        assert_eq!(plans.len(), 3);
        assert_approx(plans[0].annual, 48_000.0);
        assert_approx(plans[1].annual, 40_000.0);
        assert_approx(plans[2].annual, 30_720.0);
    }

    #[test]
    fn yearly_trace_ends_at_total_balance() {
        let inputs = sample_inputs();
        let rows = run_yearly_balance_trace(&inputs);
        assert_eq!(rows.len(), 30);
        assert_eq!(rows[0].year, 1);
        assert_approx(rows[0].contributed, 12_000.0);
        assert_approx(rows[0].savings_growth, 53_500.0);

        let last = rows.last().expect("thirty rows");
        assert_eq!(last.year, 30);
        assert_eq!(last.total, total_balance(&inputs));
        assert_approx(last.contributed, 360_000.0);

        for pair in rows.windows(2) {
            assert!(pair[1].total > pair[0].total);
        }
    }

    #[test]
    fn yearly_trace_is_empty_with_no_years() {
        let mut inputs = sample_inputs();
        inputs.years_to_retirement = 0;
        assert!(run_yearly_balance_trace(&inputs).is_empty());
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_future_value_is_monotone_in_each_input(
            savings in 0u32..5_000_000,
            extra_savings in 0u32..1_000_000,
            rate_bp in 0u32..2_000,
            extra_rate_bp in 0u32..500,
            years in 0u32..60,
            extra_years in 0u32..10
        ) {
            let s = savings as f64;
            let r = rate_bp as f64 / 10_000.0;
            let base = future_value(s, r, years);
            let tol = base.abs() * 1e-12;

            prop_assert!(future_value(s + extra_savings as f64, r, years) >= base - tol);
            prop_assert!(
                future_value(s, (rate_bp + extra_rate_bp) as f64 / 10_000.0, years) >= base - tol
            );
            prop_assert!(future_value(s, r, years + extra_years) >= base - tol);
        }

        #[test]
        fn prop_future_value_identity_at_zero_years(
            savings in 0u32..10_000_000,
            rate_bp in -20_000i32..20_000
        ) {
            let s = savings as f64;
            prop_assert_eq!(future_value(s, rate_bp as f64 / 10_000.0, 0), s);
        }

        #[test]
        fn prop_zero_rate_annuity_is_contribution_times_months(
            monthly in 0u32..1_000_000,
            years in 0u32..100
        ) {
            let m = monthly as f64;
            prop_assert_eq!(annuity_future_value(m, 0.0, years), m * years as f64 * 12.0);
        }

        #[test]
        fn prop_fixed_percentage_and_divisor_are_exact(balance in 0u32..50_000_000) {
            let b = balance as f64;
            let pct = withdrawal(b, &WithdrawalStrategy::default());
            prop_assert_eq!(pct.annual, 0.04 * b);
            prop_assert_eq!(pct.monthly, 0.04 * b / 12.0);

            let div = withdrawal(b, &WithdrawalStrategy::FixedDivisor { duration_years: 30 });
            prop_assert_eq!(div.annual, b / 30.0);
            let zero = withdrawal(b, &WithdrawalStrategy::FixedDivisor { duration_years: 0 });
            prop_assert_eq!(zero, div);
        }

        #[test]
        fn prop_valuation_adjusted_stays_within_bounds(
            balance in 0u32..50_000_000,
            cape_tenths in 1u32..1_000
        ) {
            let b = balance as f64;
            let params = CapeParams {
                cape_ratio: cape_tenths as f64 / 10.0,
                ..CapeParams::default()
            };
            for strategy in [
                WithdrawalStrategy::ValuationAdjusted(CapeParams::default()),
                WithdrawalStrategy::ValuationAdjusted(params),
            ] {
                let plan = withdrawal(b, &strategy);
                prop_assert!(plan.annual >= 0.02 * b);
                prop_assert!(plan.annual <= 0.06 * b);
            }
        }

        #[test]
        fn prop_projection_outputs_are_finite(
            savings in 0u32..10_000_000,
            monthly in 0u32..100_000,
            rate_bp in -15_000i32..3_000,
            years in 0u32..80,
            inflation_bp in -15_000i32..2_000
        ) {
            let inputs = ProjectionInputs {
                current_savings: savings as f64,
                monthly_contribution: monthly as f64,
                annual_return_rate: rate_bp as f64 / 10_000.0,
                years_to_retirement: years,
                nominal_return_rate: Some(rate_bp as f64 / 10_000.0),
                inflation_rate: Some(inflation_bp as f64 / 10_000.0),
                social_security_monthly: Some(1_500.0),
                years_until_social_security: 3,
                withdrawal_strategy: WithdrawalStrategy::default(),
            };
            let result = run_projection(&inputs);
            prop_assert!(result.total_savings.is_finite());
            prop_assert!(result.annual_withdrawal.is_finite());
            prop_assert!(result.monthly_withdrawal.is_finite());
            if let Some(real) = result.real_rate_of_return {
                prop_assert!(real.is_finite());
            }
            let ss = result.social_security.expect("benefit is positive");
            prop_assert!(ss.total_monthly_income.is_finite());
        }
    }
}
