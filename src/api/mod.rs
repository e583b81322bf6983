mod parse;

use axum::{
    Router,
    extract::{
        Json, Query,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::core::solver::{GoalSolveConfig, GoalSolveResult, GoalType, solve_goal};
use crate::core::{
    CapeParams, DEFAULT_RETIREMENT_DURATION_YEARS, FOUR_PERCENT_RULE_EXPLAINER, ProjectionInputs,
    ProjectionResult, WithdrawalPlan, WithdrawalStrategy, YearBalance, compare_strategies,
    run_projection, run_yearly_balance_trace,
};
use crate::error::{NestEggError, Result};
use crate::format::{format_currency, format_percent};
use crate::report::{ReportSections, render_report};

pub use parse::{parse_amount, parse_whole};

const DEFAULT_ANNUAL_RETURN_PERCENT: f64 = 7.0;
const DEFAULT_MAX_GOAL_YEARS: u32 = 50;

// Input ceilings. Anything beyond them is clamped so every projection
// stays finite.
const MAX_AMOUNT: f64 = 1e12;
const MAX_YEARS: i64 = 100;
const MIN_RETURN_PERCENT: f64 = -100.0;
const MAX_RETURN_PERCENT: f64 = 100.0;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum CliWithdrawalStrategy {
    #[default]
    FixedPercentage,
    FixedDivisor,
    ValuationAdjusted,
}

impl CliWithdrawalStrategy {
    /// Form tags are matched loosely; anything unrecognised is the 4% rule.
    fn from_tag(tag: &str) -> Self {
        let normalized = tag.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "fixed-divisor" | "fixeddivisor" | "divisor" | "duration" => {
                CliWithdrawalStrategy::FixedDivisor
            }
            "valuation-adjusted" | "valuationadjusted" | "cape" | "cape-adjusted" => {
                CliWithdrawalStrategy::ValuationAdjusted
            }
            _ => CliWithdrawalStrategy::FixedPercentage,
        }
    }

    fn into_strategy(self, duration_years: i64) -> WithdrawalStrategy {
        match self {
            CliWithdrawalStrategy::FixedPercentage => WithdrawalStrategy::default(),
            CliWithdrawalStrategy::FixedDivisor => WithdrawalStrategy::FixedDivisor { duration_years },
            CliWithdrawalStrategy::ValuationAdjusted => {
                WithdrawalStrategy::ValuationAdjusted(CapeParams::default())
            }
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliGoal {
    RequiredContribution,
    YearsToTarget,
}

impl CliGoal {
    fn from_tag(tag: &str) -> Option<Self> {
        let normalized = tag.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "required-contribution" | "requiredcontribution" | "contribution" => {
                Some(CliGoal::RequiredContribution)
            }
            "years-to-target" | "yearstotarget" | "years" => Some(CliGoal::YearsToTarget),
            _ => None,
        }
    }
}

impl From<CliGoal> for GoalType {
    fn from(value: CliGoal) -> Self {
        match value {
            CliGoal::RequiredContribution => GoalType::RequiredContribution,
            CliGoal::YearsToTarget => GoalType::YearsToTarget,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
enum ApiWithdrawalStrategy {
    FixedPercentage,
    FixedDivisor,
    ValuationAdjusted,
}

impl From<&WithdrawalStrategy> for ApiWithdrawalStrategy {
    fn from(value: &WithdrawalStrategy) -> Self {
        match value {
            WithdrawalStrategy::FixedPercentage { .. } => ApiWithdrawalStrategy::FixedPercentage,
            WithdrawalStrategy::FixedDivisor { .. } => ApiWithdrawalStrategy::FixedDivisor,
            WithdrawalStrategy::ValuationAdjusted(_) => ApiWithdrawalStrategy::ValuationAdjusted,
        }
    }
}

/// Form values arrive as numbers or as text.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawField {
    Number(f64),
    Text(String),
}

impl RawField {
    fn into_text(self) -> String {
        match self {
            RawField::Number(v) => v.to_string(),
            RawField::Text(s) => s,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ProjectPayload {
    current_savings: Option<RawField>,
    monthly_contribution: Option<RawField>,
    annual_return: Option<RawField>,
    years_to_retirement: Option<RawField>,
    nominal_return: Option<RawField>,
    inflation_rate: Option<RawField>,
    social_security_monthly: Option<RawField>,
    years_until_social_security: Option<RawField>,
    withdrawal_strategy: Option<RawField>,
    retirement_duration_years: Option<RawField>,

    goal: Option<RawField>,
    target_monthly_income: Option<RawField>,
    max_years: Option<RawField>,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "nestegg",
    about = "Retirement savings projection and safe withdrawal estimator",
    after_help = "Run `nestegg serve [port]` to start the HTTP API instead.",
    allow_negative_numbers = true
)]
pub struct Cli {
    #[arg(long, help = "Current retirement savings in dollars")]
    current_savings: Option<String>,
    #[arg(long, help = "Monthly contribution in dollars")]
    monthly_contribution: Option<String>,
    #[arg(long, default_value = "7", help = "Expected annual return in percent, e.g. 7")]
    annual_return: String,
    #[arg(long, help = "Years until retirement")]
    years_to_retirement: Option<String>,
    #[arg(
        long,
        help = "Nominal annual return in percent; with --inflation-rate reports the real return"
    )]
    nominal_return: Option<String>,
    #[arg(long, help = "Expected annual inflation in percent")]
    inflation_rate: Option<String>,
    #[arg(long, help = "Expected monthly social security benefit in dollars")]
    social_security_monthly: Option<String>,
    #[arg(long, help = "Years until social security payments start")]
    years_until_social_security: Option<String>,
    #[arg(
        long,
        value_enum,
        default_value_t = CliWithdrawalStrategy::FixedPercentage,
        help = "Withdrawal strategy: 4% rule, fixed divisor, or CAPE-adjusted rate"
    )]
    strategy: CliWithdrawalStrategy,
    #[arg(
        long,
        default_value = "30",
        help = "Retirement length in years, used by the fixed-divisor strategy"
    )]
    retirement_duration_years: String,
    #[arg(long, help = "Print the year-by-year balance schedule")]
    schedule: bool,
    #[arg(long, help = "Compare every withdrawal strategy on the projected balance")]
    compare: bool,
    #[arg(long, value_enum, help = "Solve for a target monthly retirement income")]
    goal: Option<CliGoal>,
    #[arg(long, help = "Target monthly retirement income in dollars, used with --goal")]
    target_monthly_income: Option<String>,
    #[arg(
        long,
        default_value = "50",
        help = "Longest horizon searched by --goal years-to-target"
    )]
    max_years: String,
    #[arg(short, long, help = "Log debug detail to stderr")]
    pub verbose: bool,
}

/// One sanitized snapshot of the form, plus the fields that had to be
/// defaulted or clamped on the way.
#[derive(Debug, Clone)]
pub struct ParsedInputs {
    pub inputs: ProjectionInputs,
    pub duration_years: i64,
    pub adjusted_fields: Vec<&'static str>,
}

#[derive(Debug)]
struct ApiRequest {
    cli: Cli,
    parsed: ParsedInputs,
    goal_tag: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectionDisplay {
    total_savings: String,
    annual_withdrawal: String,
    monthly_withdrawal: String,
    withdrawal_rate: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    real_rate_of_return: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    monthly_social_security: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    total_monthly_income: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectResponse {
    withdrawal_strategy: ApiWithdrawalStrategy,
    retirement_duration_years: i64,
    #[serde(flatten)]
    result: ProjectionResult,
    display: ProjectionDisplay,
    yearly_balances: Vec<YearBalance>,
    strategy_comparison: Vec<WithdrawalPlan>,
    adjusted_fields: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SolveResponse {
    #[serde(flatten)]
    result: GoalSolveResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    solved_display: Option<String>,
    adjusted_fields: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
struct ExplainerResponse {
    title: &'static str,
    text: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for NestEggError {
    fn into_response(self) -> Response {
        let status = match &self {
            NestEggError::InvalidGoal(_) => StatusCode::BAD_REQUEST,
            NestEggError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        error_response(status, &self.to_string())
    }
}

/// Blank form fields count as not supplied.
fn supplied(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|t| !t.is_empty())
}

fn bounded(
    name: &'static str,
    value: f64,
    min: f64,
    max: f64,
    adjusted: &mut Vec<&'static str>,
) -> f64 {
    let clamped = value.clamp(min, max);
    if clamped != value {
        adjusted.push(name);
    }
    clamped
}

fn amount_field(name: &'static str, text: Option<&str>, adjusted: &mut Vec<&'static str>) -> f64 {
    let Some(text) = supplied(text) else {
        return 0.0;
    };
    match parse_amount(text) {
        Some(v) => bounded(name, v, 0.0, MAX_AMOUNT, adjusted),
        None => {
            adjusted.push(name);
            0.0
        }
    }
}

fn optional_amount(
    name: &'static str,
    text: Option<&str>,
    adjusted: &mut Vec<&'static str>,
) -> Option<f64> {
    supplied(text).map(|_| amount_field(name, text, adjusted))
}

fn years_field(
    name: &'static str,
    text: Option<&str>,
    fallback: u32,
    adjusted: &mut Vec<&'static str>,
) -> u32 {
    let Some(text) = supplied(text) else {
        return fallback;
    };
    match parse_whole(text) {
        Some(v) => {
            let clamped = v.clamp(0, MAX_YEARS);
            if clamped != v {
                adjusted.push(name);
            }
            clamped as u32
        }
        None => {
            adjusted.push(name);
            fallback
        }
    }
}

fn rate_field(
    name: &'static str,
    text: Option<&str>,
    adjusted: &mut Vec<&'static str>,
) -> Option<f64> {
    let text = supplied(text)?;
    let parsed = parse_amount(text);
    if parsed.is_none() {
        adjusted.push(name);
    }
    parsed.map(|percent| percent / 100.0)
}

fn build_inputs(cli: &Cli) -> ParsedInputs {
    let mut adjusted = Vec::new();

    let current_savings = amount_field("currentSavings", cli.current_savings.as_deref(), &mut adjusted);
    let monthly_contribution = amount_field(
        "monthlyContribution",
        cli.monthly_contribution.as_deref(),
        &mut adjusted,
    );

    let annual_return_percent = match supplied(Some(cli.annual_return.as_str())) {
        None => DEFAULT_ANNUAL_RETURN_PERCENT,
        Some(text) => match parse_amount(text) {
            Some(v) => bounded(
                "annualReturn",
                v,
                MIN_RETURN_PERCENT,
                MAX_RETURN_PERCENT,
                &mut adjusted,
            ),
            None => {
                adjusted.push("annualReturn");
                DEFAULT_ANNUAL_RETURN_PERCENT
            }
        },
    };

    let years_to_retirement = years_field(
        "yearsToRetirement",
        cli.years_to_retirement.as_deref(),
        0,
        &mut adjusted,
    );
    let nominal_return_rate = rate_field("nominalReturn", cli.nominal_return.as_deref(), &mut adjusted);
    let inflation_rate = rate_field("inflationRate", cli.inflation_rate.as_deref(), &mut adjusted);
    let social_security_monthly = optional_amount(
        "socialSecurityMonthly",
        cli.social_security_monthly.as_deref(),
        &mut adjusted,
    );
    let years_until_social_security = years_field(
        "yearsUntilSocialSecurity",
        cli.years_until_social_security.as_deref(),
        0,
        &mut adjusted,
    );

    let duration_text = supplied(Some(cli.retirement_duration_years.as_str()));
    let duration_years = match duration_text.map(parse_whole) {
        None => DEFAULT_RETIREMENT_DURATION_YEARS,
        Some(Some(v)) if v > 0 => v,
        Some(_) => {
            adjusted.push("retirementDurationYears");
            DEFAULT_RETIREMENT_DURATION_YEARS
        }
    };

    ParsedInputs {
        inputs: ProjectionInputs {
            current_savings,
            monthly_contribution,
            annual_return_rate: annual_return_percent / 100.0,
            years_to_retirement,
            nominal_return_rate,
            inflation_rate,
            social_security_monthly,
            years_until_social_security,
            withdrawal_strategy: cli.strategy.into_strategy(duration_years),
        },
        duration_years,
        adjusted_fields: adjusted,
    }
}

fn goal_config(
    cli: &Cli,
    goal_type: GoalType,
    adjusted: &mut Vec<&'static str>,
) -> Result<GoalSolveConfig> {
    let target_monthly_income = supplied(cli.target_monthly_income.as_deref())
        .and_then(parse_amount)
        .ok_or_else(|| {
            NestEggError::InvalidGoal("a target monthly income is required".to_string())
        })?;
    let max_years = years_field(
        "maxYears",
        Some(cli.max_years.as_str()),
        DEFAULT_MAX_GOAL_YEARS,
        adjusted,
    );

    Ok(GoalSolveConfig {
        goal_type,
        target_monthly_income,
        max_years,
    })
}

fn resolve_goal(tag: Option<&str>) -> Result<GoalType> {
    match supplied(tag) {
        None => Ok(GoalType::RequiredContribution),
        Some(tag) => CliGoal::from_tag(tag)
            .map(GoalType::from)
            .ok_or_else(|| NestEggError::InvalidGoal(format!("unknown goal '{tag}'"))),
    }
}

fn log_adjusted_fields(parsed: &ParsedInputs, interactive: bool) {
    if parsed.adjusted_fields.is_empty() {
        return;
    }
    if interactive {
        warn!(fields = ?parsed.adjusted_fields, "invalid or out-of-range values replaced by defaults");
    } else {
        debug!(fields = ?parsed.adjusted_fields, "coerced form fields");
    }
}

/// Runs the CLI flow and returns the text report.
pub fn run_report(cli: &Cli) -> Result<String> {
    let mut parsed = build_inputs(cli);
    let goal_config = match cli.goal {
        Some(goal) => Some(goal_config(cli, goal.into(), &mut parsed.adjusted_fields)?),
        None => None,
    };
    log_adjusted_fields(&parsed, true);

    let result = run_projection(&parsed.inputs);
    debug!(
        total_savings = result.total_savings,
        annual_withdrawal = result.annual_withdrawal,
        "projection computed"
    );

    let schedule = cli
        .schedule
        .then(|| run_yearly_balance_trace(&parsed.inputs));
    let comparison = cli
        .compare
        .then(|| compare_strategies(result.total_savings, parsed.duration_years));
    let goal = match goal_config {
        Some(config) => Some(solve_goal(&parsed.inputs, config)?),
        None => None,
    };

    Ok(render_report(
        &result,
        ReportSections {
            schedule: schedule.as_deref(),
            comparison: comparison.as_deref(),
            goal: goal.as_ref(),
        },
    ))
}

fn router() -> Router {
    Router::new()
        .route(
            "/api/project",
            get(project_get_handler).post(project_post_handler),
        )
        .route("/api/solve", get(solve_get_handler).post(solve_post_handler))
        .route("/api/explainer", get(explainer_handler))
        .fallback(not_found_handler)
}

pub async fn run_http_server(port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router();

    let listener = TcpListener::bind(addr).await?;
    info!("nestegg HTTP API listening on http://{addr}");
    info!("Local access: http://127.0.0.1:{port}/api/project");

    axum::serve(listener, app).await?;
    Ok(())
}

async fn explainer_handler() -> Response {
    json_response(
        StatusCode::OK,
        ExplainerResponse {
            title: "About the 4% Rule",
            text: FOUR_PERCENT_RULE_EXPLAINER,
        },
    )
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn project_get_handler(
    query: std::result::Result<Query<ProjectPayload>, QueryRejection>,
) -> Response {
    match query {
        Ok(Query(payload)) => project_handler_impl(payload),
        Err(rejection) => error_response(rejection.status(), &rejection.body_text()),
    }
}

async fn project_post_handler(
    body: std::result::Result<Json<ProjectPayload>, JsonRejection>,
) -> Response {
    match body {
        Ok(Json(payload)) => project_handler_impl(payload),
        Err(rejection) => error_response(rejection.status(), &rejection.body_text()),
    }
}

async fn solve_get_handler(
    query: std::result::Result<Query<ProjectPayload>, QueryRejection>,
) -> Response {
    match query {
        Ok(Query(payload)) => solve_handler_impl(payload),
        Err(rejection) => error_response(rejection.status(), &rejection.body_text()),
    }
}

async fn solve_post_handler(
    body: std::result::Result<Json<ProjectPayload>, JsonRejection>,
) -> Response {
    match body {
        Ok(Json(payload)) => solve_handler_impl(payload),
        Err(rejection) => error_response(rejection.status(), &rejection.body_text()),
    }
}

fn project_handler_impl(payload: ProjectPayload) -> Response {
    let request = api_request_from_payload(payload);
    log_adjusted_fields(&request.parsed, false);

    let response = build_project_response(&request.parsed);
    debug!(
        total_savings = response.result.total_savings,
        "projection computed"
    );
    json_response(StatusCode::OK, response)
}

fn solve_handler_impl(payload: ProjectPayload) -> Response {
    let mut request = api_request_from_payload(payload);

    let outcome = resolve_goal(request.goal_tag.as_deref())
        .and_then(|goal| goal_config(&request.cli, goal, &mut request.parsed.adjusted_fields))
        .and_then(|config| {
            log_adjusted_fields(&request.parsed, false);
            build_solve_response(&request.parsed, config)
        });
    match outcome {
        Ok(response) => json_response(StatusCode::OK, response),
        Err(err) => {
            debug!(error = %err, "goal rejected");
            err.into_response()
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn api_request_from_json(json: &str) -> std::result::Result<ApiRequest, String> {
    let payload = serde_json::from_str::<ProjectPayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    Ok(api_request_from_payload(payload))
}

fn api_request_from_payload(payload: ProjectPayload) -> ApiRequest {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.current_savings {
        cli.current_savings = Some(v.into_text());
    }
    if let Some(v) = payload.monthly_contribution {
        cli.monthly_contribution = Some(v.into_text());
    }
    if let Some(v) = payload.annual_return {
        cli.annual_return = v.into_text();
    }
    if let Some(v) = payload.years_to_retirement {
        cli.years_to_retirement = Some(v.into_text());
    }
    if let Some(v) = payload.nominal_return {
        cli.nominal_return = Some(v.into_text());
    }
    if let Some(v) = payload.inflation_rate {
        cli.inflation_rate = Some(v.into_text());
    }
    if let Some(v) = payload.social_security_monthly {
        cli.social_security_monthly = Some(v.into_text());
    }
    if let Some(v) = payload.years_until_social_security {
        cli.years_until_social_security = Some(v.into_text());
    }
    if let Some(v) = payload.withdrawal_strategy {
        cli.strategy = CliWithdrawalStrategy::from_tag(&v.into_text());
    }
    if let Some(v) = payload.retirement_duration_years {
        cli.retirement_duration_years = v.into_text();
    }
    if let Some(v) = payload.target_monthly_income {
        cli.target_monthly_income = Some(v.into_text());
    }
    if let Some(v) = payload.max_years {
        cli.max_years = v.into_text();
    }

    let parsed = build_inputs(&cli);
    ApiRequest {
        cli,
        parsed,
        goal_tag: payload.goal.map(RawField::into_text),
    }
}

fn default_cli_for_api() -> Cli {
    Cli {
        current_savings: None,
        monthly_contribution: None,
        annual_return: DEFAULT_ANNUAL_RETURN_PERCENT.to_string(),
        years_to_retirement: None,
        nominal_return: None,
        inflation_rate: None,
        social_security_monthly: None,
        years_until_social_security: None,
        strategy: CliWithdrawalStrategy::FixedPercentage,
        retirement_duration_years: DEFAULT_RETIREMENT_DURATION_YEARS.to_string(),
        schedule: false,
        compare: false,
        goal: None,
        target_monthly_income: None,
        max_years: DEFAULT_MAX_GOAL_YEARS.to_string(),
        verbose: false,
    }
}

fn build_project_response(parsed: &ParsedInputs) -> ProjectResponse {
    let inputs = &parsed.inputs;
    let result = run_projection(inputs);

    let display = ProjectionDisplay {
        total_savings: format_currency(result.total_savings),
        annual_withdrawal: format_currency(result.annual_withdrawal),
        monthly_withdrawal: format_currency(result.monthly_withdrawal),
        withdrawal_rate: format_percent(result.effective_withdrawal_rate * 100.0, 1),
        real_rate_of_return: result.real_rate_of_return.map(|r| format_percent(r, 2)),
        monthly_social_security: result
            .social_security
            .map(|ss| format_currency(ss.monthly_benefit)),
        total_monthly_income: result
            .social_security
            .map(|ss| format_currency(ss.total_monthly_income)),
    };

    ProjectResponse {
        withdrawal_strategy: (&inputs.withdrawal_strategy).into(),
        retirement_duration_years: parsed.duration_years,
        yearly_balances: run_yearly_balance_trace(inputs),
        strategy_comparison: compare_strategies(result.total_savings, parsed.duration_years),
        display,
        result,
        adjusted_fields: parsed.adjusted_fields.clone(),
    }
}

fn build_solve_response(parsed: &ParsedInputs, config: GoalSolveConfig) -> Result<SolveResponse> {
    let result = solve_goal(&parsed.inputs, config)?;
    let solved_display = result.solved_value.map(|value| match result.goal_type {
        GoalType::RequiredContribution => format!("{} per month", format_currency(value)),
        GoalType::YearsToTarget => format!("{value} years"),
    });

    Ok(SolveResponse {
        result,
        solved_display,
        adjusted_fields: parsed.adjusted_fields.clone(),
    })
}
