// src/handlers/project.rs
use log::info;
use serde::Serialize;
use std::sync::Arc;

use crate::error::Result;
use crate::handlers::report::{self, Report};
use crate::handlers::{run_batch, Context};
use crate::models::{CashFlowSeries, StatementKind, Ticker, ValuationResult};
use crate::services::projection::project_cash_flows;
use crate::services::ratios::{extract_intensities, project_assumptions, Intensities};
use crate::services::valuation::evaluate;

#[derive(Debug, Clone, Serialize)]
pub struct ProjectOutcome {
    pub intensities: Intensities,
    pub initial_investment: f64,
    pub cash_flows: CashFlowSeries,
    pub valuation: ValuationResult,
}

/// Sizes a hypothetical R&D and CapEx programme from the company's latest
/// statements and values it at the project discount rate.
pub async fn evaluate_ticker(ctx: Arc<Context>, ticker: Ticker) -> Result<ProjectOutcome> {
    let income = ctx.load(&ticker, StatementKind::Income).await?;
    let cash_flow = ctx.load(&ticker, StatementKind::CashFlow).await?;
    let balance = ctx.load(&ticker, StatementKind::Balance).await?;

    let intensities = extract_intensities(&income, &cash_flow, &balance)?;
    let assumptions = project_assumptions(&intensities);
    let initial_investment = assumptions.initial_investment();

    let settings = &ctx.settings.project;
    let cash_flows = project_cash_flows(&assumptions, settings.horizon, settings.base_revenue);
    let valuation = evaluate(cash_flows.values(), settings.wacc, initial_investment)?;
    info!(
        "{}: investment={:.0} npv={:.0} irr={:?}",
        ticker, initial_investment, valuation.npv, valuation.irr
    );

    Ok(ProjectOutcome {
        intensities,
        initial_investment,
        cash_flows,
        valuation,
    })
}

pub fn build_report(outcomes: &[(Ticker, Result<ProjectOutcome>)]) -> Report {
    let mut table = Report::new(
        "Project valuation (R&D + CapEx programme)",
        &["rd/rev", "capex/rev", "wc/rev", "investment", "npv", "irr", "payback", "roi"],
    );
    for (ticker, outcome) in outcomes {
        table.push_outcome(ticker, outcome, |o| {
            vec![
                report::number(o.intensities.rd, 4),
                report::number(o.intensities.capex, 4),
                report::number(o.intensities.working_capital, 4),
                report::number(o.initial_investment, 0),
                report::number(o.valuation.npv, 0),
                report::percent(o.valuation.irr),
                report::count(o.valuation.payback_years),
                report::optional(o.valuation.roi, 4),
            ]
        });
    }
    table
}

pub async fn run(ctx: Arc<Context>) -> Report {
    let outcomes = run_batch(ctx, evaluate_ticker).await;
    build_report(&outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::{context, StubSource};

    const INCOME: &str = "REPORT_DATE,TOTAL_OPERATE_INCOME,RESEARCH_EXPENSE,BASIC_EPS\n\
                          2023-12-31,900,9,0.1\n\
                          2024-12-31,1000,10,0.1\n";
    const CASHFLOW: &str = "REPORT_DATE,NETCASH_OPERATE,CONSTRUCT_LONG_ASSET\n\
                            2024-12-31,200,50\n";
    const BALANCE: &str = "REPORT_DATE,MONETARYFUNDS,INVENTORY,ACCOUNTS_RECE,ACCOUNTS_PAYABLE,ADVANCE_RECEIVABLES,TOTAL_LIABILITIES\n\
                           2024-12-31,100,50,50,60,40,500\n";

    fn stub() -> StubSource {
        StubSource::default()
            .with("sz000598", StatementKind::Income, INCOME)
            .with("sz000598", StatementKind::CashFlow, CASHFLOW)
            .with("sz000598", StatementKind::Balance, BALANCE)
    }

    #[tokio::test]
    async fn values_the_programme_from_latest_ratios() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _) = context(dir.path(), &["sz000598"], stub());
        let ticker: Ticker = "sz000598".parse().unwrap();

        let outcome = evaluate_ticker(ctx, ticker).await.unwrap();
        assert!((outcome.intensities.rd - 0.01).abs() < 1e-12);
        assert!((outcome.intensities.capex - 0.05).abs() < 1e-12);
        assert!((outcome.intensities.working_capital - 0.1).abs() < 1e-12);
        // R&D 1.0m + 1.2m + 0.8m, CapEx 5m + 4m + 3m
        assert!((outcome.initial_investment - 15e6).abs() < 1e-3);
        assert_eq!(outcome.cash_flows.len(), 5);
        assert!(outcome.valuation.npv > 0.0);
        assert_eq!(outcome.valuation.payback_years, Some(1));
    }

    #[tokio::test]
    async fn missing_statement_fails_only_that_ticker() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _) = context(dir.path(), &["sh600008", "sz000598"], stub());

        let report = run(ctx).await;
        let rows = report.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], "sh600008");
        assert!(rows[0].last().unwrap().starts_with("failed: data unavailable"));
        assert_eq!(rows[1][0], "sz000598");
        assert_eq!(rows[1].last().unwrap(), "ok");
        assert_eq!(rows[1][7], "1");
    }
}
