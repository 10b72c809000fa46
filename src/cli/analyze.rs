use super::ui;
use crate::core::analysis::{
    AnalysisEngine, AnalysisResponse, FeeAnalysis, HistoricalComparison, HoldingDetail, Projections,
};
use crate::core::asset_class::AssetClass;
use crate::core::performance::PerformanceStats;
use crate::core::portfolio::Portfolio;
use anyhow::Result;
use comfy_table::{Cell, Color};

impl AnalysisResponse {
    pub fn display_as_tables(&self) -> String {
        let mut output = format!(
            "Portfolio: {}\nTotal Value: {}\n\n",
            ui::style_text(&self.portfolio, ui::StyleType::Title),
            ui::style_text(&ui::format_money(self.total_value), ui::StyleType::TotalValue)
        );

        output.push_str(&render_holdings(&self.holdings));
        output.push_str("\n\n");
        output.push_str(&render_allocation(self));
        output.push_str("\n\n");
        output.push_str(&render_projections(&self.projections));
        output.push_str("\n\n");
        output.push_str(&render_history(&self.historical_performance));
        output.push_str("\n\n");
        output.push_str(&render_fees(&self.fee_analysis));
        output
    }
}

pub fn render_holdings(holdings: &[HoldingDetail]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Ticker"),
        ui::header_cell("Name"),
        ui::header_cell("Asset Class"),
        ui::header_cell("Value"),
        ui::header_cell("Weight"),
        ui::header_cell("Expense Ratio"),
        ui::header_cell("Yield"),
    ]);

    for holding in holdings {
        let ticker = match &holding.degraded {
            Some(_) => Cell::new(format!("{} (!)", holding.ticker)).fg(Color::Red),
            None => Cell::new(&holding.ticker),
        };
        table.add_row(vec![
            ticker,
            Cell::new(holding.name.as_deref().unwrap_or("")),
            Cell::new(holding.asset_class),
            ui::right_cell(ui::format_money(holding.value)),
            ui::right_cell(ui::format_percent(holding.weight)),
            ui::format_optional_cell(holding.expense_ratio, ui::format_percent),
            ui::format_optional_cell(holding.dividend_yield, ui::format_percent),
        ]);
    }

    let mut output = table.to_string();
    for holding in holdings {
        if let Some(reason) = &holding.degraded {
            output.push_str(&format!(
                "\n{}",
                ui::style_text(
                    &format!("{}: {reason}", holding.ticker),
                    ui::StyleType::Error
                )
            ));
        }
    }
    output
}

fn render_allocation(response: &AnalysisResponse) -> String {
    let mut table = ui::new_styled_table();
    let model_header = response
        .matched_model
        .as_ref()
        .map_or("Model".to_string(), |m| m.name.clone());
    table.set_header(vec![
        ui::header_cell("Asset Class"),
        ui::header_cell("Current"),
        ui::header_cell(&model_header),
    ]);

    for class in AssetClass::AXES {
        let model_weight = response
            .matched_model
            .as_ref()
            .map(|m| m.allocation.get(&class).copied().unwrap_or(0.0));
        table.add_row(vec![
            Cell::new(class),
            ui::right_cell(ui::format_percent(response.current_allocation.weight(class))),
            ui::format_optional_cell(model_weight, ui::format_percent),
        ]);
    }
    if response.current_allocation.unknown_weight > 0.0 {
        table.add_row(vec![
            Cell::new(AssetClass::Unknown).fg(Color::DarkGrey),
            ui::right_cell(ui::format_percent(response.current_allocation.unknown_weight)),
            ui::right_cell(ui::format_percent(0.0)),
        ]);
    }

    let summary = match &response.matched_model {
        Some(model) => format!(
            "Best match: {} ({}), similarity {:.4}",
            ui::style_text(&model.name, ui::StyleType::TotalLabel),
            model.risk_rank,
            response.similarity
        ),
        None => ui::style_text(
            "No confident model recommendation for this allocation",
            ui::StyleType::Subtle,
        ),
    };
    format!("{table}\n{summary}")
}

pub fn render_projections(projections: &Projections) -> String {
    let current = &projections.current;
    let model = projections.model.as_ref();

    let mut table = ui::new_styled_table();
    let mut header = vec![
        ui::header_cell("Year"),
        ui::header_cell("Cash Flow"),
        ui::header_cell("Growth"),
        ui::header_cell("Taxes"),
        ui::header_cell("Fees"),
        ui::header_cell("Ending Value"),
        ui::header_cell("Deferred Tax"),
    ];
    if let Some(model) = model {
        header.push(ui::header_cell(&format!("{} Ending", model.label)));
    }
    table.set_header(header);

    for (i, row) in current.rows.iter().enumerate() {
        let mut cells = vec![
            Cell::new(row.year),
            ui::right_cell(ui::format_money(row.cash_flow)),
            ui::right_cell(ui::format_money(row.growth)),
            ui::right_cell(ui::format_money(row.taxes)),
            ui::right_cell(ui::format_money(row.fees)),
            ui::right_cell(ui::format_money(row.ending_value)),
            ui::right_cell(ui::format_money(row.deferred_tax_liability)),
        ];
        if let Some(model) = model {
            let ending = model.rows.get(i).map(|r| r.ending_value);
            cells.push(ui::format_optional_cell(ending, ui::format_money));
        }
        table.add_row(cells);
    }

    let mut output = format!(
        "{}\n{}\n",
        ui::style_text("Projection", ui::StyleType::Title),
        ui::style_text(
            &format!(
                "Mean of {} paths, seed {}, expected return {}",
                current.paths,
                current.seed,
                ui::format_percent(current.weighted_expected_return)
            ),
            ui::StyleType::Subtle
        )
    );
    output.push_str(&table.to_string());
    output.push_str(&format!(
        "\nFinal value: {} (fees {}, taxes {})",
        ui::style_text(&ui::format_money(current.final_value), ui::StyleType::TotalValue),
        ui::format_money(current.total_fees),
        ui::format_money(current.total_taxes)
    ));
    if let Some(model) = model {
        output.push_str(&format!(
            "\n{} final value: {} (fees {}, taxes {})",
            model.label,
            ui::style_text(&ui::format_money(model.final_value), ui::StyleType::TotalValue),
            ui::format_money(model.total_fees),
            ui::format_money(model.total_taxes)
        ));
    }
    output
}

fn return_cell(value: Option<f64>) -> Cell {
    match value {
        Some(fraction) => ui::change_cell(fraction),
        None => ui::format_optional_cell(None, ui::format_percent),
    }
}

fn stats_cells(stats: Option<&PerformanceStats>) -> [Cell; 5] {
    [
        return_cell(stats.map(|s| s.total_return)),
        return_cell(stats.map(|s| s.annualized_return)),
        ui::format_optional_cell(stats.map(|s| s.volatility), ui::format_percent),
        ui::format_optional_cell(stats.map(|s| s.sharpe_ratio), |v| format!("{v:.2}")),
        ui::format_optional_cell(stats.map(|s| s.max_drawdown), ui::format_percent),
    ]
}

fn render_history(history: &HistoricalComparison) -> String {
    let current = &history.current;
    let model = history.model.as_ref();

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Metric"),
        ui::header_cell("Current"),
        ui::header_cell("Current (no fees)"),
        ui::header_cell("Model"),
        ui::header_cell("Model (no fees)"),
    ]);

    let columns = [
        stats_cells(Some(&current.stats_with_fees)),
        stats_cells(Some(&current.stats_without_fees)),
        stats_cells(model.map(|m| &m.stats_with_fees)),
        stats_cells(model.map(|m| &m.stats_without_fees)),
    ];
    let metrics = [
        "Total Return",
        "Annualized Return",
        "Volatility",
        "Sharpe Ratio",
        "Max Drawdown",
    ];
    for (i, metric) in metrics.into_iter().enumerate() {
        let mut row = vec![Cell::new(metric)];
        row.extend(columns.iter().map(|column| column[i].clone()));
        table.add_row(row);
    }

    format!(
        "{}\n{}\n{table}",
        ui::style_text("Historical Performance", ui::StyleType::Title),
        ui::style_text(
            &format!(
                "{} to {} ({} trading days)",
                current.window.start, current.window.end, current.window.trading_days
            ),
            ui::StyleType::Subtle
        )
    )
}

pub fn render_fees(fees: &FeeAnalysis) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Fees"),
        ui::header_cell("Current"),
        ui::header_cell("Model"),
    ]);
    table.add_row(vec![
        Cell::new("Advisory Fee"),
        ui::right_cell(ui::format_percent(fees.current_advisory_fee)),
        ui::format_optional_cell(fees.model_advisory_fee, ui::format_percent),
    ]);
    table.add_row(vec![
        Cell::new("Fund Expenses"),
        ui::right_cell(ui::format_percent(fees.current_expense_ratio)),
        ui::format_optional_cell(fees.model_expense_ratio, ui::format_percent),
    ]);
    table.add_row(vec![
        Cell::new("Annual Cost"),
        ui::right_cell(ui::format_money(fees.current_annual_fee)),
        ui::format_optional_cell(fees.model_annual_fee, ui::format_money),
    ]);
    table.add_row(vec![
        Cell::new("Projected Fees"),
        ui::right_cell(ui::format_money(fees.current_total_fees)),
        ui::format_optional_cell(fees.model_total_fees, ui::format_money),
    ]);

    let mut output = table.to_string();
    if let Some(savings) = fees.annual_savings {
        let (label, style) = if savings >= 0.0 {
            ("Annual savings with model", ui::StyleType::TotalValue)
        } else {
            ("Annual extra cost with model", ui::StyleType::Error)
        };
        output.push_str(&format!(
            "\n{}: {}",
            ui::style_text(label, ui::StyleType::TotalLabel),
            ui::style_text(&ui::format_money(savings.abs()), style)
        ));
    }
    output
}

fn print_response(response: &AnalysisResponse, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(response)?);
    } else {
        println!("{}", response.display_as_tables());
    }
    Ok(())
}

pub async fn run(engine: &AnalysisEngine, portfolio: &Portfolio, json: bool) -> Result<()> {
    let pb = ui::new_spinner(&format!("Analyzing {}...", portfolio.name));
    let response = engine.analyze(portfolio).await;
    pb.finish_and_clear();
    print_response(&response?, json)
}

pub async fn run_aggregate(
    engine: &AnalysisEngine,
    portfolios: &[Portfolio],
    tax_rate: f64,
    json: bool,
) -> Result<()> {
    let pb = ui::new_spinner(&format!("Analyzing {} portfolios...", portfolios.len()));
    let response = engine.analyze_aggregate(portfolios, tax_rate).await;
    pb.finish_and_clear();
    let response = response?;

    if !json {
        for portfolio in portfolios {
            println!(
                "{} {} ({}), {}",
                ui::style_text("Account:", ui::StyleType::TotalLabel),
                portfolio.name,
                portfolio.account_type,
                ui::format_money(portfolio.total_value())
            );
        }
        ui::print_separator();
    }
    print_response(&response, json)
}
