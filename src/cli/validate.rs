use super::ui;
use crate::core::analysis::{AnalysisEngine, TickerValidation};
use anyhow::Result;
use comfy_table::{Cell, Color};

pub fn render(results: &[TickerValidation]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Ticker"),
        ui::header_cell("Status"),
        ui::header_cell("Name"),
        ui::header_cell("Asset Class"),
        ui::header_cell("Price"),
    ]);

    for result in results {
        let status = if result.valid {
            Cell::new("valid").fg(Color::Green)
        } else {
            Cell::new("invalid").fg(Color::Red)
        };
        table.add_row(vec![
            Cell::new(&result.ticker),
            status,
            Cell::new(result.resolved_name.as_deref().unwrap_or("")),
            Cell::new(result.asset_class.map_or(String::new(), |c| c.to_string())),
            ui::format_optional_cell(result.price, ui::format_money),
        ]);
    }

    let mut output = table.to_string();
    for result in results {
        if let Some(reason) = &result.reason {
            let line = format!("{}: {reason}", result.ticker);
            output.push_str(&format!("\n{}", ui::style_text(&line, ui::StyleType::Error)));
        }
    }
    output
}

pub async fn run(engine: &AnalysisEngine, tickers: &[String], json: bool) -> Result<()> {
    let pb = ui::new_spinner("Looking up tickers...");
    let results = engine.validate_tickers(tickers).await;
    pb.finish_and_clear();
    let results = results?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        println!("{}", render(&results));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::asset_class::AssetClass;

    #[test]
    fn test_render_validation() {
        let valid = TickerValidation {
            ticker: "VTI".to_string(),
            valid: true,
            resolved_name: Some("Vanguard Total Stock Market ETF".to_string()),
            asset_class: Some(AssetClass::UsEquities),
            price: Some(250.5),
            reason: None,
        };
        let output = render(std::slice::from_ref(&valid));
        assert!(output.contains("US Equities"));
        assert!(output.contains("$250.50"));

        let invalid = TickerValidation {
            ticker: "NOPE".to_string(),
            valid: false,
            resolved_name: None,
            asset_class: None,
            price: None,
            reason: Some("Unknown ticker: NOPE".to_string()),
        };
        let output = render(&[valid, invalid]);
        assert!(output.contains("VTI"));
        assert!(output.contains("invalid"));
        assert!(output.contains("N/A"));
        assert!(output.contains("NOPE: Unknown ticker: NOPE"));
    }
}
