use super::ui;
use crate::core::asset_class::AssetClass;
use crate::core::catalog::ModelPortfolio;
use anyhow::Result;
use comfy_table::Cell;

pub fn render(models: &[ModelPortfolio]) -> String {
    let mut table = ui::new_styled_table();
    let mut header = vec![ui::header_cell("Model"), ui::header_cell("Risk")];
    header.extend(AssetClass::AXES.iter().map(|c| ui::header_cell(c.name())));
    header.push(ui::header_cell("Advisory Fee"));
    table.set_header(header);

    for model in models {
        let mut row = vec![
            Cell::new(&model.name),
            Cell::new(model.risk_rank as u8 + 1),
        ];
        for class in AssetClass::AXES {
            let weight = model.allocation.get(&class).copied().unwrap_or(0.0);
            let fund = model.constituents.get(&class).map_or("", String::as_str);
            row.push(ui::right_cell(format!("{} {fund}", ui::format_percent(weight))));
        }
        row.push(ui::right_cell(ui::format_percent(model.advisory_fee)));
        table.add_row(row);
    }

    format!(
        "{}\n\n{}",
        ui::style_text("Model Portfolios", ui::StyleType::Title),
        table
    )
}

pub fn run(models: &[ModelPortfolio], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(models)?);
    } else {
        println!("{}", render(models));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::ModelCatalog;

    #[test]
    fn test_render_lists_every_model() {
        let output = render(ModelCatalog::standard().all_models());
        for name in ["Conservative", "Moderately Conservative", "Moderately Aggressive", "Aggressive"] {
            assert!(output.contains(name), "missing {name}");
        }
        assert!(output.contains("65.00% BND"));
        assert!(output.contains("0.25%"));
    }
}
