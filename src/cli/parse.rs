use anyhow::{Context, Result};
use rust_decimal::Decimal;

use parcela::parser::parse_statement_text;
use parcela::planner::round_money;

pub fn run(file: &str, year: i32, month: u32, closing_day: u32, json: bool) -> Result<()> {
    let text = std::fs::read_to_string(file).with_context(|| format!("reading {file}"))?;
    let items = parse_statement_text(&text, year, month, closing_day);

    if json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    println!(
        "{:<12} {:>6} {:>12} {:<8} DESCRIPTION",
        "DATE", "PARC", "AMOUNT", "FLAG"
    );
    let mut total = Decimal::ZERO;
    for item in &items {
        let parc = match (item.installments_current, item.installments_total) {
            (Some(current), installments_total) => format!("{current}/{installments_total}"),
            (None, _) => "-".to_string(),
        };
        println!(
            "{:<12} {:>6} {:>12} {:<8} {}",
            item.purchase_date.format("%Y-%m-%d"),
            parc,
            round_money(item.amount).to_string(),
            item.flag.as_str(),
            item.description,
        );
        total += item.amount;
    }
    println!();
    println!("{} item(s), total {}", items.len(), round_money(total));
    Ok(())
}
