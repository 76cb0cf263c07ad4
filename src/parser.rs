use std::str::FromStr;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::billing::statement_window;

fn header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)compra\s+data\s+descri[cç][aã]o").unwrap())
}

fn date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{2})/(\d{2})\b").unwrap())
}

// Locale format: `.` thousands separator, `,` decimal separator.
fn amount_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(-?\d{1,3}(?:\.\d{3})*,\d{2})").unwrap())
}

fn installment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})\b").unwrap())
}

/// Purchase-channel classification inferred from the line's numeric prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PurchaseFlag {
    /// Prefix "3": in-person / physical purchase.
    Approx,
    /// Prefix "2": online purchase.
    Online,
    Unknown,
}

impl PurchaseFlag {
    pub fn from_prefix(prefix: Option<&str>) -> Self {
        match prefix {
            Some("3") => Self::Approx,
            Some("2") => Self::Online,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approx => "APPROX",
            Self::Online => "ONLINE",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// One recognized statement line. Transient: produced by the parser and
/// consumed immediately by the reconciler, never persisted as-is.
#[derive(Debug, Clone, Serialize)]
pub struct ParsedStatementItem {
    pub raw_line: String,
    pub prefix_raw: Option<String>,
    pub flag: PurchaseFlag,
    pub purchase_date: NaiveDate,
    pub statement_year: i32,
    pub statement_month: u32,
    pub installments_total: u32,
    pub installments_current: Option<u32>,
    pub description: String,
    pub amount: Decimal,
    /// Closing date of the statement being parsed; the same for every item
    /// in one parse call.
    pub ledger_date: NaiveDate,
    /// Diagnostic trail for the year inference, surfaced for manual review.
    pub inference_note: String,
}

fn infer_year(statement_year: i32, statement_month: u32, line_month: u32) -> (i32, String) {
    if line_month > statement_month {
        let year = statement_year - 1;
        (
            year,
            format!("line_month={line_month} > statement_month={statement_month} => year={year}"),
        )
    } else {
        (
            statement_year,
            format!("line_month={line_month} <= statement_month={statement_month} => year={statement_year}"),
        )
    }
}

fn parse_locale_amount(token: &str) -> Option<Decimal> {
    Decimal::from_str(&token.replace('.', "").replace(',', ".")).ok()
}

/// Best-effort parse of raw statement text, one candidate purchase per line.
/// Lines that cannot be interpreted (headers, summaries, missing or zero
/// amounts, impossible calendar dates) are skipped, never errors: an
/// unexpected item count is a data-quality signal for the caller, not a
/// programming fault.
pub fn parse_statement_text(
    text: &str,
    statement_year: i32,
    statement_month: u32,
    closing_day: u32,
) -> Vec<ParsedStatementItem> {
    let mut items = Vec::new();
    if text.is_empty() {
        return items;
    }
    let ledger_date = statement_window(statement_year, statement_month, closing_day).closing_date;

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        if header_re().is_match(line) {
            continue;
        }
        if line.to_lowercase().starts_with("parcelamentos") {
            continue;
        }
        let Some(date_caps) = date_re().captures(line) else {
            continue;
        };
        let date_token = date_caps.get(0).expect("group 0 always present");
        let day: u32 = date_caps[1].parse().unwrap_or(0);
        let month: u32 = date_caps[2].parse().unwrap_or(0);
        if !(1..=12).contains(&month) {
            continue;
        }

        let (inferred_year, inference_note) = infer_year(statement_year, statement_month, month);
        let Some(purchase_date) = NaiveDate::from_ymd_opt(inferred_year, month, day) else {
            // e.g. 31/02: a date-shaped token naming an impossible date
            continue;
        };

        let prefix_part = line[..date_token.start()].trim();
        let prefix_raw = (!prefix_part.is_empty()).then(|| prefix_part.to_string());
        let flag = PurchaseFlag::from_prefix(prefix_raw.as_deref());

        let rest = line[date_token.end()..].trim();

        let mut installments_current = None;
        let mut installments_total = 1u32;
        for caps in installment_re().captures_iter(rest) {
            let current: u32 = caps[1].parse().unwrap_or(0);
            let total: u32 = caps[2].parse().unwrap_or(0);
            if total > 1 {
                installments_current = Some(current);
                installments_total = total;
                break;
            }
        }

        let amounts: Vec<Decimal> = amount_re()
            .find_iter(rest)
            .filter_map(|m| parse_locale_amount(m.as_str()))
            .collect();
        if amounts.is_empty() {
            continue;
        }
        // With several amounts the last token is usually a running balance;
        // the line item is the second-to-last.
        let amount = if amounts.len() == 1 {
            amounts[0]
        } else {
            amounts[amounts.len() - 2]
        };
        if amount.is_zero() {
            continue;
        }

        let description = installment_re().replace_all(rest, "");
        let description = amount_re().replace_all(&description, "");
        let description = description.split_whitespace().collect::<Vec<_>>().join(" ");

        items.push(ParsedStatementItem {
            raw_line: raw_line.to_string(),
            prefix_raw,
            flag,
            purchase_date,
            statement_year,
            statement_month,
            installments_total,
            installments_current,
            description,
            amount,
            ledger_date,
            inference_note,
        });
    }

    items
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_year_inference_previous_year() {
        let items = parse_statement_text("3 30/03 Mercado 10,00", 2026, 1, 25);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].purchase_date, ymd(2025, 3, 30));
    }

    #[test]
    fn test_year_inference_same_year() {
        let items = parse_statement_text("10/03 Farmacia 30,00", 2026, 8, 25);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].purchase_date, ymd(2026, 3, 10));
    }

    #[test]
    fn test_installment_marker() {
        let items = parse_statement_text("2 10/01 Notebook 09/12 100,00", 2026, 1, 25);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].installments_current, Some(9));
        assert_eq!(items[0].installments_total, 12);
        assert_eq!(items[0].description, "Notebook");
    }

    #[test]
    fn test_no_marker_defaults_to_single() {
        let items = parse_statement_text("3 05/04 Padaria 12,50", 2025, 4, 25);
        assert_eq!(items[0].installments_total, 1);
        assert_eq!(items[0].installments_current, None);
    }

    #[test]
    fn test_prefix_classification() {
        let items = parse_statement_text(
            "3 05/04 Padaria 12,50\n2 06/04 Loja Online 40,00\n05/04 Transporte 8,00",
            2025,
            4,
            25,
        );
        assert_eq!(items[0].flag, PurchaseFlag::Approx);
        assert_eq!(items[1].flag, PurchaseFlag::Online);
        assert_eq!(items[2].flag, PurchaseFlag::Unknown);
        assert_eq!(items[2].prefix_raw, None);
    }

    #[test]
    fn test_skips_headers_blanks_and_summaries() {
        let text = "\
Compra Data Descrição Valor

Parcelamentos a vencer: 1.200,00
3 05/04 Padaria 12,50
Sem data nessa linha 99,99
";
        let items = parse_statement_text(text, 2025, 4, 25);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].description, "Padaria");
    }

    #[test]
    fn test_skips_zero_amount_lines() {
        let items = parse_statement_text("3 05/04 Anuidade 0,00\n3 06/04 Padaria 12,50", 2025, 4, 25);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].description, "Padaria");
    }

    #[test]
    fn test_skips_lines_without_amount() {
        let items = parse_statement_text("3 05/04 Estorno pendente", 2025, 4, 25);
        assert!(items.is_empty());
    }

    #[test]
    fn test_skips_impossible_dates() {
        let items = parse_statement_text("3 31/02 Mercado 10,00\n3 05/04 Padaria 12,50", 2025, 4, 25);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].description, "Padaria");
    }

    #[test]
    fn test_thousands_separator() {
        let items = parse_statement_text("2 10/01 Notebook 1.234,56", 2025, 1, 25);
        assert_eq!(items[0].amount, dec("1234.56"));
    }

    #[test]
    fn test_two_amounts_picks_second_to_last() {
        // trailing token is a running balance, not the line item
        let items = parse_statement_text("3 05/04 Mercado 45,90 1.045,90", 2025, 4, 25);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].amount, dec("45.90"));
        assert_eq!(items[0].description, "Mercado");
    }

    #[test]
    fn test_three_amounts_still_second_to_last() {
        let items = parse_statement_text("3 05/04 Loja 10,00 45,90 1.045,90", 2025, 4, 25);
        assert_eq!(items[0].amount, dec("45.90"));
    }

    #[test]
    fn test_negative_amount() {
        let items = parse_statement_text("3 05/04 Estorno -45,90", 2025, 4, 25);
        assert_eq!(items[0].amount, dec("-45.90"));
    }

    #[test]
    fn test_ledger_date_shared_across_items() {
        let text = "3 05/04 Padaria 12,50\n2 10/04 Loja 40,00";
        let items = parse_statement_text(text, 2025, 4, 25);
        assert_eq!(items[0].ledger_date, ymd(2025, 4, 25));
        assert_eq!(items[1].ledger_date, ymd(2025, 4, 25));
    }

    #[test]
    fn test_empty_text() {
        assert!(parse_statement_text("", 2025, 4, 25).is_empty());
    }

    #[test]
    fn test_inference_note_is_diagnostic() {
        let items = parse_statement_text("3 30/03 Mercado 10,00", 2026, 1, 25);
        assert!(items[0].inference_note.contains("line_month=3"));
        assert!(items[0].inference_note.contains("year=2025"));
    }

    #[test]
    fn test_description_collapses_whitespace() {
        let items = parse_statement_text("3 05/04 Mercado   Livre   BR 45,90", 2025, 4, 25);
        assert_eq!(items[0].description, "Mercado Livre BR");
    }
}
