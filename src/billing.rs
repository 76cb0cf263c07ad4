use chrono::{Datelike, Duration, NaiveDate};

/// A card's monthly billing cycle: the range of purchase dates that land on
/// one statement, bounded by two consecutive closings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatementWindow {
    pub closing_date: NaiveDate,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
}

pub fn last_day_of_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

/// Day-of-month clamped to the month's length. Month must be pre-validated
/// by the caller (1..=12).
pub fn clamp_day(year: i32, month: u32, day: u32) -> NaiveDate {
    let safe_day = day.clamp(1, last_day_of_month(year, month));
    NaiveDate::from_ymd_opt(year, month, safe_day).expect("month pre-validated by caller")
}

/// Closing date plus the inclusive purchase-date range for one statement.
/// The period starts one day after the previous month's closing, rolling the
/// year at January.
pub fn statement_window(statement_year: i32, statement_month: u32, closing_day: u32) -> StatementWindow {
    let closing_date = clamp_day(statement_year, statement_month, closing_day);
    let (previous_year, previous_month) = if statement_month == 1 {
        (statement_year - 1, 12)
    } else {
        (statement_year, statement_month - 1)
    };
    let previous_closing = clamp_day(previous_year, previous_month, closing_day);
    StatementWindow {
        closing_date,
        period_start: previous_closing + Duration::days(1),
        period_end: closing_date,
    }
}

/// Payment due date for a statement; the same clamping rule as the closing
/// date, applied independently.
pub fn due_date(statement_year: i32, statement_month: u32, due_day: u32) -> NaiveDate {
    clamp_day(statement_year, statement_month, due_day)
}

/// Calendar-month stepping. The day-of-month is re-clamped per target month
/// from `start`'s original day, so a Jan 31 start yields Feb 28 and Mar 31.
pub fn add_months(start: NaiveDate, months: u32) -> NaiveDate {
    let total = start.month0() as i32 + months as i32;
    let year = start.year() + total.div_euclid(12);
    let month = total.rem_euclid(12) as u32 + 1;
    clamp_day(year, month, start.day())
}

/// Reference due date for a purchase's first installment: one month after the
/// purchase, then that month's statement closing date.
pub fn first_installment_due_date(purchase_date: NaiveDate, closing_day: u32) -> NaiveDate {
    let reference = add_months(purchase_date, 1);
    statement_window(reference.year(), reference.month(), closing_day).closing_date
}
