use chrono::NaiveDate;
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerKind {
    Income,
    Expense,
}

impl LedgerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "INCOME",
            Self::Expense => "EXPENSE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceivableStatus {
    Expected,
    Received,
    Canceled,
}

impl ReceivableStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expected => "EXPECTED",
            Self::Received => "RECEIVED",
            Self::Canceled => "CANCELED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "EXPECTED" => Some(Self::Expected),
            "RECEIVED" => Some(Self::Received),
            "CANCELED" => Some(Self::Canceled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Draft,
    Confirmed,
    Canceled,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Confirmed => "CONFIRMED",
            Self::Canceled => "CANCELED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DRAFT" => Some(Self::Draft),
            "CONFIRMED" => Some(Self::Confirmed),
            "CANCELED" => Some(Self::Canceled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Card {
    pub id: i64,
    pub household_id: i64,
    pub name: String,
    pub closing_day: u32,
    pub due_day: u32,
    pub is_active: bool,
}

/// Immutable once created; installments and recurring instances each own at
/// most one.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub id: i64,
    pub household_id: i64,
    pub date: NaiveDate,
    pub kind: LedgerKind,
    pub amount: Decimal,
    pub description: String,
    pub category_id: Option<i64>,
}

/// One physical purchase split into installments. `logical_key` is set only
/// for installment purchases; single-shot purchases are not deduplicated.
#[derive(Debug, Clone)]
pub struct PurchaseGroup {
    pub id: i64,
    pub household_id: i64,
    pub card_id: i64,
    pub description: String,
    pub logical_key: Option<String>,
    pub total_amount: Decimal,
    pub installment_count: u32,
    pub first_due_date: NaiveDate,
    pub purchase_date: Option<NaiveDate>,
    pub category_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct Installment {
    pub id: i64,
    pub household_id: i64,
    pub group_id: i64,
    pub number: u32,
    pub due_date: NaiveDate,
    pub statement_year: Option<i32>,
    pub statement_month: Option<u32>,
    pub amount: Decimal,
    pub ledger_entry_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct RecurringRule {
    pub id: i64,
    pub household_id: i64,
    pub description: String,
    pub amount: Decimal,
    pub due_day: u32,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub active: bool,
    pub category_id: Option<i64>,
}

/// One concrete month's occurrence of a recurring rule; at most one per
/// (rule, year, month).
#[derive(Debug, Clone)]
pub struct RecurringInstance {
    pub id: i64,
    pub household_id: i64,
    pub rule_id: i64,
    pub year: i32,
    pub month: u32,
    pub due_date: NaiveDate,
    pub amount: Decimal,
    pub is_paid: bool,
    pub paid_at: Option<String>,
    pub ledger_entry_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct Receivable {
    pub id: i64,
    pub household_id: i64,
    pub expected_date: NaiveDate,
    pub amount: Decimal,
    pub description: String,
    pub status: ReceivableStatus,
    pub received_at: Option<String>,
    pub category_id: Option<i64>,
    pub ledger_entry_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct ImportBatch {
    pub id: i64,
    pub household_id: i64,
    pub card_id: i64,
    pub statement_year: i32,
    pub statement_month: u32,
    pub status: BatchStatus,
}
