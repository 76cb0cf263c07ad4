use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;

use crate::error::{EngineError, Result};
use crate::planner::round_money;

// Uniqueness invariants live here as UNIQUE indexes on the natural keys, so
// get-or-create can be insert-on-conflict-do-nothing instead of a
// check-then-insert race.
pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS households (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY,
    household_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    is_active INTEGER DEFAULT 1,
    FOREIGN KEY (household_id) REFERENCES households(id),
    UNIQUE (household_id, name)
);

CREATE TABLE IF NOT EXISTS cards (
    id INTEGER PRIMARY KEY,
    household_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    closing_day INTEGER NOT NULL DEFAULT 25,
    due_day INTEGER NOT NULL DEFAULT 5,
    is_active INTEGER DEFAULT 1,
    FOREIGN KEY (household_id) REFERENCES households(id),
    UNIQUE (household_id, name)
);

CREATE TABLE IF NOT EXISTS ledger_entries (
    id INTEGER PRIMARY KEY,
    household_id INTEGER NOT NULL,
    date TEXT NOT NULL,
    kind TEXT NOT NULL,
    amount TEXT NOT NULL,
    description TEXT NOT NULL,
    category_id INTEGER,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (household_id) REFERENCES households(id),
    FOREIGN KEY (category_id) REFERENCES categories(id)
);
CREATE INDEX IF NOT EXISTS ledger_household_date_idx ON ledger_entries(household_id, date);

CREATE TABLE IF NOT EXISTS purchase_groups (
    id INTEGER PRIMARY KEY,
    household_id INTEGER NOT NULL,
    card_id INTEGER NOT NULL,
    description TEXT NOT NULL,
    logical_key TEXT,
    total_amount TEXT NOT NULL,
    installment_count INTEGER NOT NULL DEFAULT 1,
    first_due_date TEXT NOT NULL,
    purchase_date TEXT,
    category_id INTEGER,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (household_id) REFERENCES households(id),
    FOREIGN KEY (card_id) REFERENCES cards(id),
    FOREIGN KEY (category_id) REFERENCES categories(id)
);
CREATE INDEX IF NOT EXISTS group_card_key_idx ON purchase_groups(card_id, logical_key);

CREATE TABLE IF NOT EXISTS installments (
    id INTEGER PRIMARY KEY,
    household_id INTEGER NOT NULL,
    group_id INTEGER NOT NULL,
    number INTEGER NOT NULL,
    due_date TEXT NOT NULL,
    statement_year INTEGER,
    statement_month INTEGER,
    amount TEXT NOT NULL,
    ledger_entry_id INTEGER,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (household_id) REFERENCES households(id),
    FOREIGN KEY (group_id) REFERENCES purchase_groups(id) ON DELETE CASCADE,
    FOREIGN KEY (ledger_entry_id) REFERENCES ledger_entries(id),
    UNIQUE (group_id, number)
);

CREATE TABLE IF NOT EXISTS recurring_rules (
    id INTEGER PRIMARY KEY,
    household_id INTEGER NOT NULL,
    description TEXT NOT NULL,
    amount TEXT NOT NULL,
    due_day INTEGER NOT NULL,
    start_date TEXT NOT NULL,
    end_date TEXT,
    active INTEGER DEFAULT 1,
    category_id INTEGER,
    FOREIGN KEY (household_id) REFERENCES households(id),
    FOREIGN KEY (category_id) REFERENCES categories(id)
);

CREATE TABLE IF NOT EXISTS recurring_instances (
    id INTEGER PRIMARY KEY,
    household_id INTEGER NOT NULL,
    rule_id INTEGER NOT NULL,
    year INTEGER NOT NULL,
    month INTEGER NOT NULL,
    due_date TEXT NOT NULL,
    amount TEXT NOT NULL,
    is_paid INTEGER DEFAULT 0,
    paid_at TEXT,
    ledger_entry_id INTEGER,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (household_id) REFERENCES households(id),
    FOREIGN KEY (rule_id) REFERENCES recurring_rules(id) ON DELETE CASCADE,
    FOREIGN KEY (ledger_entry_id) REFERENCES ledger_entries(id),
    UNIQUE (rule_id, year, month)
);

CREATE TABLE IF NOT EXISTS receivables (
    id INTEGER PRIMARY KEY,
    household_id INTEGER NOT NULL,
    expected_date TEXT NOT NULL,
    amount TEXT NOT NULL,
    description TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'EXPECTED',
    received_at TEXT,
    category_id INTEGER,
    ledger_entry_id INTEGER,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (household_id) REFERENCES households(id),
    FOREIGN KEY (category_id) REFERENCES categories(id),
    FOREIGN KEY (ledger_entry_id) REFERENCES ledger_entries(id)
);

CREATE TABLE IF NOT EXISTS import_batches (
    id INTEGER PRIMARY KEY,
    household_id INTEGER NOT NULL,
    card_id INTEGER NOT NULL,
    statement_year INTEGER NOT NULL,
    statement_month INTEGER NOT NULL,
    source_text TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'DRAFT',
    created_at TEXT DEFAULT (datetime('now')),
    confirmed_at TEXT,
    FOREIGN KEY (household_id) REFERENCES households(id),
    FOREIGN KEY (card_id) REFERENCES cards(id)
);

CREATE TABLE IF NOT EXISTS import_items (
    id INTEGER PRIMARY KEY,
    batch_id INTEGER NOT NULL,
    purchase_date TEXT NOT NULL,
    statement_year INTEGER NOT NULL,
    statement_month INTEGER NOT NULL,
    description TEXT NOT NULL,
    amount TEXT NOT NULL,
    installments_total INTEGER NOT NULL DEFAULT 1,
    installments_current INTEGER,
    purchase_flag TEXT NOT NULL DEFAULT 'UNKNOWN',
    category_id INTEGER,
    removed INTEGER DEFAULT 0,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (batch_id) REFERENCES import_batches(id) ON DELETE CASCADE,
    FOREIGN KEY (category_id) REFERENCES categories(id)
);
";

const DEFAULT_CATEGORIES: &[&str] = &[
    "Mercado",
    "Farmácia",
    "Transporte",
    "Moradia",
    "Assinaturas",
    "Lazer",
    "Viagem",
    "Educação",
    "Saúde",
    "Outros",
];

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Get-or-create a household and seed its default categories. Idempotent.
pub fn bootstrap_household(conn: &Connection, name: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO households (name) VALUES (?1) ON CONFLICT(name) DO NOTHING",
        [name],
    )?;
    let household_id: i64 =
        conn.query_row("SELECT id FROM households WHERE name = ?1", [name], |row| row.get(0))?;
    for category in DEFAULT_CATEGORIES {
        conn.execute(
            "INSERT INTO categories (household_id, name) VALUES (?1, ?2) \
             ON CONFLICT(household_id, name) DO NOTHING",
            rusqlite::params![household_id, category],
        )?;
    }
    Ok(household_id)
}

// ---------------------------------------------------------------------------
// SQL value helpers — dates as ISO-8601 TEXT, money as 2-dp decimal TEXT
// ---------------------------------------------------------------------------

pub fn date_to_sql(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn date_from_sql(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| EngineError::Corrupt(format!("bad date '{raw}': {e}")))
}

pub fn opt_date_from_sql(raw: Option<&str>) -> Result<Option<NaiveDate>> {
    raw.map(date_from_sql).transpose()
}

pub fn money_to_sql(amount: Decimal) -> String {
    round_money(amount).to_string()
}

pub fn money_from_sql(raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw).map_err(|e| EngineError::Corrupt(format!("bad amount '{raw}': {e}")))
}
