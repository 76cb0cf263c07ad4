use chrono::{Datelike, NaiveDate};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, info};

use crate::billing::{add_months, clamp_day};
use crate::db::{date_from_sql, date_to_sql, money_from_sql, money_to_sql};
use crate::error::{EngineError, Result};
use crate::models::{LedgerKind, Receivable, ReceivableStatus, RecurringInstance, RecurringRule};
use crate::reconciler::insert_ledger_entry;

pub fn load_rule(conn: &Connection, rule_id: i64) -> Result<RecurringRule> {
    let row = conn
        .query_row(
            "SELECT id, household_id, description, amount, due_day, start_date, end_date, \
                    active, category_id \
             FROM recurring_rules WHERE id = ?1",
            [rule_id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, u32>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, bool>(7)?,
                    row.get::<_, Option<i64>>(8)?,
                ))
            },
        )
        .optional()?
        .ok_or(EngineError::NotFound("recurring rule", rule_id))?;
    Ok(RecurringRule {
        id: row.0,
        household_id: row.1,
        description: row.2,
        amount: money_from_sql(&row.3)?,
        due_day: row.4,
        start_date: date_from_sql(&row.5)?,
        end_date: row.6.as_deref().map(date_from_sql).transpose()?,
        active: row.7,
        category_id: row.8,
    })
}

pub fn load_active_rules(conn: &Connection) -> Result<Vec<RecurringRule>> {
    let ids: Vec<i64> = conn
        .prepare("SELECT id FROM recurring_rules WHERE active = 1 ORDER BY id")?
        .query_map([], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    ids.iter().map(|id| load_rule(conn, *id)).collect()
}

pub fn load_instance(conn: &Connection, instance_id: i64) -> Result<RecurringInstance> {
    let row = conn
        .query_row(
            "SELECT id, household_id, rule_id, year, month, due_date, amount, is_paid, \
                    paid_at, ledger_entry_id \
             FROM recurring_instances WHERE id = ?1",
            [instance_id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i32>(3)?,
                    row.get::<_, u32>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, bool>(7)?,
                    row.get::<_, Option<String>>(8)?,
                    row.get::<_, Option<i64>>(9)?,
                ))
            },
        )
        .optional()?
        .ok_or(EngineError::NotFound("recurring instance", instance_id))?;
    Ok(RecurringInstance {
        id: row.0,
        household_id: row.1,
        rule_id: row.2,
        year: row.3,
        month: row.4,
        due_date: date_from_sql(&row.5)?,
        amount: money_from_sql(&row.6)?,
        is_paid: row.7,
        paid_at: row.8,
        ledger_entry_id: row.9,
    })
}

/// Materialize a rule's monthly instances from the current month through
/// `months_ahead` months out, honoring the rule's start/end bounds. Only
/// instances actually inserted by this call are returned; months that already
/// have one are left untouched, so the horizon can be re-run on a schedule.
pub fn generate_instances(
    conn: &Connection,
    rule: &RecurringRule,
    months_ahead: u32,
    today: NaiveDate,
) -> Result<Vec<RecurringInstance>> {
    if months_ahead == 0 {
        return Ok(Vec::new());
    }
    let current_month = clamp_day(today.year(), today.month(), 1);

    let mut created = Vec::new();
    for offset in 0..months_ahead {
        let target = add_months(current_month, offset);
        if rule.start_date > clamp_day(target.year(), target.month(), 31) {
            continue;
        }
        if let Some(end) = rule.end_date {
            if end < target {
                continue;
            }
        }
        let due = clamp_day(target.year(), target.month(), rule.due_day);
        conn.execute(
            "INSERT INTO recurring_instances \
             (household_id, rule_id, year, month, due_date, amount) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT(rule_id, year, month) DO NOTHING",
            rusqlite::params![
                rule.household_id,
                rule.id,
                target.year(),
                target.month(),
                date_to_sql(due),
                money_to_sql(rule.amount),
            ],
        )?;
        if conn.changes() == 1 {
            created.push(load_instance(conn, conn.last_insert_rowid())?);
        } else {
            debug!(rule_id = rule.id, year = target.year(), month = target.month(), "instance already exists");
        }
    }
    if !created.is_empty() {
        info!(rule_id = rule.id, created = created.len(), "recurring instances generated");
    }
    Ok(created)
}

/// Mark an instance paid and book its expense. Paying an already-paid
/// instance is a no-op returning the current row, so exactly one ledger entry
/// ever exists per instance.
pub fn pay_recurring_instance(conn: &mut Connection, instance_id: i64) -> Result<RecurringInstance> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let is_paid: bool = tx
        .query_row(
            "SELECT is_paid FROM recurring_instances WHERE id = ?1",
            [instance_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or(EngineError::NotFound("recurring instance", instance_id))?;
    if is_paid {
        debug!(instance_id, "instance already paid, skipping");
        tx.commit()?;
        return load_instance(conn, instance_id);
    }

    let full = load_instance(&tx, instance_id)?;
    let rule = load_rule(&tx, full.rule_id)?;
    let entry_id = insert_ledger_entry(
        &tx,
        full.household_id,
        full.due_date,
        LedgerKind::Expense,
        full.amount,
        &rule.description,
        rule.category_id,
    )?;
    tx.execute(
        "UPDATE recurring_instances \
         SET is_paid = 1, paid_at = datetime('now'), ledger_entry_id = ?1 \
         WHERE id = ?2",
        rusqlite::params![entry_id, instance_id],
    )?;
    tx.commit()?;
    info!(instance_id, entry_id, "recurring instance paid");
    load_instance(conn, instance_id)
}

pub fn load_receivable(conn: &Connection, receivable_id: i64) -> Result<Receivable> {
    let row = conn
        .query_row(
            "SELECT id, household_id, expected_date, amount, description, status, \
                    received_at, category_id, ledger_entry_id \
             FROM receivables WHERE id = ?1",
            [receivable_id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, Option<i64>>(7)?,
                    row.get::<_, Option<i64>>(8)?,
                ))
            },
        )
        .optional()?
        .ok_or(EngineError::NotFound("receivable", receivable_id))?;
    let status = ReceivableStatus::parse(&row.5)
        .ok_or_else(|| EngineError::Corrupt(format!("bad receivable status '{}'", row.5)))?;
    Ok(Receivable {
        id: row.0,
        household_id: row.1,
        expected_date: date_from_sql(&row.2)?,
        amount: money_from_sql(&row.3)?,
        description: row.4,
        status,
        received_at: row.6,
        category_id: row.7,
        ledger_entry_id: row.8,
    })
}

/// Mark an expected receivable as received and book the income. Only
/// EXPECTED receivables transition; anything else is returned unchanged.
pub fn receive_receivable(conn: &mut Connection, receivable_id: i64) -> Result<Receivable> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let receivable = load_receivable(&tx, receivable_id)?;
    if receivable.status != ReceivableStatus::Expected {
        debug!(receivable_id, status = receivable.status.as_str(), "receivable not expected, skipping");
        tx.commit()?;
        return Ok(receivable);
    }
    let entry_id = insert_ledger_entry(
        &tx,
        receivable.household_id,
        receivable.expected_date,
        LedgerKind::Income,
        receivable.amount,
        &receivable.description,
        receivable.category_id,
    )?;
    tx.execute(
        "UPDATE receivables \
         SET status = ?1, received_at = datetime('now'), ledger_entry_id = ?2 \
         WHERE id = ?3",
        rusqlite::params![ReceivableStatus::Received.as_str(), entry_id, receivable_id],
    )?;
    tx.commit()?;
    info!(receivable_id, entry_id, "receivable received");
    load_receivable(conn, receivable_id)
}
