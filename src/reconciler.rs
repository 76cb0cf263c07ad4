use std::collections::HashSet;

use chrono::{Datelike, NaiveDate};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info};

use crate::billing::{first_installment_due_date, statement_window};
use crate::db::{date_from_sql, date_to_sql, money_from_sql, money_to_sql, opt_date_from_sql};
use crate::error::{EngineError, Result, ValidationError};
use crate::keyer::logical_key;
use crate::models::{BatchStatus, Card, ImportBatch, Installment, LedgerKind, PurchaseGroup};
use crate::parser::ParsedStatementItem;
use crate::planner::{installment_values, plan, round_money};

/// Household/card scope for one statement import.
#[derive(Debug, Clone, Copy)]
pub struct StatementContext {
    pub household_id: i64,
    pub card_id: i64,
    pub statement_year: i32,
    pub statement_month: u32,
}

/// A staged import item after user review; amount, description, category and
/// the removed flag may all have been edited from the parser's output.
#[derive(Debug, Clone)]
pub struct ReviewedItem {
    pub item_id: i64,
    pub purchase_date: NaiveDate,
    pub description: String,
    pub amount: Decimal,
    pub installments_total: u32,
    pub installments_current: Option<u32>,
    pub category_id: Option<i64>,
    pub removed: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfirmOutcome {
    pub groups_created: usize,
    pub installments_created: usize,
    pub entries_created: usize,
    pub skipped_existing: usize,
    /// True when the batch had already been confirmed; nothing was written.
    pub already_confirmed: bool,
}

/// Persist a parsed statement as a DRAFT batch plus its items, returning the
/// batch id. The batch records what was imported so a confirm can be replayed
/// safely and audited later.
pub fn stage_batch(
    conn: &mut Connection,
    ctx: &StatementContext,
    source_text: &str,
    items: &[ParsedStatementItem],
) -> Result<i64> {
    if !(1..=12).contains(&ctx.statement_month) {
        return Err(EngineError::InvalidInput {
            field: "statement_month",
            message: format!("{} is not a calendar month", ctx.statement_month),
        });
    }
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO import_batches (household_id, card_id, statement_year, statement_month, source_text) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![ctx.household_id, ctx.card_id, ctx.statement_year, ctx.statement_month, source_text],
    )?;
    let batch_id = tx.last_insert_rowid();
    for item in items {
        tx.execute(
            "INSERT INTO import_items \
             (batch_id, purchase_date, statement_year, statement_month, description, amount, \
              installments_total, installments_current, purchase_flag) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                batch_id,
                date_to_sql(item.purchase_date),
                item.statement_year,
                item.statement_month,
                item.description,
                money_to_sql(item.amount),
                item.installments_total,
                item.installments_current,
                item.flag.as_str(),
            ],
        )?;
    }
    tx.commit()?;
    info!(batch_id, items = items.len(), "import batch staged");
    Ok(batch_id)
}

/// Load a batch's staged items in insertion order, ready for review.
pub fn staged_items(conn: &Connection, batch_id: i64) -> Result<Vec<ReviewedItem>> {
    let mut stmt = conn.prepare(
        "SELECT id, purchase_date, description, amount, installments_total, installments_current, \
                category_id, removed \
         FROM import_items WHERE batch_id = ?1 ORDER BY id",
    )?;
    let rows: Vec<(i64, String, String, String, u32, Option<u32>, Option<i64>, bool)> = stmt
        .query_map([batch_id], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        items.push(ReviewedItem {
            item_id: row.0,
            purchase_date: date_from_sql(&row.1)?,
            description: row.2,
            amount: money_from_sql(&row.3)?,
            installments_total: row.4,
            installments_current: row.5,
            category_id: row.6,
            removed: row.7,
        });
    }
    Ok(items)
}

fn load_batch(conn: &Connection, batch_id: i64) -> Result<ImportBatch> {
    let row = conn
        .query_row(
            "SELECT id, household_id, card_id, statement_year, statement_month, status \
             FROM import_batches WHERE id = ?1",
            [batch_id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i32>(3)?,
                    row.get::<_, u32>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        )
        .optional()?
        .ok_or(EngineError::NotFound("import batch", batch_id))?;
    let status = BatchStatus::parse(&row.5)
        .ok_or_else(|| EngineError::Corrupt(format!("bad batch status '{}'", row.5)))?;
    Ok(ImportBatch {
        id: row.0,
        household_id: row.1,
        card_id: row.2,
        statement_year: row.3,
        statement_month: row.4,
        status,
    })
}

fn load_card(conn: &Connection, card_id: i64) -> Result<Option<Card>> {
    let row = conn
        .query_row(
            "SELECT id, household_id, name, closing_day, due_day, is_active FROM cards WHERE id = ?1",
            [card_id],
            |row| {
                Ok(Card {
                    id: row.get(0)?,
                    household_id: row.get(1)?,
                    name: row.get(2)?,
                    closing_day: row.get(3)?,
                    due_day: row.get(4)?,
                    is_active: row.get(5)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

fn category_in_household(conn: &Connection, category_id: i64, household_id: i64) -> Result<bool> {
    let mut stmt =
        conn.prepare_cached("SELECT 1 FROM categories WHERE id = ?1 AND household_id = ?2")?;
    Ok(stmt.exists(rusqlite::params![category_id, household_id])?)
}

fn validate_batch(
    conn: &Connection,
    batch: &ImportBatch,
    card: Option<&Card>,
    reviewed: &[ReviewedItem],
    selected: &HashSet<i64>,
) -> Result<Vec<ValidationError>> {
    let mut errors = Vec::new();

    if !(1..=12).contains(&batch.statement_month) {
        errors.push(ValidationError {
            item_id: None,
            field: "statement_month",
            message: format!("{} is not a calendar month", batch.statement_month),
        });
    }
    match card {
        None => errors.push(ValidationError {
            item_id: None,
            field: "card",
            message: format!("card {} does not exist", batch.card_id),
        }),
        Some(card) if card.household_id != batch.household_id => errors.push(ValidationError {
            item_id: None,
            field: "card",
            message: format!("card {} belongs to another household", card.id),
        }),
        Some(_) => {}
    }

    for item in reviewed {
        if !selected.contains(&item.item_id) || item.removed {
            continue;
        }
        if item.installments_total == 0 {
            errors.push(ValidationError {
                item_id: Some(item.item_id),
                field: "installments_total",
                message: "must be positive".to_string(),
            });
        }
        if let Some(current) = item.installments_current {
            if current == 0 || current > item.installments_total {
                errors.push(ValidationError {
                    item_id: Some(item.item_id),
                    field: "installments_current",
                    message: format!("{} outside 1..={}", current, item.installments_total),
                });
            }
        }
        if item.installments_total > 1 && item.amount <= Decimal::ZERO {
            errors.push(ValidationError {
                item_id: Some(item.item_id),
                field: "amount",
                message: "installment amount must be positive".to_string(),
            });
        }
        if item.amount.is_zero() {
            errors.push(ValidationError {
                item_id: Some(item.item_id),
                field: "amount",
                message: "must be nonzero".to_string(),
            });
        }
        if let Some(category_id) = item.category_id {
            if !category_in_household(conn, category_id, batch.household_id)? {
                errors.push(ValidationError {
                    item_id: Some(item.item_id),
                    field: "category",
                    message: format!("category {category_id} does not exist"),
                });
            }
        }
    }
    Ok(errors)
}

/// Confirm a reviewed batch: materialize purchase groups, installments and
/// ledger entries, without ever double-booking a physical purchase across
/// repeated imports of overlapping statement months.
///
/// All validation failures are reported before anything is written; the
/// writes run in one IMMEDIATE transaction, so a failure rolls back the whole
/// batch. Re-confirming a confirmed batch is a no-op.
pub fn confirm_batch(
    conn: &mut Connection,
    batch_id: i64,
    reviewed: &[ReviewedItem],
    selected: &HashSet<i64>,
) -> Result<ConfirmOutcome> {
    let batch = load_batch(conn, batch_id)?;
    if batch.status == BatchStatus::Confirmed {
        debug!(batch_id, "batch already confirmed, skipping");
        return Ok(ConfirmOutcome {
            already_confirmed: true,
            ..ConfirmOutcome::default()
        });
    }

    let card = load_card(conn, batch.card_id)?;
    let errors = validate_batch(conn, &batch, card.as_ref(), reviewed, selected)?;
    if !errors.is_empty() {
        return Err(EngineError::Validation(errors));
    }
    let card = card.expect("validated above");

    let closing_date =
        statement_window(batch.statement_year, batch.statement_month, card.closing_day).closing_date;

    let mut outcome = ConfirmOutcome::default();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    for item in reviewed {
        if !selected.contains(&item.item_id) || item.removed {
            continue;
        }

        if item.installments_total > 1 {
            let (total_amount, per_amount, _) =
                installment_values(item.amount, item.installments_total, None);
            let key = logical_key(
                &item.description,
                item.purchase_date,
                per_amount,
                item.installments_total,
            );

            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM purchase_groups WHERE card_id = ?1 AND logical_key = ?2",
                    rusqlite::params![batch.card_id, key],
                    |row| row.get(0),
                )
                .optional()?;
            let group_id = match existing {
                Some(id) => {
                    debug!(group_id = id, "purchase group matched by logical key");
                    id
                }
                None => {
                    let first_due = first_installment_due_date(item.purchase_date, card.closing_day);
                    tx.execute(
                        "INSERT INTO purchase_groups \
                         (household_id, card_id, description, logical_key, total_amount, \
                          installment_count, first_due_date, purchase_date, category_id) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                        rusqlite::params![
                            batch.household_id,
                            batch.card_id,
                            item.description,
                            key,
                            money_to_sql(total_amount),
                            item.installments_total,
                            date_to_sql(first_due),
                            date_to_sql(item.purchase_date),
                            item.category_id,
                        ],
                    )?;
                    let id = tx.last_insert_rowid();
                    outcome.groups_created += 1;
                    info!(group_id = id, description = %item.description, "purchase group created");
                    id
                }
            };

            let number = item.installments_current.unwrap_or(1);
            tx.execute(
                "INSERT INTO installments \
                 (household_id, group_id, number, due_date, statement_year, statement_month, amount) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
                 ON CONFLICT(group_id, number) DO NOTHING",
                rusqlite::params![
                    batch.household_id,
                    group_id,
                    number,
                    date_to_sql(closing_date),
                    batch.statement_year,
                    batch.statement_month,
                    money_to_sql(per_amount),
                ],
            )?;
            if tx.changes() == 1 {
                let entry_id = insert_ledger_entry(
                    &tx,
                    batch.household_id,
                    closing_date,
                    LedgerKind::Expense,
                    per_amount,
                    &format!("{} {}/{}", item.description, number, item.installments_total),
                    item.category_id,
                )?;
                tx.execute(
                    "UPDATE installments SET ledger_entry_id = ?1 WHERE group_id = ?2 AND number = ?3",
                    rusqlite::params![entry_id, group_id, number],
                )?;
                outcome.installments_created += 1;
                outcome.entries_created += 1;
                info!(group_id, number, "installment materialized");
            } else {
                outcome.skipped_existing += 1;
                debug!(group_id, number, "installment already materialized, skipped");
            }
        } else {
            insert_ledger_entry(
                &tx,
                batch.household_id,
                closing_date,
                LedgerKind::Expense,
                round_money(item.amount),
                &item.description,
                item.category_id,
            )?;
            outcome.entries_created += 1;
        }
    }

    tx.execute(
        "UPDATE import_batches SET status = ?1, confirmed_at = datetime('now') WHERE id = ?2",
        rusqlite::params![BatchStatus::Confirmed.as_str(), batch_id],
    )?;
    tx.commit()?;
    info!(
        batch_id,
        groups = outcome.groups_created,
        installments = outcome.installments_created,
        skipped = outcome.skipped_existing,
        "batch confirmed"
    );
    Ok(outcome)
}

pub(crate) fn insert_ledger_entry(
    conn: &Connection,
    household_id: i64,
    date: NaiveDate,
    kind: LedgerKind,
    amount: Decimal,
    description: &str,
    category_id: Option<i64>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO ledger_entries (household_id, date, kind, amount, description, category_id) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            household_id,
            date_to_sql(date),
            kind.as_str(),
            money_to_sql(amount),
            description,
            category_id,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn load_group(conn: &Connection, group_id: i64) -> Result<PurchaseGroup> {
    let row = conn
        .query_row(
            "SELECT id, household_id, card_id, description, logical_key, total_amount, \
                    installment_count, first_due_date, purchase_date, category_id \
             FROM purchase_groups WHERE id = ?1",
            [group_id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, u32>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, Option<String>>(8)?,
                    row.get::<_, Option<i64>>(9)?,
                ))
            },
        )
        .optional()?
        .ok_or(EngineError::NotFound("purchase group", group_id))?;
    Ok(PurchaseGroup {
        id: row.0,
        household_id: row.1,
        card_id: row.2,
        description: row.3,
        logical_key: row.4,
        total_amount: money_from_sql(&row.5)?,
        installment_count: row.6,
        first_due_date: date_from_sql(&row.7)?,
        purchase_date: opt_date_from_sql(row.8.as_deref())?,
        category_id: row.9,
    })
}

pub fn load_installments(conn: &Connection, group_id: i64) -> Result<Vec<Installment>> {
    let mut stmt = conn.prepare(
        "SELECT id, household_id, group_id, number, due_date, statement_year, statement_month, \
                amount, ledger_entry_id \
         FROM installments WHERE group_id = ?1 ORDER BY number",
    )?;
    let rows: Vec<(i64, i64, i64, u32, String, Option<i32>, Option<u32>, String, Option<i64>)> =
        stmt.query_map([group_id], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
                row.get(8)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut installments = Vec::with_capacity(rows.len());
    for row in rows {
        installments.push(Installment {
            id: row.0,
            household_id: row.1,
            group_id: row.2,
            number: row.3,
            due_date: date_from_sql(&row.4)?,
            statement_year: row.5,
            statement_month: row.6,
            amount: money_from_sql(&row.7)?,
            ledger_entry_id: row.8,
        });
    }
    Ok(installments)
}

/// Materialize a group's full installment schedule from its plan. A no-op
/// returning the existing rows when any installment is already present.
pub fn generate_installments_for_group(
    conn: &mut Connection,
    group_id: i64,
) -> Result<Vec<Installment>> {
    let group = load_group(conn, group_id)?;
    let existing = load_installments(conn, group_id)?;
    if !existing.is_empty() {
        return Ok(existing);
    }

    let schedule = plan(group.total_amount, group.installment_count, group.first_due_date)?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    for (idx, (amount, due)) in schedule.amounts.iter().zip(&schedule.due_dates).enumerate() {
        let number = idx as u32 + 1;
        let entry_id = insert_ledger_entry(
            &tx,
            group.household_id,
            *due,
            LedgerKind::Expense,
            *amount,
            &format!("{} {}/{}", group.description, number, group.installment_count),
            group.category_id,
        )?;
        tx.execute(
            "INSERT INTO installments \
             (household_id, group_id, number, due_date, statement_year, statement_month, amount, ledger_entry_id) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                group.household_id,
                group.id,
                number,
                date_to_sql(*due),
                due.year(),
                due.month(),
                money_to_sql(*amount),
                entry_id,
            ],
        )?;
    }
    tx.commit()?;
    info!(group_id, count = group.installment_count, "installment schedule generated");
    load_installments(conn, group_id)
}

/// Delete all installments due on/after `from_date` (with their ledger
/// entries), recompute the group's full plan and recreate only the missing
/// numbers. Past installments and their history are untouched. Returns the
/// recreated installments.
pub fn regenerate_future_installments(
    conn: &mut Connection,
    group_id: i64,
    from_date: NaiveDate,
) -> Result<Vec<Installment>> {
    let group = load_group(conn, group_id)?;
    let schedule = plan(group.total_amount, group.installment_count, group.first_due_date)?;

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let doomed: Vec<(i64, Option<i64>)> = {
        let mut stmt = tx.prepare(
            "SELECT id, ledger_entry_id FROM installments WHERE group_id = ?1 AND due_date >= ?2",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![group_id, date_to_sql(from_date)], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows
    };
    for (installment_id, entry_id) in &doomed {
        tx.execute("DELETE FROM installments WHERE id = ?1", [installment_id])?;
        if let Some(entry_id) = entry_id {
            tx.execute("DELETE FROM ledger_entries WHERE id = ?1", [entry_id])?;
        }
    }

    let mut recreated = Vec::new();
    for (idx, (amount, due)) in schedule.amounts.iter().zip(&schedule.due_dates).enumerate() {
        let number = idx as u32 + 1;
        tx.execute(
            "INSERT INTO installments \
             (household_id, group_id, number, due_date, statement_year, statement_month, amount) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
             ON CONFLICT(group_id, number) DO NOTHING",
            rusqlite::params![
                group.household_id,
                group.id,
                number,
                date_to_sql(*due),
                due.year(),
                due.month(),
                money_to_sql(*amount),
            ],
        )?;
        if tx.changes() == 1 {
            let entry_id = insert_ledger_entry(
                &tx,
                group.household_id,
                *due,
                LedgerKind::Expense,
                *amount,
                &format!("{} {}/{}", group.description, number, group.installment_count),
                group.category_id,
            )?;
            tx.execute(
                "UPDATE installments SET ledger_entry_id = ?1 WHERE group_id = ?2 AND number = ?3",
                rusqlite::params![entry_id, group.id, number],
            )?;
            recreated.push(number);
        }
    }
    tx.commit()?;
    info!(group_id, deleted = doomed.len(), recreated = recreated.len(), "future installments regenerated");

    let all = load_installments(conn, group_id)?;
    Ok(all.into_iter().filter(|i| recreated.contains(&i.number)).collect())
}
