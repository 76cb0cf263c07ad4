use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;

use parcela::db::get_connection;
use parcela::recurring::{generate_instances, load_active_rules};

pub fn run(db: &str, months_ahead: u32) -> Result<()> {
    let conn = get_connection(Path::new(db)).with_context(|| format!("opening {db}"))?;
    let today = Local::now().date_naive();

    let rules = load_active_rules(&conn)?;
    let mut created = 0usize;
    for rule in &rules {
        created += generate_instances(&conn, rule, months_ahead, today)?.len();
    }
    println!(
        "{} active rule(s), {} instance(s) created through the next {} month(s).",
        rules.len(),
        created,
        months_ahead
    );
    Ok(())
}
