use std::path::Path;

use anyhow::{Context, Result};

use parcela::db::{bootstrap_household, get_connection, init_db};

pub fn run(db: &str, household: &str) -> Result<()> {
    let path = Path::new(db);
    let conn = get_connection(path).with_context(|| format!("opening {db}"))?;
    init_db(&conn)?;
    let household_id = bootstrap_household(&conn, household)?;

    println!("Database:   {}", path.display());
    println!("Household:  {household} (id {household_id})");
    println!("Schema ready.");
    Ok(())
}
