use anyhow::{bail, Context, Result};
use rusqlite::{Connection, Transaction};

/// Schema scripts in order; entry `n` moves `user_version` from `n` to `n + 1`.
const MIGRATIONS: &[&str] = &[include_str!("schemas/schema_v1.sql")];

const CURRENT_SCHEMA_VERSION: i32 = MIGRATIONS.len() as i32;

/// Brings the kv schema up to date in one transaction.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let found: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("could not read schema version")?;

    match found {
        v if v > CURRENT_SCHEMA_VERSION => bail!(
            "kv store schema v{v} was written by a newer build (this one knows v{CURRENT_SCHEMA_VERSION})"
        ),
        v if v == CURRENT_SCHEMA_VERSION => return Ok(()),
        _ => {}
    }

    let tx = conn.transaction().context("could not begin schema upgrade")?;
    for (index, script) in MIGRATIONS.iter().enumerate().skip(found.max(0) as usize) {
        apply_script(&tx, script).with_context(|| format!("schema upgrade to v{} failed", index + 1))?;
    }
    tx.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)
        .context("could not record schema version")?;
    tx.commit().context("could not commit schema upgrade")
}

fn apply_script(tx: &Transaction<'_>, script: &str) -> Result<()> {
    tx.execute_batch(script)?;
    Ok(())
}
