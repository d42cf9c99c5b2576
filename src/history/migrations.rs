//! Versioned schema migrations for the history database.
//!
//! The schema version lives in SQLite's `user_version` pragma. Each migration
//! step is a batch of SQL shipped with the binary; all pending steps run in a
//! single transaction so a failed upgrade leaves the database untouched.

use log::info;
use rusqlite::{Connection, Transaction};

use super::record::StoreError;

pub const CURRENT_SCHEMA_VERSION: i32 = 1;

pub fn run_migrations(conn: &mut Connection) -> Result<(), StoreError> {
    let mut version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if version > CURRENT_SCHEMA_VERSION {
        return Err(StoreError::UnsupportedSchema {
            found: version,
            supported: CURRENT_SCHEMA_VERSION,
        });
    }
    if version == CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    info!(
        "Migrating history database from schema v{version} to v{CURRENT_SCHEMA_VERSION}"
    );

    let tx = conn.transaction()?;
    while version < CURRENT_SCHEMA_VERSION {
        let next_version = version + 1;
        apply_migration(&tx, next_version)?;
        version = next_version;
    }
    tx.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)?;
    tx.commit()?;

    Ok(())
}

fn apply_migration(tx: &Transaction<'_>, version: i32) -> Result<(), StoreError> {
    match version {
        1 => {
            tx.execute_batch(include_str!("schemas/schema_v1.sql"))?;
            Ok(())
        }
        other => Err(StoreError::Corrupt(format!(
            "no migration step produces schema version {other}"
        ))),
    }
}
