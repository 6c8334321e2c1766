//! SQLite schema migrations for the disposable projection database.

use super::schema;
use rusqlite::{Connection, types::Type};

/// Latest schema version understood by this build.
pub const LATEST_SCHEMA_VERSION: u32 = 1;

const MIGRATIONS: &[(u32, &str)] = &[(1, schema::MIGRATION_V1_SQL)];

/// Read `PRAGMA user_version` and convert it to a Rust `u32`.
///
/// # Errors
///
/// Returns an error if querying SQLite fails or the version value cannot
/// be represented as `u32`.
pub fn current_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    u32::try_from(version).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(0, Type::Integer, Box::new(error))
    })
}

/// Apply all pending migrations in ascending order.
///
/// Migrations are idempotent: each runs only when its version exceeds
/// `user_version`, and the SQL itself uses `IF NOT EXISTS` for DDL safety.
///
/// # Errors
///
/// Returns an error if any migration fails.
pub fn migrate(conn: &mut Connection) -> rusqlite::Result<u32> {
    let mut current = current_schema_version(conn)?;

    for (version, sql) in MIGRATIONS {
        if *version <= current {
            continue;
        }

        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", i64::from(*version))?;
        tx.execute(
            "UPDATE projection_meta SET schema_version = ?1 WHERE id = 1",
            [i64::from(*version)],
        )?;
        tx.commit()?;
        current = *version;
    }

    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::{LATEST_SCHEMA_VERSION, current_schema_version, migrate};
    use crate::db::schema;
    use rusqlite::{Connection, params};

    fn sqlite_object_exists(
        conn: &Connection,
        object_type: &str,
        object_name: &str,
    ) -> rusqlite::Result<bool> {
        conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = ?1 AND name = ?2
            )",
            params![object_type, object_name],
            |row| row.get(0),
        )
    }

    #[test]
    fn migrate_empty_db_to_latest() -> rusqlite::Result<()> {
        let mut conn = Connection::open_in_memory()?;

        let applied = migrate(&mut conn)?;
        assert_eq!(applied, LATEST_SCHEMA_VERSION);
        assert_eq!(current_schema_version(&conn)?, LATEST_SCHEMA_VERSION);

        assert!(sqlite_object_exists(&conn, "table", "items")?);
        assert!(sqlite_object_exists(&conn, "table", "item_dependencies")?);
        assert!(sqlite_object_exists(&conn, "table", "projection_meta")?);

        for index in schema::REQUIRED_INDEXES {
            assert!(
                sqlite_object_exists(&conn, "index", index)?,
                "missing expected index {index}"
            );
        }

        Ok(())
    }

    #[test]
    fn migrate_is_idempotent() -> rusqlite::Result<()> {
        let mut conn = Connection::open_in_memory()?;

        assert_eq!(migrate(&mut conn)?, LATEST_SCHEMA_VERSION);
        assert_eq!(migrate(&mut conn)?, LATEST_SCHEMA_VERSION);

        let meta_rows: i64 =
            conn.query_row("SELECT COUNT(*) FROM projection_meta", [], |row| row.get(0))?;
        assert_eq!(meta_rows, 1);

        Ok(())
    }
}
