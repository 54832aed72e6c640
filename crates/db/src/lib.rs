//! SQLite client factory and migration tooling for FOLIO.

use std::str::FromStr;

use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

/// A single DDL migration contributed by a module.
///
/// Migrations are identified by `(module, id)` and applied exactly once,
/// in the order the registry collects them.
#[derive(Debug, Clone)]
pub struct Migration {
    pub id: &'static str,
    pub up: &'static str,
}

/// Shared handle to the application database pool.
#[derive(Debug, Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    /// Connect to the database at `url` (e.g. `sqlite://folio.db` or
    /// `sqlite::memory:`), creating the file when missing.
    pub async fn connect(url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("invalid database url '{url}'"))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to connect to database '{url}'"))?;

        tracing::info!(target: "folio-db", %url, "database pool established");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Apply every not-yet-applied migration, recording each in
    /// `schema_migrations`.
    pub async fn migrate(&self, migrations: &[(String, Migration)]) -> anyhow::Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                module TEXT NOT NULL,
                id TEXT NOT NULL,
                applied_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (module, id)
            )",
        )
        .execute(&self.pool)
        .await
        .context("failed to create schema_migrations table")?;

        for (module, migration) in migrations {
            let applied: Option<(String,)> = sqlx::query_as(
                "SELECT id FROM schema_migrations WHERE module = ?1 AND id = ?2",
            )
            .bind(module)
            .bind(migration.id)
            .fetch_optional(&self.pool)
            .await
            .context("failed to query schema_migrations")?;

            if applied.is_some() {
                continue;
            }

            tracing::info!(target: "folio-db", module, id = migration.id, "applying migration");

            sqlx::raw_sql(migration.up)
                .execute(&self.pool)
                .await
                .with_context(|| format!("migration {module}/{} failed", migration.id))?;

            sqlx::query("INSERT INTO schema_migrations (module, id) VALUES (?1, ?2)")
                .bind(module)
                .bind(migration.id)
                .execute(&self.pool)
                .await
                .context("failed to record applied migration")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrations_apply_once() {
        let db = Db::connect("sqlite::memory:", 1).await.unwrap();

        let migrations = vec![(
            "test".to_string(),
            Migration {
                id: "001_init",
                up: "CREATE TABLE widget (id INTEGER PRIMARY KEY, name TEXT NOT NULL);",
            },
        )];

        db.migrate(&migrations).await.unwrap();
        // A second pass must skip the already-applied migration instead of
        // failing on the existing table.
        db.migrate(&migrations).await.unwrap();

        sqlx::query("INSERT INTO widget (name) VALUES ('a')")
            .execute(db.pool())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn foreign_keys_are_enforced() {
        let db = Db::connect("sqlite::memory:", 1).await.unwrap();

        sqlx::raw_sql(
            "CREATE TABLE parent (id INTEGER PRIMARY KEY);
             CREATE TABLE child (
                 id INTEGER PRIMARY KEY,
                 parent_id INTEGER NOT NULL REFERENCES parent(id)
             );",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let result = sqlx::query("INSERT INTO child (parent_id) VALUES (42)")
            .execute(db.pool())
            .await;
        assert!(result.is_err());
    }
}
