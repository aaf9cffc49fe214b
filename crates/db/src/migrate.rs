//! Module migration runner.

use anyhow::Context;
use catalog_kernel::Migration;
use time::OffsetDateTime;

use crate::Db;

const BOOKKEEPING_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS _migrations (
        module     TEXT NOT NULL,
        id         TEXT NOT NULL,
        applied_at TEXT NOT NULL,
        PRIMARY KEY (module, id)
    )
"#;

/// Apply every pending migration, each in its own transaction together with
/// its bookkeeping row. Returns how many migrations were applied.
pub async fn run(db: &Db, migrations: &[(String, Migration)]) -> anyhow::Result<usize> {
    sqlx::query(BOOKKEEPING_TABLE)
        .execute(db.pool())
        .await
        .context("failed to create migrations table")?;

    let mut applied = 0;

    for (module, migration) in migrations {
        let already_applied: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM _migrations WHERE module = ? AND id = ?")
                .bind(module)
                .bind(migration.id)
                .fetch_optional(db.pool())
                .await
                .context("failed to read migrations table")?;

        if already_applied.is_some() {
            tracing::debug!(target: "catalog-db", module = %module, migration = migration.id, "migration already applied");
            continue;
        }

        let mut tx = db.pool().begin().await?;

        sqlx::raw_sql(migration.up)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("migration {}/{} failed", module, migration.id))?;

        sqlx::query("INSERT INTO _migrations (module, id, applied_at) VALUES (?, ?, ?)")
            .bind(module)
            .bind(migration.id)
            .bind(OffsetDateTime::now_utc())
            .execute(&mut *tx)
            .await
            .context("failed to record migration")?;

        tx.commit().await?;

        tracing::info!(target: "catalog-db", module = %module, migration = migration.id, "migration applied");
        applied += 1;
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn migrations() -> Vec<(String, Migration)> {
        vec![
            (
                "shelf".to_string(),
                Migration {
                    id: "001_init",
                    up: "CREATE TABLE shelf (id INTEGER PRIMARY KEY, label TEXT NOT NULL);
                         CREATE INDEX shelf_label ON shelf (label);",
                },
            ),
            (
                "shelf".to_string(),
                Migration {
                    id: "002_seed",
                    up: "INSERT INTO shelf (label) VALUES ('fiction');",
                },
            ),
        ]
    }

    #[tokio::test]
    async fn applies_pending_migrations_once() {
        let db = Db::in_memory().await.unwrap();

        assert_eq!(run(&db, &migrations()).await.unwrap(), 2);
        assert_eq!(run(&db, &migrations()).await.unwrap(), 0);

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM shelf")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn failed_migration_leaves_no_record() {
        let db = Db::in_memory().await.unwrap();
        let broken = vec![(
            "shelf".to_string(),
            Migration {
                id: "001_broken",
                up: "CREATE TABLE oops (;",
            },
        )];

        assert!(run(&db, &broken).await.is_err());

        let recorded: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _migrations")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(recorded, 0);
    }
}
