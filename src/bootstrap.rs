//! Process lifecycle: store → modules → migrations → server → teardown.

use anyhow::Context;
use catalog_db::Db;
use catalog_kernel::{settings::Settings, InitCtx, ModuleRegistry};

use crate::modules;

/// Registry with every project module bound to `db`.
pub fn build_registry(db: &Db) -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    modules::register_all(&mut registry, db);
    registry
}

/// Apply all pending module migrations.
pub async fn migrate(db: &Db, registry: &ModuleRegistry) -> anyhow::Result<usize> {
    catalog_db::migrate::run(db, &registry.collect_migrations())
        .await
        .context("failed to apply migrations")
}

/// Wait for the store, bring the modules up and serve until a shutdown
/// signal arrives. The pool is closed on the way out, even after errors.
pub async fn serve(settings: Settings) -> anyhow::Result<()> {
    let db = catalog_db::wait_for_ready(&settings.database).await?;

    let result = run_server(&db, &settings).await;
    db.close().await;
    result
}

async fn run_server(db: &Db, settings: &Settings) -> anyhow::Result<()> {
    let registry = build_registry(db);
    let ctx = InitCtx { settings };

    registry.init_all(&ctx).await?;
    let applied = migrate(db, &registry).await?;
    tracing::info!(applied, "migrations complete");
    registry.start_all(&ctx).await?;

    let served = catalog_http::start_server(&registry, settings, catalog_http::shutdown_signal()).await;
    registry.stop_all().await?;
    served
}

/// Apply migrations against the configured store and exit.
pub async fn migrate_only(settings: &Settings) -> anyhow::Result<usize> {
    let db = catalog_db::wait_for_ready(&settings.database).await?;
    let registry = build_registry(&db);

    let result = migrate(&db, &registry).await;
    db.close().await;
    result
}
