//! FOLIO Application Library
//!
//! This library provides the application modules and the server bootstrap
//! for FOLIO.

pub mod modules;
pub mod utils;

use anyhow::Context;
use folio_db::Db;
use folio_kernel::{settings::Settings, InitCtx, ModuleRegistry};

/// Run database migrations and serve the API until shutdown.
pub async fn run(settings: Settings) -> anyhow::Result<()> {
    let db = Db::connect(&settings.database.url, settings.database.max_connections)
        .await
        .context("failed to open database")?;

    let mut registry = ModuleRegistry::new();
    modules::register_all(&mut registry);

    db.migrate(&registry.collect_migrations())
        .await
        .context("failed to run migrations")?;

    let ctx = InitCtx {
        settings: &settings,
        db: &db,
    };

    registry.init_core_modules(&ctx).await?;
    registry.init_custom_modules(&ctx).await?;
    registry.start_core_modules(&ctx).await?;
    registry.start_custom_modules(&ctx).await?;

    folio_http::start_server(&registry, &settings, &db).await?;

    registry.stop_custom_modules().await?;
    registry.stop_core_modules().await?;

    Ok(())
}
