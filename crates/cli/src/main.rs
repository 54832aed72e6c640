use anyhow::Context;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "folio", about = "FOLIO administration commands", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run migrations and serve the API
    Serve,
    /// Apply pending migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings =
        folio_kernel::settings::Settings::load().with_context(|| "failed to load FOLIO settings")?;

    folio_telemetry::init(&settings.telemetry);

    match cli.command {
        Command::Serve => folio_app::run(settings).await,
        Command::Migrate => {
            let db =
                folio_db::Db::connect(&settings.database.url, settings.database.max_connections)
                    .await?;

            let mut registry = folio_kernel::ModuleRegistry::new();
            folio_app::modules::register_all(&mut registry);

            db.migrate(&registry.collect_migrations()).await?;
            tracing::info!("migrations applied");
            Ok(())
        }
    }
}
