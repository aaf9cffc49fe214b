use anyhow::Context;
use catalog_kernel::settings::Settings;
use clap::{Parser, Subcommand};

/// Book catalog service
#[derive(Debug, Parser)]
#[command(name = "catalog", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Apply pending migrations and exit
    Migrate,
    /// Probe the database until it answers or the retry budget runs out
    CheckDb,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load().with_context(|| "failed to load catalog settings")?;
    catalog_telemetry::init(&settings.telemetry)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => catalog_app::bootstrap::serve(settings).await,
        Command::Migrate => {
            let applied = catalog_app::bootstrap::migrate_only(&settings).await?;
            tracing::info!(applied, "migrations applied");
            Ok(())
        }
        Command::CheckDb => {
            let db = catalog_db::wait_for_ready(&settings.database).await?;
            db.close().await;
            tracing::info!(db = %settings.database.url, "database is reachable");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::parse_from(["catalog"]);
        assert!(cli.command.is_none());

        let cli = Cli::parse_from(["catalog", "check-db"]);
        assert!(matches!(cli.command, Some(Command::CheckDb)));
    }
}
