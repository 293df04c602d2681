mod config;
mod http;
mod telemetry;

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use api::{
    assistant::{Assistant, GeminiAssistant},
    schema::{build_schema, AppSchema},
    seed::seed,
};
use clap::{Parser, Subcommand, ValueEnum};
use dotenvy::dotenv;
use migration::{Migrator, MigratorTrait};
use sea_orm::Database;
use tracing::info;

use crate::{config::AppConfig, http::AppState};

#[derive(Parser, Debug)]
#[command(name = "talentoplus", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Run HTTP server
    Serve {
        #[arg(long, env = "BIND", default_value = "127.0.0.1:8080")]
        bind: String,
    },
    /// Run migrations
    Migrate {
        #[arg(value_enum, default_value = "up")]
        action: MigrateAction,
    },
    /// Seed the admin user and default lookups
    Seed,
    /// Print GraphQL SDL
    PrintSchema,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum MigrateAction {
    Up,
    Down,
    Reset,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    telemetry::init_tracing()?;

    let cli = Cli::parse();
    let config = AppConfig::load()?;
    let auth = Arc::new(config.auth());
    let assistant: Arc<dyn Assistant> = Arc::new(GeminiAssistant::new(config.assistant())?);

    if let Cmd::PrintSchema = cli.cmd {
        let db = Arc::new(sea_orm::DatabaseConnection::Disconnected);
        let AppSchema(schema) = build_schema(db, auth, assistant);
        println!("{}", schema.sdl());
        return Ok(());
    }

    let db = Arc::new(
        Database::connect(&config.database_url)
            .await
            .context("failed to connect to the database")?,
    );

    match cli.cmd {
        Cmd::Migrate { action } => {
            match action {
                MigrateAction::Up => Migrator::up(db.as_ref(), None).await?,
                MigrateAction::Down => Migrator::down(db.as_ref(), None).await?,
                MigrateAction::Reset => Migrator::reset(db.as_ref()).await?,
            }
            info!(?action, "migrations applied");
            Ok(())
        }
        Cmd::Seed => {
            seed(db.as_ref(), &config.seed()).await?;
            Ok(())
        }
        Cmd::Serve { bind } => {
            Migrator::up(db.as_ref(), None).await?;
            seed(db.as_ref(), &config.seed()).await?;
            let AppSchema(schema) = build_schema(db.clone(), auth.clone(), assistant);
            let state = AppState {
                schema,
                db,
                auth,
                import_max_bytes: config.import_max_bytes,
            };
            let addr: SocketAddr = bind.parse().with_context(|| format!("invalid BIND {}", bind))?;
            http::serve(addr, state, &config.cors_allowed_origins).await
        }
        Cmd::PrintSchema => Ok(()),
    }
}
