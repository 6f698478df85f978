use anyhow::Context;
use clap::Parser;
use palette_mail::api::{self, AppState};
use palette_mail::config::Config;
use palette_mail::delivery::SmtpTransport;
use sqlx::sqlite::SqlitePoolOptions;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "palette-mail")]
#[command(about = "Template-driven email sending service", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 127.0.0.1:3000)
    #[arg(short, long)]
    listen: Option<String>,
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("{},tower_http=info", config.logging.level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().pretty()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config =
        Config::load(Some(cli.config.as_path())).context("Failed to load configuration")?;
    if let Some(listen) = cli.listen {
        config.server.listen_addr = listen;
    }

    init_logging(&config);
    info!("Starting palette-mail v{}", env!("CARGO_PKG_VERSION"));
    info!("  Listening on: {}", config.server.listen_addr);
    info!("  Database: {}", config.database.url);
    info!("  Environment: {:?}", config.auth.environment);

    let db = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&config.database.url)
        .await
        .context("Failed to open database")?;

    let transport = Arc::new(SmtpTransport::new(&config.smtp)?);
    let state = AppState::build(&config, db, transport)
        .await
        .context("Failed to initialize application state")?;

    let revoked = state.sessions.load_revoked().await?;
    info!("Loaded {} revoked sessions", revoked);

    api::serve(state, &config.server.listen_addr).await?;
    Ok(())
}
