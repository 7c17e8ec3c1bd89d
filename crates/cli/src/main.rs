use clap::{Parser, Subcommand};

mod commands;

use commands::{RelayArgs, SeedArgs};

#[derive(Parser)]
#[command(name = "market-relay")]
#[command(about = "Relays exchange market data through the broker into storage", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true, default_value = "config/Config.toml")]
    config: String,

    /// Postgres URL, overrides `database.url` from the config file
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply database migrations
    Migrate,
    /// Insert the default exchange, symbol and signal interval
    Seed(SeedArgs),
    /// Relay exchange streams onto the broker
    Stream(RelayArgs),
    /// Run every consumer group
    Consume(RelayArgs),
    /// Stream and consume in one process until interrupted
    Run(RelayArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = commands::load_config(&cli.config, cli.database_url)?;

    match cli.command {
        Commands::Migrate => commands::run_migrate(&config).await,
        Commands::Seed(args) => commands::run_seed(&config, args).await,
        Commands::Stream(args) => commands::run_stream(config, args).await,
        Commands::Consume(args) => commands::run_consume(config, args).await,
        Commands::Run(args) => commands::run_all(config, args).await,
    }
}
