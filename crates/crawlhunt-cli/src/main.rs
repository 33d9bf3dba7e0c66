use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "crawlhunt-cli", version, about = "Crawlhunt CLI")]
struct Cli {
    /// Log filter used when RUST_LOG is unset (e.g. "info", "crawlhunt_core=debug")
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Great-circle distance between two coordinates, in meters
    Distance(commands::distance::DistanceArgs),
    /// Replay a platform event script against fake platform services
    Simulate(commands::simulate::SimulateArgs),
}

fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Config { action } => commands::config::run(action),
        Commands::Distance(args) => commands::distance::run(args),
        Commands::Simulate(args) => commands::simulate::run(args),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
