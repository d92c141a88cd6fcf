use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "unveil-cli", version, about = "Unveil CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive the reveal protocol against the local store
    Reveal {
        #[command(subcommand)]
        action: commands::reveal::RevealAction,
    },
    /// Compute a readiness score breakdown from a features snapshot
    Score(commands::score::ScoreArgs),
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Reveal { action } => commands::reveal::run(action),
        Commands::Score(args) => commands::score::run(args),
        Commands::Config { action } => commands::config::run(action),
    }
}
