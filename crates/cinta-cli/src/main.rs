//! Cinta CLI - soundfile inspection, conversion, playback, and recording.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "cinta")]
#[command(author, version, about = "Cinta soundfile toolkit", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display soundfile header information
    Info(commands::info::InfoArgs),

    /// List the registered soundfile formats
    Types(commands::types::TypesArgs),

    /// Convert a soundfile to another format
    Convert(commands::convert::ConvertArgs),

    /// Stream a soundfile to the default audio output
    Play(commands::play::PlayArgs),

    /// Record the default audio input to a soundfile
    Record(commands::record::RecordArgs),
}

fn main() -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Info(args) => commands::info::run(args),
        Commands::Types(args) => commands::types::run(args),
        Commands::Convert(args) => commands::convert::run(args),
        Commands::Play(args) => commands::play::run(args),
        Commands::Record(args) => commands::record::run(args),
    }
}
