//! Porter simulation driver
//!
//! Runs the canned scenarios against the utility routing policy and
//! prints the resulting delivery statistics.

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use porter_simulation::scenarios;
use porter_simulation::world::WorldStats;

#[derive(Parser)]
#[command(
    name = "porter-sim",
    about = "Store-carry-forward routing simulation",
    version
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Two nodes meet; the message goes straight to its recipient
    FirstContact,

    /// A message crosses a line of nodes that only meet pairwise
    RelayChain,

    /// Sources flood a small-buffered mule and eviction decides what survives
    BufferPressure {
        /// Seed for the message-size generator
        #[arg(short, long, default_value = "7")]
        seed: u64,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let stats = match cli.command {
        Commands::FirstContact => scenarios::first_contact()?,
        Commands::RelayChain => scenarios::relay_chain()?,
        Commands::BufferPressure { seed } => scenarios::buffer_pressure(seed)?,
    };

    print_stats(&stats);
    Ok(())
}

fn print_stats(stats: &WorldStats) {
    println!("created   {}", stats.created);
    println!("relayed   {}", stats.relayed);
    println!("dropped   {}", stats.dropped);
    println!("aborted   {}", stats.aborted);
    println!("expired   {}", stats.expired);
    println!("delivered {}", stats.delivered.len());
    for d in &stats.delivered {
        println!("  {} {} -> {} at t={:.0}s", d.message, d.origin, d.destination, d.at);
    }
}
