//! CLI command definitions and dispatch.

mod inspect;
mod keygen;
mod pack;

use clap::{Parser, Subcommand};

/// docker-spk - Pack Docker images as Sandstorm packages.
#[derive(Parser)]
#[command(name = "docker-spk", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Convert a `docker save` archive into a signed .spk
    Pack(pack::PackArgs),
    /// Generate a new app key and add it to the keyring
    Keygen(keygen::KeygenArgs),
    /// Verify a package and list its files
    Inspect(inspect::InspectArgs),
}

/// Dispatch a CLI command to its handler.
pub fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Pack(args) => pack::execute(args),
        Command::Keygen(args) => keygen::execute(args),
        Command::Inspect(args) => inspect::execute(args),
    }
}
