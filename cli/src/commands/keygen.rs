//! `docker-spk keygen` command - Add a new app key to the keyring.

use clap::Args;
use docker_spk_runtime::spk::Keyring;
use std::path::PathBuf;

#[derive(Args)]
pub struct KeygenArgs {
    /// Sandstorm keyring (default: ~/.sandstorm-keyring)
    #[arg(long)]
    pub keyring: Option<PathBuf>,
}

pub fn execute(args: KeygenArgs) -> Result<(), Box<dyn std::error::Error>> {
    let path = args
        .keyring
        .unwrap_or_else(docker_spk_core::default_keyring_path);

    let mut keyring = Keyring::load_or_default(&path)?;
    tracing::debug!(path = %path.display(), existing = keyring.len(), "Adding key");
    let key = keyring.generate_key(&path)?;
    println!("{}", key.app_id()?);
    Ok(())
}
