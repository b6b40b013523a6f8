//! Sandstorm keyring and app ids.
//!
//! The keyring file is a plain concatenation of `KeyFile` messages.

use capnp::{message, serialize};
use data_encoding::{Encoding, Specification};
use docker_spk_core::error::{Result, SpkError};
use ring::rand::{SecureRandom, SystemRandom};
use ring::signature::{Ed25519KeyPair, KeyPair};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use super::{message_bytes, reader_options, take_message};
use crate::package_capnp::key_file;

pub const PUBLIC_KEY_LEN: usize = 32;
pub const PRIVATE_KEY_LEN: usize = 64;
const SEED_LEN: usize = 32;

/// Alphabet Sandstorm uses for app ids.
const APP_ID_SYMBOLS: &str = "0123456789acdefghjkmnpqrstuvwxyz";

fn app_id_encoding() -> Result<Encoding> {
    let mut spec = Specification::new();
    spec.symbols.push_str(APP_ID_SYMBOLS);
    spec.encoding()
        .map_err(|e| SpkError::Other(format!("Invalid app id alphabet: {}", e)))
}

/// Encode a public key as an app id.
pub fn encode_app_id(public_key: &[u8; PUBLIC_KEY_LEN]) -> Result<String> {
    Ok(app_id_encoding()?.encode(public_key))
}

/// Decode an app id into the public key it names.
pub fn decode_app_id(app_id: &str) -> Result<[u8; PUBLIC_KEY_LEN]> {
    let bytes = app_id_encoding()?
        .decode(app_id.trim().as_bytes())
        .map_err(|e| SpkError::ConfigError(format!("Invalid app id {:?}: {}", app_id, e)))?;
    <[u8; PUBLIC_KEY_LEN]>::try_from(bytes.as_slice()).map_err(|_| {
        SpkError::ConfigError(format!(
            "Invalid app id {:?}: expected {} key bytes, got {}",
            app_id,
            PUBLIC_KEY_LEN,
            bytes.len()
        ))
    })
}

/// One Ed25519 key pair as stored in the keyring.
#[derive(Clone, PartialEq, Eq)]
pub struct AppKey {
    public_key: [u8; PUBLIC_KEY_LEN],
    private_key: [u8; PRIVATE_KEY_LEN],
}

impl std::fmt::Debug for AppKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppKey")
            .field("public_key", &hex::encode(self.public_key))
            .finish_non_exhaustive()
    }
}

impl AppKey {
    /// Derive a key pair from a 32-byte seed.
    pub fn from_seed(seed: &[u8; SEED_LEN]) -> Result<Self> {
        let pair = Ed25519KeyPair::from_seed_unchecked(seed)
            .map_err(|e| SpkError::KeyringError(format!("Invalid key seed: {}", e)))?;
        let mut public_key = [0u8; PUBLIC_KEY_LEN];
        public_key.copy_from_slice(pair.public_key().as_ref());
        let mut private_key = [0u8; PRIVATE_KEY_LEN];
        private_key[..SEED_LEN].copy_from_slice(seed);
        private_key[SEED_LEN..].copy_from_slice(&public_key);
        Ok(Self {
            public_key,
            private_key,
        })
    }

    /// Generate a fresh key pair.
    pub fn generate() -> Result<Self> {
        let mut seed = [0u8; SEED_LEN];
        SystemRandom::new()
            .fill(&mut seed)
            .map_err(|_| SpkError::KeyringError("Failed to generate key seed".to_string()))?;
        Self::from_seed(&seed)
    }

    pub fn public_key(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.public_key
    }

    pub fn app_id(&self) -> Result<String> {
        encode_app_id(&self.public_key)
    }

    /// Ring key pair, checked against the stored public key.
    pub fn key_pair(&self) -> Result<Ed25519KeyPair> {
        Ed25519KeyPair::from_seed_and_public_key(
            &self.private_key[..SEED_LEN],
            &self.public_key,
        )
        .map_err(|e| SpkError::KeyringError(format!("Corrupt key pair: {}", e)))
    }

    /// Encode as a `KeyFile` message.
    pub fn to_message(&self) -> Result<Vec<u8>> {
        let mut message = message::Builder::new_default();
        let mut root = message.init_root::<key_file::Builder<'_>>();
        root.set_public_key(&self.public_key);
        root.set_private_key(&self.private_key);
        message_bytes(&message)
    }

    fn from_message(mut bytes: &[u8]) -> Result<Self> {
        let options = reader_options(bytes.len());
        let message = serialize::read_message(&mut bytes, options)?;
        let root = message.get_root::<key_file::Reader<'_>>()?;
        let public = root.get_public_key()?;
        let private = root.get_private_key()?;
        let public_key = <[u8; PUBLIC_KEY_LEN]>::try_from(public).map_err(|_| {
            SpkError::KeyringError(format!("public key has {} bytes", public.len()))
        })?;
        let private_key = <[u8; PRIVATE_KEY_LEN]>::try_from(private).map_err(|_| {
            SpkError::KeyringError(format!("private key has {} bytes", private.len()))
        })?;
        Ok(Self {
            public_key,
            private_key,
        })
    }
}

/// Source of signing keys.
pub trait KeyStore {
    /// Key whose public half is named by `app_id`.
    fn lookup(&self, app_id: &str) -> Result<&AppKey>;
}

/// Keys read from a Sandstorm keyring file.
#[derive(Debug, Default)]
pub struct Keyring {
    keys: Vec<AppKey>,
}

impl Keyring {
    /// Read the keyring at `path`. A missing file is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            SpkError::KeyringError(format!("Failed to read keyring {}: {}", path.display(), e))
        })?;
        let keyring = Self::parse(&bytes)?;
        tracing::debug!(path = %path.display(), keys = keyring.len(), "Loaded keyring");
        Ok(keyring)
    }

    /// Like [`Keyring::load`] but a missing file yields an empty keyring.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse concatenated `KeyFile` messages.
    pub fn parse(mut bytes: &[u8]) -> Result<Self> {
        let mut keys = Vec::new();
        while !bytes.is_empty() {
            let message = take_message(&mut bytes)
                .map_err(|e| SpkError::KeyringError(format!("Malformed keyring: {}", e)))?;
            keys.push(AppKey::from_message(message).map_err(|e| match e {
                SpkError::KeyringError(_) => e,
                other => SpkError::KeyringError(format!("Malformed keyring: {}", other)),
            })?);
        }
        Ok(Self { keys })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Generate a key, append it to the file at `path` and to this keyring.
    pub fn generate_key(&mut self, path: impl AsRef<Path>) -> Result<&AppKey> {
        let path = path.as_ref();
        let key = AppKey::generate()?;
        let message = key.to_message()?;

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(&message)?;
        file.flush()?;

        tracing::info!(path = %path.display(), app_id = %key.app_id()?, "Generated new key");
        self.keys.push(key);
        Ok(&self.keys[self.keys.len() - 1])
    }
}

impl KeyStore for Keyring {
    fn lookup(&self, app_id: &str) -> Result<&AppKey> {
        let public_key = decode_app_id(app_id)?;
        self.keys
            .iter()
            .find(|key| key.public_key == public_key)
            .ok_or_else(|| SpkError::KeyNotFound {
                app_id: app_id.trim().to_string(),
            })
    }
}
