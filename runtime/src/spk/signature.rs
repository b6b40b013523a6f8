//! Package signatures.
//!
//! The `signature` field of a `Signature` message holds the Ed25519
//! signature of the archive's BLAKE2b-512 digest, followed by the digest
//! itself.

use blake2::{Blake2b512, Digest};
use capnp::{message, serialize};
use docker_spk_core::error::{Result, SpkError};
use ring::signature::{Ed25519KeyPair, UnparsedPublicKey, ED25519};

use super::keyring::{AppKey, PUBLIC_KEY_LEN};
use super::{message_bytes, reader_options};
use crate::package_capnp::signature;

/// Length of an Ed25519 signature.
pub const SIGNATURE_LEN: usize = 64;
/// Length of the archive digest that follows it.
pub const DIGEST_LEN: usize = 64;

/// Produces the signature message for an encoded archive.
pub trait Signer {
    fn sign(&self, archive: &[u8]) -> Result<Vec<u8>>;
}

/// Signs with one Ed25519 key.
pub struct Ed25519Signer {
    public_key: [u8; PUBLIC_KEY_LEN],
    pair: Ed25519KeyPair,
}

impl Ed25519Signer {
    pub fn new(key: &AppKey) -> Result<Self> {
        Ok(Self {
            public_key: *key.public_key(),
            pair: key.key_pair()?,
        })
    }
}

impl Signer for Ed25519Signer {
    fn sign(&self, archive: &[u8]) -> Result<Vec<u8>> {
        let digest = Blake2b512::digest(archive);
        let signature = self.pair.sign(&digest);

        let mut signed = Vec::with_capacity(SIGNATURE_LEN + DIGEST_LEN);
        signed.extend_from_slice(signature.as_ref());
        signed.extend_from_slice(&digest);
        if signed.len() != SIGNATURE_LEN + DIGEST_LEN {
            return Err(SpkError::SigningError(format!(
                "unexpected signature length {}",
                signed.len()
            )));
        }

        tracing::debug!(digest = %hex::encode(&digest[..8]), "Signed archive");
        signature_message(&self.public_key, &signed)
    }
}

/// Encode a `Signature` message.
pub fn signature_message(public_key: &[u8], signed: &[u8]) -> Result<Vec<u8>> {
    let mut message = message::Builder::new_default();
    let mut root = message.init_root::<signature::Builder<'_>>();
    root.set_public_key(public_key);
    root.set_signature(signed);
    message_bytes(&message)
}

/// Check a signature message against the archive it covers.
///
/// Returns the signer's public key.
pub fn verify_signature(mut bytes: &[u8], archive: &[u8]) -> Result<[u8; PUBLIC_KEY_LEN]> {
    let options = reader_options(bytes.len());
    let message = serialize::read_message(&mut bytes, options)?;
    let root = message.get_root::<signature::Reader<'_>>()?;
    let public_key = <[u8; PUBLIC_KEY_LEN]>::try_from(root.get_public_key()?).map_err(|_| {
        SpkError::SigningError("signature has a malformed public key".to_string())
    })?;
    let signed = root.get_signature()?;
    if signed.len() != SIGNATURE_LEN + DIGEST_LEN {
        return Err(SpkError::SigningError(format!(
            "signature has {} bytes, expected {}",
            signed.len(),
            SIGNATURE_LEN + DIGEST_LEN
        )));
    }
    let (sig, claimed) = signed.split_at(SIGNATURE_LEN);

    let digest = Blake2b512::digest(archive);
    if claimed != digest.as_slice() {
        return Err(SpkError::SigningError(
            "archive digest does not match signature".to_string(),
        ));
    }
    UnparsedPublicKey::new(&ED25519, public_key)
        .verify(&digest, sig)
        .map_err(|_| SpkError::SigningError("signature verification failed".to_string()))?;
    Ok(public_key)
}
