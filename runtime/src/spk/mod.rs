//! Sandstorm package output.
//!
//! Turns a merged tree into a signed `.spk`:
//!
//! ```text
//! BuiltTree ──► ArchiveEncoder ──► archive bytes ──┬──► write_package ──► .spk
//!                                                  │        ▲
//!                     Keyring ──► Ed25519Signer ───┴──► signature
//! ```
//!
//! Every message is defined in `package.capnp` and serialized in the
//! standard stream framing.

mod archive;
mod keyring;
mod package;
mod signature;

use capnp::message::{self, HeapAllocator, ReaderOptions};
use capnp::serialize;
use docker_spk_core::error::Result;

pub use archive::{decode_archive, ArchiveEncoder, TreeSink};
pub use keyring::{
    decode_app_id, encode_app_id, AppKey, KeyStore, Keyring, PRIVATE_KEY_LEN, PUBLIC_KEY_LEN,
};
pub use package::{read_package, write_package, Package, MAGIC_NUMBER};
pub use signature::{signature_message, verify_signature, Ed25519Signer, Signer};

/// Deepest pointer nesting accepted when reading a message.
const NESTING_LIMIT: i32 = 512;

/// Reader limits for `len` bytes of input.
///
/// Each word may be traversed a few times; anything more means the message
/// points back into itself.
fn reader_options(len: usize) -> ReaderOptions {
    let mut options = ReaderOptions::new();
    options
        .nesting_limit(NESTING_LIMIT)
        .traversal_limit_in_words(Some((len / 8 + 1).saturating_mul(4) as _));
    options
}

fn message_bytes(message: &message::Builder<HeapAllocator>) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    serialize::write_message(&mut bytes, message)?;
    Ok(bytes)
}

/// Split the first message off `bytes`, checking its framing.
fn take_message<'a>(bytes: &mut &'a [u8]) -> Result<&'a [u8]> {
    let start = *bytes;
    serialize::read_message(&mut *bytes, reader_options(start.len()))?;
    Ok(&start[..start.len() - bytes.len()])
}
