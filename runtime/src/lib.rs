//! docker-spk Runtime - Image to Sandstorm package conversion.
//!
//! This crate reads `docker save` archives, merges their layers into one
//! tree and writes the tree out as a signed Sandstorm package.

#![allow(clippy::result_large_err)]

pub mod oci;
pub mod pack;
pub mod spk;
pub mod tree;

#[allow(dead_code, clippy::all)]
pub mod package_capnp {
    include!(concat!(env!("OUT_DIR"), "/package_capnp.rs"));
}

// Re-export common types
pub use oci::DockerImage;
pub use pack::{pack_image, PackReport};
pub use spk::{
    decode_archive, read_package, verify_signature, ArchiveEncoder, Ed25519Signer, KeyStore,
    Keyring, Signer, TreeSink,
};
pub use tree::{merge_layers, BuiltTree, LayerSource, Node, NodeKind, TreeStats};

/// docker-spk runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
