//! `docker save` image input.
//!
//! Reads the archive written by `docker save` and replays its layers as a
//! [`LayerSource`](crate::tree::LayerSource).
//!
//! # Layout
//!
//! ```text
//! image.tar
//! ├── manifest.json          ([{"Config", "RepoTags", "Layers"}])
//! ├── <config>.json
//! └── <layer>/layer.tar      (or blobs/sha256/<digest>, possibly gzip)
//! ```
//!
//! Layer members are located once by their offset in the outer archive and
//! re-read on every pass, so nothing is extracted to disk.

#[cfg(test)]
pub(crate) mod fixtures;
mod image;
mod layers;

pub use image::{DockerImage, LayerBlob};
pub use layers::visit_layer;
