//! docker-spk Core - Foundational Types
//!
//! This module provides the error taxonomy and pack configuration shared
//! by the conversion engine and the command-line tool.

pub mod config;
pub mod error;

// Re-export commonly used types
pub use config::{default_keyring_path, LayerOrder, PackConfig, DEFAULT_COMPRESSION_LEVEL};
pub use error::{Result, SpkError};

/// docker-spk version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
