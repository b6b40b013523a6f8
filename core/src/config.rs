use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Result, SpkError};

/// Default xz preset used when compressing packages.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// File name of the keyring inside the home directory.
const DEFAULT_KEYRING_NAME: &str = ".sandstorm-keyring";

/// Order in which image layers are replayed into the tree.
///
/// The first layer to introduce a path owns it. `BottomUp` replays the
/// base layer first, so lower layers win. `TopDown` replays the newest
/// layer first, which gives the usual overlay result where the topmost
/// definition of a path is kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayerOrder {
    #[default]
    BottomUp,
    TopDown,
}

impl std::fmt::Display for LayerOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BottomUp => write!(f, "bottom-up"),
            Self::TopDown => write!(f, "top-down"),
        }
    }
}

impl std::str::FromStr for LayerOrder {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "bottom-up" => Ok(Self::BottomUp),
            "top-down" => Ok(Self::TopDown),
            _ => Err(format!(
                "unknown layer order: '{}' (supported: bottom-up, top-down)",
                s
            )),
        }
    }
}

/// Configuration for packing one Docker image into an spk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackConfig {
    /// Image archive produced by `docker save`
    pub image: PathBuf,

    /// Output package path (inferred from `image` when unset)
    pub output: Option<PathBuf>,

    /// Sandstorm keyring (defaults to ~/.sandstorm-keyring)
    pub keyring: Option<PathBuf>,

    /// App id whose private key signs the package
    pub app_id: String,

    /// Layer replay order
    #[serde(default)]
    pub layer_order: LayerOrder,

    /// xz preset, 0-9
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,
}

fn default_compression_level() -> u32 {
    DEFAULT_COMPRESSION_LEVEL
}

impl PackConfig {
    /// Create a config with defaults for everything but the inputs.
    pub fn new(image: impl Into<PathBuf>, app_id: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            output: None,
            keyring: None,
            app_id: app_id.into(),
            layer_order: LayerOrder::default(),
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }

    /// Check the config for values the packer cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.image.as_os_str().is_empty() {
            return Err(SpkError::ConfigError("image path not set".to_string()));
        }
        if self.app_id.trim().is_empty() {
            return Err(SpkError::ConfigError("app id not set".to_string()));
        }
        if self.compression_level > 9 {
            return Err(SpkError::ConfigError(format!(
                "compression level must be between 0 and 9, got {}",
                self.compression_level
            )));
        }
        Ok(())
    }

    /// Output path, inferred as `<image minus .tar>.spk` when not given.
    pub fn output_path(&self) -> PathBuf {
        if let Some(output) = &self.output {
            return output.clone();
        }
        let image = self.image.to_string_lossy();
        let stem = image.strip_suffix(".tar").unwrap_or(&image);
        PathBuf::from(format!("{stem}.spk"))
    }

    /// Keyring path, falling back to the keyring in the home directory.
    pub fn keyring_path(&self) -> PathBuf {
        match &self.keyring {
            Some(path) => path.clone(),
            None => default_keyring_path(),
        }
    }
}

/// Return the default keyring location (~/.sandstorm-keyring).
pub fn default_keyring_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_KEYRING_NAME)
}
