//! `.spk` file framing.
//!
//! ```text
//! magic (8 bytes) | xz( Signature message | Archive message )
//! ```

use docker_spk_core::error::{Result, SpkError};
use std::io::{Read, Write};
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

use super::take_message;

/// Leading bytes of every Sandstorm package.
pub const MAGIC_NUMBER: [u8; 8] = [0x8f, 0xc6, 0xcd, 0xef, 0x45, 0x1a, 0xea, 0x96];

/// Decoded contents of a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub signature: Vec<u8>,
    pub archive: Vec<u8>,
}

/// Frame a signature and archive into a package.
///
/// # Arguments
///
/// * `out` - Destination for the package bytes
/// * `signature` - Encoded `Signature` message
/// * `archive` - Encoded `Archive` message
/// * `level` - xz preset, 0-9
pub fn write_package<W: Write>(
    mut out: W,
    signature: &[u8],
    archive: &[u8],
    level: u32,
) -> Result<W> {
    out.write_all(&MAGIC_NUMBER)?;
    let mut encoder = XzEncoder::new(out, level);
    encoder.write_all(signature)?;
    encoder.write_all(archive)?;
    let mut out = encoder.finish()?;
    out.flush()?;
    Ok(out)
}

/// Unframe a package, checking the magic number.
pub fn read_package<R: Read>(mut input: R) -> Result<Package> {
    let mut magic = [0u8; MAGIC_NUMBER.len()];
    input.read_exact(&mut magic).map_err(|e| {
        SpkError::EncodingError(format!("Failed to read package header: {}", e))
    })?;
    if magic != MAGIC_NUMBER {
        return Err(SpkError::EncodingError(format!(
            "not a Sandstorm package (magic {})",
            hex::encode(magic)
        )));
    }

    let mut body = Vec::new();
    XzDecoder::new(input)
        .read_to_end(&mut body)
        .map_err(|e| SpkError::EncodingError(format!("Failed to decompress package: {}", e)))?;

    let mut rest = body.as_slice();
    let signature = take_message(&mut rest)?;
    let archive = take_message(&mut rest)?;
    if !rest.is_empty() {
        return Err(SpkError::EncodingError(format!(
            "{} bytes of trailing data after archive",
            rest.len()
        )));
    }
    Ok(Package {
        signature: signature.to_vec(),
        archive: archive.to_vec(),
    })
}
