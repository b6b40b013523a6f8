//! Sandstorm `Archive` encoding.

use capnp::message;
use capnp::serialize;
use capnp::struct_list;
use docker_spk_core::error::{Result, SpkError};

use super::{message_bytes, reader_options};
use crate::package_capnp::archive::{self, file};
use crate::tree::{Node, NodeKind};

/// Largest element count a Cap'n Proto list can hold.
const MAX_LIST_LEN: usize = (1 << 29) - 1;

/// Consumer of a finished tree.
pub trait TreeSink {
    /// Serialize the children of the root.
    fn write_tree(&mut self, files: &[Node]) -> Result<Vec<u8>>;
}

/// Encodes a tree as an `Archive` message.
#[derive(Debug, Default)]
pub struct ArchiveEncoder;

impl ArchiveEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl TreeSink for ArchiveEncoder {
    fn write_tree(&mut self, files: &[Node]) -> Result<Vec<u8>> {
        let mut message = message::Builder::new_default();
        let root = message.init_root::<archive::Builder<'_>>();
        encode_files(root.init_files(list_len(".", files.len())?), files)?;
        let bytes = message_bytes(&message)?;
        tracing::debug!(bytes = bytes.len(), "Encoded archive");
        Ok(bytes)
    }
}

fn list_len(name: &str, len: usize) -> Result<u32> {
    if len > MAX_LIST_LEN {
        return Err(SpkError::EncodingError(format!(
            "directory {} has {} entries, more than an archive can hold",
            name, len
        )));
    }
    Ok(len as u32)
}

fn encode_files(mut list: struct_list::Builder<'_, file::Owned>, nodes: &[Node]) -> Result<()> {
    for (index, node) in nodes.iter().enumerate() {
        encode_file(list.reborrow().get(index as u32), node)?;
    }
    Ok(())
}

fn encode_file(mut file: file::Builder<'_>, node: &Node) -> Result<()> {
    file.set_name(&node.name);
    file.set_last_modification_time_ns(node.modified_ns);
    match &node.kind {
        NodeKind::Regular(bytes) => file.set_regular(bytes),
        NodeKind::Executable(bytes) => file.set_executable(bytes),
        NodeKind::Symlink(target) => file.set_symlink(target),
        NodeKind::Directory(children) => {
            let list = file.init_directory(list_len(&node.name, children.len())?);
            encode_files(list, children)?;
        }
    }
    Ok(())
}

/// Decode an `Archive` message back into root children.
pub fn decode_archive(bytes: &[u8]) -> Result<Vec<Node>> {
    let mut input = bytes;
    let message = serialize::read_message(&mut input, reader_options(bytes.len()))?;
    if !input.is_empty() {
        return Err(SpkError::EncodingError(format!(
            "{} bytes of trailing data after archive",
            input.len()
        )));
    }
    let root = message.get_root::<archive::Reader<'_>>()?;
    decode_files(root.get_files()?)
}

fn decode_files(files: struct_list::Reader<'_, file::Owned>) -> Result<Vec<Node>> {
    files.iter().map(decode_file).collect()
}

fn decode_file(file: file::Reader<'_>) -> Result<Node> {
    let kind = match file.which()? {
        file::Which::Regular(bytes) => NodeKind::Regular(bytes?.to_vec()),
        file::Which::Executable(bytes) => NodeKind::Executable(bytes?.to_vec()),
        file::Which::Symlink(target) => NodeKind::Symlink(target?.to_string()),
        file::Which::Directory(children) => NodeKind::Directory(decode_files(children?)?),
    };
    Ok(Node {
        name: file.get_name()?.to_string(),
        modified_ns: file.get_last_modification_time_ns(),
        kind,
    })
}
