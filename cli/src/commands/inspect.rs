//! `docker-spk inspect` command - Verify a package and list its files.

use clap::Args;
use docker_spk_runtime::spk::{decode_archive, encode_app_id, read_package, verify_signature};
use docker_spk_runtime::{Node, NodeKind};
use std::path::PathBuf;

use crate::output::{format_bytes, new_table};

#[derive(Args)]
pub struct InspectArgs {
    /// Package to inspect
    pub package: PathBuf,
}

pub fn execute(args: InspectArgs) -> Result<(), Box<dyn std::error::Error>> {
    let file = std::fs::File::open(&args.package)
        .map_err(|e| format!("Failed to open {}: {e}", args.package.display()))?;
    let package = read_package(std::io::BufReader::new(file))?;
    let public_key = verify_signature(&package.signature, &package.archive)?;
    let files = decode_archive(&package.archive)?;

    println!("App id:    {}", encode_app_id(&public_key)?);
    println!("Signature: valid");
    println!();

    let mut table = new_table(&["PATH", "TYPE", "SIZE"]);
    for (path, node) in flatten(&files) {
        table.add_row(vec![path, kind_label(node).to_string(), size_label(node)]);
    }
    println!("{table}");
    Ok(())
}

/// Depth-first listing with full paths, in archive order.
fn flatten(files: &[Node]) -> Vec<(String, &Node)> {
    let mut rows = Vec::new();
    walk(files, "", &mut rows);
    rows
}

fn walk<'a>(nodes: &'a [Node], prefix: &str, rows: &mut Vec<(String, &'a Node)>) {
    for node in nodes {
        let path = if prefix.is_empty() {
            node.name.clone()
        } else {
            format!("{prefix}/{}", node.name)
        };
        rows.push((path.clone(), node));
        walk(node.children(), &path, rows);
    }
}

fn kind_label(node: &Node) -> &'static str {
    match node.kind {
        NodeKind::Directory(_) => "dir",
        NodeKind::Regular(_) => "file",
        NodeKind::Executable(_) => "exec",
        NodeKind::Symlink(_) => "symlink",
    }
}

fn size_label(node: &Node) -> String {
    match &node.kind {
        NodeKind::Symlink(target) => format!("-> {target}"),
        NodeKind::Directory(children) => format!("{} entries", children.len()),
        NodeKind::Regular(bytes) | NodeKind::Executable(bytes) => {
            format_bytes(bytes.len() as u64)
        }
    }
}
