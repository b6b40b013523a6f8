//! Test helpers that build layer tarballs and `docker save` archives.

use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use tar::{Builder, EntryType, Header};

pub enum FixtureEntry<'a> {
    Dir(&'a str),
    File(&'a str, u32, &'a [u8]),
    Symlink(&'a str, &'a str),
    HardLink(&'a str, &'a str),
}

/// Build an uncompressed layer tarball.
pub fn layer_tar(entries: &[FixtureEntry<'_>]) -> Vec<u8> {
    let mut builder = Builder::new(Vec::new());
    for entry in entries {
        let mut header = Header::new_gnu();
        header.set_mtime(1_700_000_000);
        match entry {
            FixtureEntry::Dir(path) => {
                header.set_entry_type(EntryType::Directory);
                header.set_mode(0o755);
                header.set_size(0);
                builder.append_data(&mut header, path, std::io::empty()).unwrap();
            }
            FixtureEntry::File(path, mode, content) => {
                header.set_entry_type(EntryType::Regular);
                header.set_mode(*mode);
                header.set_size(content.len() as u64);
                builder.append_data(&mut header, path, *content).unwrap();
            }
            FixtureEntry::Symlink(path, target) | FixtureEntry::HardLink(path, target) => {
                let entry_type = if matches!(entry, FixtureEntry::Symlink(..)) {
                    EntryType::Symlink
                } else {
                    EntryType::Link
                };
                header.set_entry_type(entry_type);
                header.set_mode(0o777);
                header.set_size(0);
                // An empty target leaves the linkname field zeroed.
                if !target.is_empty() {
                    header.set_link_name(target).unwrap();
                }
                builder.append_data(&mut header, path, std::io::empty()).unwrap();
            }
        }
    }
    builder.into_inner().unwrap()
}

pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

/// Build an outer archive holding `members` verbatim.
pub fn outer_tar(members: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = Builder::new(Vec::new());
    for (name, content) in members {
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_mode(0o644);
        header.set_size(content.len() as u64);
        builder.append_data(&mut header, name, *content).unwrap();
    }
    builder.into_inner().unwrap()
}

/// Build a `docker save` archive whose manifest lists `layers` in order.
pub fn docker_save(layers: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let names: Vec<&str> = layers.iter().map(|(name, _)| *name).collect();
    let manifest = serde_json::json!([{
        "Config": "config.json",
        "RepoTags": ["example/app:latest"],
        "Layers": names,
    }])
    .to_string();

    let mut members: Vec<(&str, &[u8])> = vec![("config.json", &b"{}"[..])];
    for (name, blob) in layers {
        members.push((*name, blob.as_slice()));
    }
    members.push(("manifest.json", manifest.as_bytes()));
    outer_tar(&members)
}
