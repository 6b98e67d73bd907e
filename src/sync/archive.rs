//! Archive transport packing and unpacking
//!
//! Agents ship change-sets and content as gzip-compressed tar archives of
//! flat, name-keyed entries. The engine only ever sees "named byte blobs";
//! the container choice is confined to this module.

use crate::error::SyncError;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use tar::{Archive, Builder, Header};

/// Pack `(name, bytes)` pairs into a gzip'd tar stream.
pub fn pack_entries<W: Write>(out: W, entries: &[(String, Vec<u8>)]) -> Result<(), SyncError> {
    let mut builder = Builder::new(GzEncoder::new(out, Compression::default()));
    for (name, bytes) in entries {
        let mut header = Header::new_gnu();
        header.set_size(bytes.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, name, bytes.as_slice())
            .map_err(SyncError::Io)?;
    }
    builder.into_inner().map_err(SyncError::Io)?.finish().map_err(SyncError::Io)?;
    Ok(())
}

/// Unpack a gzip'd tar stream into `(name, bytes)` pairs, in archive order.
///
/// Entries must live in a flat namespace; a nested path means the sender
/// built the archive wrong and the whole upload is rejected.
pub fn unpack_entries<R: Read>(input: R) -> Result<Vec<(String, Vec<u8>)>, SyncError> {
    let mut archive = Archive::new(GzDecoder::new(input));
    let mut out = Vec::new();

    let entries = archive
        .entries()
        .map_err(|e| SyncError::MalformedArchive(format!("unreadable archive: {e}")))?;
    for entry in entries {
        let mut entry =
            entry.map_err(|e| SyncError::MalformedArchive(format!("corrupt entry: {e}")))?;
        let path = entry
            .path()
            .map_err(|e| SyncError::MalformedArchive(format!("undecodable entry name: {e}")))?;
        let name = match path.to_str() {
            Some(name) if !name.is_empty() && !name.contains('/') => name.to_string(),
            Some(name) => {
                return Err(SyncError::MalformedArchive(format!(
                    "entry name {name:?} is not a flat name"
                )))
            }
            None => {
                return Err(SyncError::MalformedArchive(
                    "entry name is not valid UTF-8".to_string(),
                ))
            }
        };
        let mut bytes = Vec::new();
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| SyncError::MalformedArchive(format!("truncated entry {name:?}: {e}")))?;
        out.push((name, bytes));
    }

    Ok(out)
}
