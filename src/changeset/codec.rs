//! Canonical text codec for change-set records
//!
//! The record is line-oriented: six header lines (resource id, definition id,
//! definition name, base directory, category code, version) followed by one
//! line per file entry. Entry lines carry exactly four fields,
//! `<kind> <new-hash-or-0> <old-hash-or-0> <path>`, where the path is the
//! final field and may itself contain spaces. The codec holds no state and is
//! safe to use from any number of threads.

use crate::changeset::{ChangeSet, ChangeSetCategory, ChangeSetHeader, EntryKind, FileEntry};
use crate::error::ChangeSetError;
use crate::types::ContentHash;
use std::collections::HashSet;
use std::io::{BufRead, Write};

/// Sentinel written in place of an absent hash.
const NO_HASH: &str = "0";

const HEADER_LINES: usize = 6;

/// Serialize a change-set into its canonical text record.
pub fn write_changeset<W: Write>(out: &mut W, changeset: &ChangeSet) -> Result<(), ChangeSetError> {
    let header = &changeset.header;

    if header.definition_name.contains('\n') {
        return Err(ChangeSetError::EmbeddedNewline {
            field: "definition name",
        });
    }
    if header.base_directory.contains('\n') {
        return Err(ChangeSetError::EmbeddedNewline {
            field: "base directory",
        });
    }

    writeln!(out, "{}", header.resource_id)?;
    writeln!(out, "{}", header.definition_id)?;
    writeln!(out, "{}", header.definition_name)?;
    writeln!(out, "{}", header.base_directory)?;
    writeln!(out, "{}", header.category.code())?;
    writeln!(out, "{}", header.version)?;

    let mut seen_paths = HashSet::new();
    for entry in &changeset.entries {
        if entry.path.contains('\n') {
            return Err(ChangeSetError::EmbeddedNewline { field: "path" });
        }
        if !seen_paths.insert(entry.path.as_str()) {
            return Err(ChangeSetError::DuplicatePath {
                path: entry.path.clone(),
            });
        }
        let new_hash = entry.new_hash.as_ref().map(ContentHash::as_str).unwrap_or(NO_HASH);
        let old_hash = entry.old_hash.as_ref().map(ContentHash::as_str).unwrap_or(NO_HASH);
        writeln!(
            out,
            "{} {} {} {}",
            entry.kind.code(),
            new_hash,
            old_hash,
            entry.path
        )?;
    }

    Ok(())
}

/// Parse a change-set from its canonical text record.
///
/// Errors identify the offending 1-based line number.
pub fn read_changeset<R: BufRead>(input: R) -> Result<ChangeSet, ChangeSetError> {
    let mut lines = input.lines();
    let mut line_no = 0;

    let next_line = |lines: &mut std::io::Lines<R>, line_no: &mut usize| -> Result<String, ChangeSetError> {
        *line_no += 1;
        match lines.next() {
            Some(line) => Ok(line?),
            None => Err(ChangeSetError::malformed(
                *line_no,
                format!("missing header line ({HEADER_LINES} required)"),
            )),
        }
    };

    let resource_id = parse_u32(&next_line(&mut lines, &mut line_no)?, 1, "resource id")?;
    let definition_id = parse_u32(&next_line(&mut lines, &mut line_no)?, 2, "definition id")?;
    let definition_name = next_line(&mut lines, &mut line_no)?;
    let base_directory = next_line(&mut lines, &mut line_no)?;

    let category_code = next_line(&mut lines, &mut line_no)?;
    let category = ChangeSetCategory::from_code(category_code.trim()).ok_or_else(|| {
        ChangeSetError::malformed(5, format!("unknown category code {category_code:?}"))
    })?;

    let version_line = next_line(&mut lines, &mut line_no)?;
    let version = parse_u32(&version_line, 6, "version")?;
    if version == 0 {
        return Err(ChangeSetError::malformed(6, "version must be positive"));
    }

    let header = ChangeSetHeader {
        resource_id,
        definition_id,
        definition_name,
        base_directory,
        category,
        version,
    };

    let mut entries = Vec::new();
    let mut seen_paths = HashSet::new();
    for line in lines {
        line_no += 1;
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let entry = parse_entry(&line, line_no)?;
        if !seen_paths.insert(entry.path.clone()) {
            return Err(ChangeSetError::malformed(
                line_no,
                format!("duplicate path {:?}", entry.path),
            ));
        }
        entries.push(entry);
    }

    Ok(ChangeSet { header, entries })
}

fn parse_u32(line: &str, line_no: usize, what: &str) -> Result<u32, ChangeSetError> {
    line.trim()
        .parse()
        .map_err(|_| ChangeSetError::malformed(line_no, format!("{what} is not an integer: {line:?}")))
}

/// Split an entry line into its four fields. Only the first three whitespace
/// runs delimit fields; everything after them is the path.
fn split_entry(line: &str) -> Option<[&str; 4]> {
    let mut rest = line;
    let mut fields = [""; 3];
    for field in fields.iter_mut() {
        rest = rest.trim_start_matches(|c: char| c.is_ascii_whitespace());
        let end = rest.find(|c: char| c.is_ascii_whitespace())?;
        *field = &rest[..end];
        rest = &rest[end..];
    }
    let path = rest.strip_prefix(|c: char| c.is_ascii_whitespace())?;
    if path.is_empty() {
        return None;
    }
    Some([fields[0], fields[1], fields[2], path])
}

fn parse_hash(field: &str, line_no: usize) -> Result<Option<ContentHash>, ChangeSetError> {
    if field == NO_HASH {
        return Ok(None);
    }
    field
        .parse()
        .map(Some)
        .map_err(|_| ChangeSetError::malformed(line_no, format!("invalid hash field {field:?}")))
}

fn parse_entry(line: &str, line_no: usize) -> Result<FileEntry, ChangeSetError> {
    let [kind_code, new_field, old_field, path] = split_entry(line).ok_or_else(|| {
        ChangeSetError::malformed(line_no, "file entry must have exactly 4 fields")
    })?;

    let kind = EntryKind::from_code(kind_code)
        .ok_or_else(|| ChangeSetError::malformed(line_no, format!("unknown entry type {kind_code:?}")))?;
    let new_hash = parse_hash(new_field, line_no)?;
    let old_hash = parse_hash(old_field, line_no)?;

    match kind {
        EntryKind::Added => {
            let new_hash = new_hash.ok_or_else(|| {
                ChangeSetError::malformed(line_no, "added entry requires a new hash")
            })?;
            if old_hash.is_some() {
                return Err(ChangeSetError::malformed(
                    line_no,
                    "added entry must not carry an old hash",
                ));
            }
            Ok(FileEntry::added(path, new_hash))
        }
        EntryKind::Removed => {
            let old_hash = old_hash.ok_or_else(|| {
                ChangeSetError::malformed(line_no, "removed entry requires an old hash")
            })?;
            if new_hash.is_some() {
                return Err(ChangeSetError::malformed(
                    line_no,
                    "removed entry must not carry a new hash",
                ));
            }
            Ok(FileEntry::removed(path, old_hash))
        }
        EntryKind::Changed => {
            let new_hash = new_hash.ok_or_else(|| {
                ChangeSetError::malformed(line_no, "changed entry requires a new hash")
            })?;
            let old_hash = old_hash.ok_or_else(|| {
                ChangeSetError::malformed(line_no, "changed entry requires an old hash")
            })?;
            FileEntry::changed(path, new_hash, old_hash)
                .map_err(|_| ChangeSetError::malformed(line_no, "changed entry hashes are equal"))
        }
    }
}
