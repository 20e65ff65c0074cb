//! Archive parsing and the in-memory metadata record

use crate::error::{PkgError, Result};
use crate::header::{PkgEntry, PkgHeader, RawEntry};
use crate::sfo::{self, SfoParameter};
use crate::source::{ByteSource, FileSource};
use crate::{
    CONTENT_TYPE_UNCHECKED, ENTRY_ID_CHANGELOG, ENTRY_ID_DIGESTS, ENTRY_ID_NAMES, ENTRY_ID_PARAMS,
    ENTRY_LEN, HEADER_LEN,
};
use byteorder::{BigEndian, ReadBytesExt};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;

/// Fully parsed metadata of one archive.
///
/// `path` is the identity key: an index holds at most one live record per
/// path, and re-ingesting a path replaces the record. The location fields
/// are rewritten when the backing location changes (remote root address
/// change); everything else is immutable after parsing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PkgMetadata {
    pub path: String,
    pub directory: String,
    pub filename: String,
    pub header: PkgHeader,
    pub entries: Vec<PkgEntry>,
    pub params: Vec<SfoParameter>,
    pub changelog: Option<String>,
    pub digests: Vec<String>,
}

impl PkgMetadata {
    /// Parse an archive file on the local filesystem.
    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(PkgError::NotAFile(path.to_path_buf()));
        }

        let file = std::fs::File::open(path)?;
        let mut source = FileSource::new(file)?;
        let mut metadata = Self::parse(&mut source)?;

        metadata.path = path.to_string_lossy().into_owned();
        metadata.directory = path
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        metadata.filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(metadata)
    }

    /// Parse an archive from an in-memory buffer. The location fields are
    /// left empty; callers with a remote origin fill them in afterwards.
    pub fn from_bytes(buffer: &[u8]) -> Result<Self> {
        let mut source = buffer;
        Self::parse(&mut source)
    }

    fn parse<S: ByteSource>(source: &mut S) -> Result<Self> {
        let mut block = vec![0u8; HEADER_LEN as usize];
        source.read_at("header block", 0, &mut block)?;
        let header = PkgHeader::parse(&block)?;

        let raw_entries = read_entry_table(source, &header)?;

        // The filename table must be read in full before any row's filename
        // is dereferenced, regardless of where its own row sits in the table.
        let name_table = match raw_entries.iter().find(|e| e.id == ENTRY_ID_NAMES) {
            Some(raw) => read_payload(source, raw, "filename table").ok(),
            None => None,
        };

        let mut entries = Vec::with_capacity(raw_entries.len());
        for raw in &raw_entries {
            let filename = match (&name_table, raw.filename_offset) {
                (Some(table), offset) if offset > 0 => {
                    Some(sfo::read_cstr(table, offset as usize, "entry filename")?)
                }
                _ => None,
            };
            entries.push(PkgEntry {
                id: raw.id,
                flags1: raw.flags1,
                flags2: raw.flags2,
                offset: raw.offset,
                size: raw.size,
                filename,
            });
        }

        let digests = read_digests(source, &header, &raw_entries)?;

        // The parameter block and changelog are optional; a short or
        // unreadable payload degrades to absence rather than failing the
        // whole record.
        let params = raw_entries
            .iter()
            .find(|e| e.id == ENTRY_ID_PARAMS)
            .and_then(|raw| read_payload(source, raw, "parameter block").ok())
            .map(|payload| sfo::parse_parameters(&payload))
            .transpose()?
            .unwrap_or_default();

        let changelog = raw_entries
            .iter()
            .find(|e| e.id == ENTRY_ID_CHANGELOG)
            .and_then(|raw| read_payload(source, raw, "changelog").ok())
            .and_then(|payload| String::from_utf8(payload).ok());

        Ok(Self {
            path: String::new(),
            directory: String::new(),
            filename: String::new(),
            header,
            entries,
            params,
            changelog,
            digests,
        })
    }

    /// Look up a parameter value by key.
    pub fn sfo(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|p| p.name == key)
            .map(|p| p.value.as_str())
    }

    /// Most-current version found in the changelog: the lexicographically
    /// greatest 5-character version among all `app_ver="..."` occurrences.
    pub fn changelog_version(&self) -> Option<&str> {
        let changelog = self.changelog.as_deref()?;
        let mut version: Option<&str> = None;
        for (index, _) in changelog.match_indices("app_ver=\"") {
            let start = index + "app_ver=\"".len();
            let Some(candidate) = changelog.get(start..start + 5) else {
                continue;
            };
            match version {
                Some(current) if candidate <= current => {}
                _ => version = Some(candidate),
            }
        }
        version
    }

    /// Digest used to verify that app and patch archives belong together.
    ///
    /// Absent for unchecked content types. Otherwise the masked content
    /// flags select which entry's digest applies; an unrecognized mask (or
    /// a missing target entry) yields no checksum rather than an error.
    pub fn compatibility_checksum(&self) -> Option<&str> {
        if self.header.content_type == CONTENT_TYPE_UNCHECKED {
            return None;
        }

        let target_id = match self.header.content_flags & 0x0F00_0000 {
            0x0A00_0000 => 0x1001,
            0x0200_0000 => 0x1008,
            _ => return None,
        };

        self.entries
            .iter()
            .position(|e| e.id == target_id)
            .and_then(|index| self.digests.get(index))
            .map(String::as_str)
    }

    /// Whether the backing file still exists on the local filesystem.
    pub fn exists(&self) -> bool {
        Path::new(&self.path).exists()
    }

    /// Place a record parsed from a remote download at its remote location.
    /// `remote_path` is the absolute path on the server, `prefix` the
    /// `ftp://host:port` origin.
    pub fn locate_remote(&mut self, prefix: &str, remote_path: &str) {
        let separator = remote_path.rfind('/').unwrap_or(0);
        self.path = format!("{prefix}{remote_path}");
        self.directory = format!("{prefix}{}", &remote_path[..separator]);
        self.filename = remote_path[separator + 1..].to_string();
    }

    /// Rewrite the location fields when a remote root's address changes.
    /// Returns false when the record does not live under `old_prefix`.
    pub fn swap_prefix(&mut self, old_prefix: &str, new_prefix: &str) -> bool {
        if !self.path.starts_with(old_prefix) {
            return false;
        }
        self.path = format!("{new_prefix}{}", &self.path[old_prefix.len()..]);
        if self.directory.starts_with(old_prefix) {
            self.directory = format!("{new_prefix}{}", &self.directory[old_prefix.len()..]);
        }
        true
    }
}

fn read_entry_table<S: ByteSource>(source: &mut S, header: &PkgHeader) -> Result<Vec<RawEntry>> {
    let need = header.entry_count as u64 * ENTRY_LEN as u64;
    let offset = header.table_offset as u64;
    if offset.checked_add(need).map_or(true, |end| end > source.len()) {
        return Err(PkgError::Truncated {
            what: "entry table",
            offset,
            need: need as usize,
            have: source.len(),
        });
    }

    let mut table = vec![0u8; need as usize];
    source.read_at("entry table", offset, &mut table)?;

    table.chunks_exact(ENTRY_LEN).map(RawEntry::parse).collect()
}

fn read_payload<S: ByteSource>(
    source: &mut S,
    entry: &RawEntry,
    what: &'static str,
) -> Result<Vec<u8>> {
    let mut payload = vec![0u8; entry.size as usize];
    source.read_at(what, entry.offset as u64, &mut payload)?;
    Ok(payload)
}

/// Materialize per-entry digests from the digest table. The digest offset
/// sits at +0x10 of the table payload; digests are read until either
/// `entry_count` is reached or the payload is exhausted.
fn read_digests<S: ByteSource>(
    source: &mut S,
    header: &PkgHeader,
    raw_entries: &[RawEntry],
) -> Result<Vec<String>> {
    let table = raw_entries
        .iter()
        .find(|e| e.id == ENTRY_ID_DIGESTS)
        .ok_or(PkgError::MissingEntry {
            id: ENTRY_ID_DIGESTS,
        })?;
    let payload = read_payload(source, table, "digest table")?;

    let mut cur = Cursor::new(payload.as_slice());
    cur.set_position(0x10);
    let digest_offset = if payload.len() >= 0x14 {
        cur.read_u32::<BigEndian>()? as usize
    } else {
        0
    };

    let mut digests = Vec::new();
    for index in 0..header.entry_count as usize {
        let start = digest_offset + index * 32;
        let Some(bytes) = payload.get(start..start + 32) else {
            break;
        };
        digests.push(hex::encode_upper(bytes));
    }
    Ok(digests)
}
