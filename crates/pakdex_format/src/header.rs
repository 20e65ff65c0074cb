//! Fixed header block and entry table rows

use crate::error::{PkgError, Result};
use crate::{HEADER_LEN, MAGIC};
use byteorder::{BigEndian, ReadBytesExt};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// Parsed fixed header block of an archive container.
///
/// Digest fields are rendered as uppercase hex at parse time; `content_id`
/// is stored with its NUL padding stripped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkgHeader {
    pub pkg_type: u32,
    pub file_count: u32,
    pub entry_count: u32,
    pub sc_entry_count: u16,
    pub table_offset: u32,
    pub entry_data_size: u32,
    pub body_offset: u64,
    pub body_size: u64,
    pub content_offset: u64,
    pub content_size: u64,
    pub content_id: String,
    pub drm_type: u32,
    pub content_type: u32,
    pub content_flags: u32,
    pub promote_size: u32,
    pub version_date: u32,
    pub version_hash: u32,
    pub iro_tag: u32,
    pub drm_type_version: u32,
    pub digest_entries_1: String,
    pub digest_entries_2: String,
    pub digest_table: String,
    pub digest_body: String,
    pub pfs_image_count: u32,
    pub pfs_image_flags: u64,
    pub pfs_image_offset: u64,
    pub pfs_image_size: u64,
    pub mount_image_offset: u64,
    pub mount_image_size: u64,
    pub pkg_size: u64,
    pub pfs_signed_size: u32,
    pub pfs_cache_size: u32,
    pub pfs_image_digest: String,
    pub pfs_signed_digest: String,
    pub pfs_split_size_nth_0: u64,
    pub pfs_split_size_nth_1: u64,
    pub pkg_digest: String,
}

fn hex32(block: &[u8], offset: usize) -> String {
    hex::encode_upper(&block[offset..offset + 32])
}

impl PkgHeader {
    /// Parse the fixed header block. `block` must be exactly [`HEADER_LEN`] bytes.
    pub fn parse(block: &[u8]) -> Result<Self> {
        debug_assert_eq!(block.len() as u64, HEADER_LEN);

        let mut header = Self::default();
        let mut cur = Cursor::new(block);

        let magic = cur.read_u32::<BigEndian>()?;
        if magic != MAGIC {
            return Err(PkgError::InvalidMagic(magic));
        }
        header.pkg_type = cur.read_u32::<BigEndian>()?;

        cur.set_position(0x0C);
        header.file_count = cur.read_u32::<BigEndian>()?;
        header.entry_count = cur.read_u32::<BigEndian>()?;
        header.sc_entry_count = cur.read_u16::<BigEndian>()?;

        cur.set_position(0x18);
        header.table_offset = cur.read_u32::<BigEndian>()?;
        header.entry_data_size = cur.read_u32::<BigEndian>()?;
        header.body_offset = cur.read_u64::<BigEndian>()?;
        header.body_size = cur.read_u64::<BigEndian>()?;
        header.content_offset = cur.read_u64::<BigEndian>()?;
        header.content_size = cur.read_u64::<BigEndian>()?;

        header.content_id = std::str::from_utf8(&block[0x40..0x40 + 36])
            .map_err(|_| PkgError::Encoding {
                field: "content_id",
            })?
            .trim_end_matches('\0')
            .to_string();

        cur.set_position(0x70);
        header.drm_type = cur.read_u32::<BigEndian>()?;
        header.content_type = cur.read_u32::<BigEndian>()?;
        header.content_flags = cur.read_u32::<BigEndian>()?;
        header.promote_size = cur.read_u32::<BigEndian>()?;
        header.version_date = cur.read_u32::<BigEndian>()?;
        header.version_hash = cur.read_u32::<BigEndian>()?;

        cur.set_position(0x98);
        header.iro_tag = cur.read_u32::<BigEndian>()?;
        header.drm_type_version = cur.read_u32::<BigEndian>()?;

        header.digest_entries_1 = hex32(block, 0x100);
        header.digest_entries_2 = hex32(block, 0x120);
        header.digest_table = hex32(block, 0x140);
        header.digest_body = hex32(block, 0x160);

        cur.set_position(0x404);
        header.pfs_image_count = cur.read_u32::<BigEndian>()?;
        header.pfs_image_flags = cur.read_u64::<BigEndian>()?;
        header.pfs_image_offset = cur.read_u64::<BigEndian>()?;
        header.pfs_image_size = cur.read_u64::<BigEndian>()?;
        header.mount_image_offset = cur.read_u64::<BigEndian>()?;
        header.mount_image_size = cur.read_u64::<BigEndian>()?;
        header.pkg_size = cur.read_u64::<BigEndian>()?;
        header.pfs_signed_size = cur.read_u32::<BigEndian>()?;
        header.pfs_cache_size = cur.read_u32::<BigEndian>()?;

        header.pfs_image_digest = hex32(block, 0x440);
        header.pfs_signed_digest = hex32(block, 0x460);

        cur.set_position(0x480);
        header.pfs_split_size_nth_0 = cur.read_u64::<BigEndian>()?;
        header.pfs_split_size_nth_1 = cur.read_u64::<BigEndian>()?;

        header.pkg_digest = hex32(block, 0xFE0);

        Ok(header)
    }
}

/// One row of the archive's table of contents.
///
/// The filename is resolved from the filename table at parse time and is
/// only present when the row's filename offset is nonzero and the table
/// itself was readable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkgEntry {
    pub id: u32,
    pub flags1: u32,
    pub flags2: u32,
    pub offset: u32,
    pub size: u32,
    pub filename: Option<String>,
}

/// Raw entry-table row before filename resolution.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RawEntry {
    pub id: u32,
    pub filename_offset: u32,
    pub flags1: u32,
    pub flags2: u32,
    pub offset: u32,
    pub size: u32,
}

impl RawEntry {
    pub(crate) fn parse(row: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(row);
        Ok(Self {
            id: cur.read_u32::<BigEndian>()?,
            filename_offset: cur.read_u32::<BigEndian>()?,
            flags1: cur.read_u32::<BigEndian>()?,
            flags2: cur.read_u32::<BigEndian>()?,
            offset: cur.read_u32::<BigEndian>()?,
            size: cur.read_u32::<BigEndian>()?,
        })
    }
}
