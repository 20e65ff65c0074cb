//! Content-archive container format
//!
//! Binary layout of the archive container (big-endian scalars unless noted):
//!
//! ```text
//! [MAGIC:4]@0x000  [TYPE:4]@0x004  [FILE_COUNT:4]@0x00C  [ENTRY_COUNT:4]@0x010
//! [SC_ENTRY_COUNT:2]@0x014  [TABLE_OFFSET:4]@0x018  [ENTRY_DATA_SIZE:4]@0x01C
//! [BODY_OFFSET:8]@0x020  [BODY_SIZE:8]@0x028
//! [CONTENT_OFFSET:8]@0x030  [CONTENT_SIZE:8]@0x038
//! [CONTENT_ID:36]@0x040 (NUL-padded ASCII)
//! [DRM_TYPE:4]@0x070  [CONTENT_TYPE:4]@0x074  [CONTENT_FLAGS:4]@0x078
//! [PROMOTE_SIZE:4]@0x07C  [VERSION_DATE:4]@0x080  [VERSION_HASH:4]@0x084
//! [IRO_TAG:4]@0x098  [DRM_TYPE_VERSION:4]@0x09C
//! [DIGESTS:4x32]@0x100..0x180  [PFS GEOMETRY]@0x404..0x490  [PKG_DIGEST:32]@0xFE0
//! ```
//!
//! The entry table at `TABLE_OFFSET` holds `ENTRY_COUNT` rows of 32 bytes:
//! id, filename_offset, flags1, flags2, offset, size (all u32). Well-known
//! entry ids identify named sub-blocks: the filename table ([`ENTRY_ID_NAMES`],
//! a run of NUL-terminated strings), the digest table ([`ENTRY_ID_DIGESTS`]),
//! the parameter block ([`ENTRY_ID_PARAMS`], little-endian key/value
//! directory) and the changelog ([`ENTRY_ID_CHANGELOG`], UTF-8 text).

pub mod error;
pub mod header;
pub mod metadata;
pub mod sfo;
mod source;

pub use error::{PkgError, Result};
pub use header::{PkgEntry, PkgHeader};
pub use metadata::PkgMetadata;
pub use sfo::SfoParameter;
pub use source::ByteSource;

/// Magic constant at offset 0 of every archive container.
pub const MAGIC: u32 = 0x7F43_4E54;

/// Size of the fixed header block. A file shorter than this cannot be parsed.
pub const HEADER_LEN: u64 = 0x1000;

/// Entry table row size in bytes.
pub const ENTRY_LEN: usize = 0x20;

/// Entry id of the digest table.
pub const ENTRY_ID_DIGESTS: u32 = 0x1;
/// Entry id of the filename table.
pub const ENTRY_ID_NAMES: u32 = 0x200;
/// Entry id of the parameter block.
pub const ENTRY_ID_PARAMS: u32 = 0x1000;
/// Entry id of the changelog text.
pub const ENTRY_ID_CHANGELOG: u32 = 0x1260;

/// Content type value for which no compatibility checksum is defined.
pub const CONTENT_TYPE_UNCHECKED: u32 = 0x1B;
