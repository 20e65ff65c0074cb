//! Parameter block (SFO) decoding
//!
//! The parameter block is a little-endian key/value directory:
//!
//! ```text
//! [KEY_TABLE_OFFSET:4]@0x08  [DATA_TABLE_OFFSET:4]@0x0C  [ENTRY_COUNT:4]@0x10
//! ```
//!
//! followed by 16-byte directory rows at 0x14: key offset (u16), format
//! (u16), length (u32), max length (u32), data offset (u32). Format 0x0404
//! denotes a little-endian 32-bit integer rendered as fixed-width hex; any
//! other format denotes a UTF-8 string of `length - 1` bytes.

use crate::error::{PkgError, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// Format word for integer-typed parameter values.
const FORMAT_INTEGER: u16 = 0x0404;

/// One key/value pair decoded from the parameter block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SfoParameter {
    pub name: String,
    pub value: String,
}

/// Read a NUL-terminated string starting at `offset`. The terminator may be
/// missing on the last table entry, in which case the string runs to the end
/// of the buffer. Invalid UTF-8 is decoded lossily (the record is still
/// produced, with placeholder characters in the offending field).
pub(crate) fn read_cstr(table: &[u8], offset: usize, what: &'static str) -> Result<String> {
    let tail = table.get(offset..).ok_or(PkgError::Truncated {
        what,
        offset: offset as u64,
        need: 1,
        have: table.len() as u64,
    })?;
    let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
    Ok(String::from_utf8_lossy(&tail[..end]).into_owned())
}

/// Decode all parameters from the raw block payload.
pub fn parse_parameters(block: &[u8]) -> Result<Vec<SfoParameter>> {
    let mut cur = Cursor::new(block);
    cur.set_position(0x08);
    let key_table_offset = cur.read_u32::<LittleEndian>().map_err(|_| short(block))? as usize;
    let data_table_offset = cur.read_u32::<LittleEndian>().map_err(|_| short(block))? as usize;
    let entry_count = cur.read_u32::<LittleEndian>().map_err(|_| short(block))? as usize;

    let mut params = Vec::with_capacity(entry_count.min(256));
    for _ in 0..entry_count {
        let key_offset = cur.read_u16::<LittleEndian>().map_err(|_| short(block))? as usize;
        let format = cur.read_u16::<LittleEndian>().map_err(|_| short(block))?;
        let len = cur.read_u32::<LittleEndian>().map_err(|_| short(block))? as usize;
        let _max_len = cur.read_u32::<LittleEndian>().map_err(|_| short(block))?;
        let data_offset = cur.read_u32::<LittleEndian>().map_err(|_| short(block))? as usize;

        let name = read_cstr(block, key_table_offset + key_offset, "parameter key")?;

        let value = if format == FORMAT_INTEGER {
            let mut data = Cursor::new(block);
            data.set_position((data_table_offset + data_offset) as u64);
            let raw = data.read_u32::<LittleEndian>().map_err(|_| short(block))?;
            format!("0x{raw:08X}")
        } else {
            let start = data_table_offset + data_offset;
            let end = start + len.saturating_sub(1);
            let bytes = block.get(start..end).ok_or(PkgError::Truncated {
                what: "parameter value",
                offset: start as u64,
                need: len.saturating_sub(1),
                have: block.len() as u64,
            })?;
            String::from_utf8_lossy(bytes).into_owned()
        };

        params.push(SfoParameter { name, value });
    }

    Ok(params)
}

fn short(block: &[u8]) -> PkgError {
    PkgError::Truncated {
        what: "parameter block",
        offset: 0,
        need: 0x14,
        have: block.len() as u64,
    }
}
