//! Column schema and per-column comparators
//!
//! The column order is part of the persisted surface: existing columns must
//! never be reordered or removed, new columns are appended at the end.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Number of declared columns.
pub const COLUMN_COUNT: usize = 15;

/// One column of the display schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Column {
    /// Ascending order in which archives were added in the current session.
    Index,
    Path,
    Directory,
    Filename,
    Title,
    TitleId,
    Region,
    Type,
    Version,
    Backport,
    Sdk,
    Firmware,
    Size,
    ReleaseTags,
    CompatibilityChecksum,
}

impl Column {
    pub const ALL: [Column; COLUMN_COUNT] = [
        Column::Index,
        Column::Path,
        Column::Directory,
        Column::Filename,
        Column::Title,
        Column::TitleId,
        Column::Region,
        Column::Type,
        Column::Version,
        Column::Backport,
        Column::Sdk,
        Column::Firmware,
        Column::Size,
        Column::ReleaseTags,
        Column::CompatibilityChecksum,
    ];

    /// Position of this column in the fixed schema.
    pub fn ordinal(self) -> usize {
        Self::ALL.iter().position(|c| *c == self).unwrap_or(0)
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Column::Index => "Index",
            Column::Path => "Path",
            Column::Directory => "Directory",
            Column::Filename => "File name",
            Column::Title => "Title",
            Column::TitleId => "Title ID",
            Column::Region => "Region",
            Column::Type => "Type",
            Column::Version => "Version",
            Column::Backport => "Backport",
            Column::Sdk => "SDK",
            Column::Firmware => "Firmware",
            Column::Size => "Size",
            Column::ReleaseTags => "Release",
            Column::CompatibilityChecksum => "Compatibility checksum",
        }
    }

    /// Resolve a column from a user-supplied name (CLI sort argument).
    pub fn from_arg(name: &str) -> Option<Column> {
        let lowered = name.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.display_name().to_lowercase() == lowered || format!("{c:?}").to_lowercase() == lowered)
    }

    pub fn comparator(self) -> Comparator {
        match self {
            Column::Index => Comparator::Stamp,
            Column::Path
            | Column::Directory
            | Column::Filename
            | Column::Title
            | Column::TitleId
            | Column::Region
            | Column::Type
            | Column::ReleaseTags
            | Column::CompatibilityChecksum => Comparator::Text,
            Column::Version | Column::Sdk | Column::Firmware => Comparator::Number,
            Column::Backport => Comparator::Flag,
            Column::Size => Comparator::Size,
        }
    }
}

/// Comparison strategy over formatted cell strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    /// Numeric comparison of the session stamp; the "natural" order.
    Stamp,
    /// Case-insensitive lexicographic.
    Text,
    /// Longer string first: a check mark sorts before an empty cell.
    Flag,
    /// Floating-point with unparseable values ordered last.
    Number,
    /// Human-readable sizes normalized to a common kilobyte figure.
    Size,
}

impl Comparator {
    pub fn compare(self, a: &str, b: &str) -> Ordering {
        match self {
            Comparator::Stamp => stamp_value(a).cmp(&stamp_value(b)),
            Comparator::Text => a.to_lowercase().cmp(&b.to_lowercase()),
            Comparator::Flag => b.len().cmp(&a.len()),
            Comparator::Number => compare_numbers(a, b),
            Comparator::Size => size_in_kb(a).cmp(&size_in_kb(b)),
        }
    }
}

fn stamp_value(cell: &str) -> i64 {
    cell.parse::<i64>().unwrap_or(i64::MAX)
}

/// Unparseable values order last via a MAX sentinel; when both sides fail to
/// parse the raw bytes decide.
fn compare_numbers(a: &str, b: &str) -> Ordering {
    let fa = a.parse::<f64>().unwrap_or(f64::MAX);
    match b.parse::<f64>() {
        Ok(fb) => fa.partial_cmp(&fb).unwrap_or(Ordering::Equal),
        Err(_) if fa == f64::MAX => a.as_bytes().cmp(b.as_bytes()),
        Err(_) => Ordering::Less,
    }
}

/// Normalize `"1.23 GB"` / `"500 MB"` / `"62 KB"` to a common kilobyte
/// figure: drop the decimal separator, then scale by the unit suffix.
fn size_in_kb(cell: &str) -> i64 {
    let mut tokens = cell.split_whitespace();
    let number = tokens.next().unwrap_or("").replace('.', "");
    let scaled = match tokens.next() {
        Some("GB") => format!("{number}000000"),
        Some("MB") => format!("{number}000"),
        _ => number,
    };
    scaled.parse::<i64>().unwrap_or(0)
}

/// Sort direction for an explicit column sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Active ordering of the index: natural (session stamp) or by column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    /// Session insertion order (the Index column, ascending).
    Natural,
    By {
        column: Column,
        direction: SortDirection,
    },
}

impl Default for SortOrder {
    fn default() -> Self {
        SortOrder::Natural
    }
}

impl SortOrder {
    pub(crate) fn key(self) -> (Column, SortDirection) {
        match self {
            SortOrder::Natural => (Column::Index, SortDirection::Ascending),
            SortOrder::By { column, direction } => (column, direction),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_comparator_ignores_case() {
        assert_eq!(Comparator::Text.compare("alpha", "ALPHA"), Ordering::Equal);
        assert_eq!(Comparator::Text.compare("Alpha", "beta"), Ordering::Less);
    }

    #[test]
    fn test_flag_comparator_puts_check_marks_first() {
        assert_eq!(Comparator::Flag.compare("\u{2713}", ""), Ordering::Less);
        assert_eq!(Comparator::Flag.compare("", ""), Ordering::Equal);
    }

    #[test]
    fn test_number_comparator_orders_unparseable_last() {
        assert_eq!(Comparator::Number.compare("1.05", "10.5"), Ordering::Less);
        assert_eq!(Comparator::Number.compare("1.05", "[N/A]"), Ordering::Less);
        assert_eq!(Comparator::Number.compare("[N/A]", "1.05"), Ordering::Greater);
        assert_eq!(Comparator::Number.compare("?", "?"), Ordering::Equal);
    }

    #[test]
    fn test_size_comparator_normalizes_units() {
        assert_eq!(Comparator::Size.compare("999 KB", "1 MB"), Ordering::Less);
        assert_eq!(Comparator::Size.compare("1.50 GB", "900 MB"), Ordering::Greater);
        assert_eq!(Comparator::Size.compare("1.05 GB", "1.50 GB"), Ordering::Less);
    }

    #[test]
    fn test_column_from_arg() {
        assert_eq!(Column::from_arg("size"), Some(Column::Size));
        assert_eq!(Column::from_arg("Title ID"), Some(Column::TitleId));
        assert_eq!(Column::from_arg("bogus"), None);
    }
}
