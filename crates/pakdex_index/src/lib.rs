//! Column schema, display-row formatting and the always-sorted live index.
//!
//! The index side of the pipeline is single-context by design: only the
//! consumer drains worker and watcher events into [`SortedIndex`], so the
//! backing and visible collections need no locking and the live view never
//! tears.

pub mod column;
pub mod index;
pub mod row;

pub use column::{Column, Comparator, SortDirection, SortOrder, COLUMN_COUNT};
pub use index::{IndexedPkg, SortedIndex};
pub use row::{format_row, DisplayRow, FormatConfig, DATA_MISSING};
