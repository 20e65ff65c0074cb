//! The always-sorted, filterable live collection
//!
//! The backing sequence holds every (record, row) pair in the active sort
//! order; the visible projection holds the backing positions of rows that
//! pass the active filter. Both are touched only from the consumer context.

use crate::column::{Column, SortDirection, SortOrder};
use crate::row::DisplayRow;
use pakdex_format::PkgMetadata;
use std::cmp::Ordering;
use tracing::debug;

/// One indexed archive: the parsed record and its formatted row.
#[derive(Debug, Clone)]
pub struct IndexedPkg {
    pub record: PkgMetadata,
    pub row: DisplayRow,
}

/// Always-sorted backing collection plus a filtered visible projection.
#[derive(Debug, Default)]
pub struct SortedIndex {
    backing: Vec<IndexedPkg>,
    /// Backing positions of rows passing the filter, in display order.
    visible: Vec<usize>,
    order: SortOrder,
    filter: Option<String>,
}

impl SortedIndex {
    pub fn new() -> Self {
        Self {
            backing: Vec::new(),
            visible: Vec::new(),
            order: SortOrder::Natural,
            filter: None,
        }
    }

    pub fn len(&self) -> usize {
        self.backing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backing.is_empty()
    }

    pub fn order(&self) -> SortOrder {
        self.order
    }

    pub fn items(&self) -> &[IndexedPkg] {
        &self.backing
    }

    /// Rows currently passing the filter, in display order.
    pub fn visible(&self) -> impl Iterator<Item = &IndexedPkg> {
        self.visible.iter().map(|&index| &self.backing[index])
    }

    /// Insert a new record or replace the record with the same path.
    ///
    /// A replace overwrites in place, preserving the backing position
    /// relative to other records; the visible projection is refreshed only
    /// when the row is currently shown. A new record is inserted at the
    /// position the active comparator and direction dictate.
    pub fn upsert(&mut self, record: PkgMetadata, row: DisplayRow) {
        if let Some(position) = self
            .backing
            .iter()
            .position(|item| item.record.path == record.path)
        {
            debug!(path = %record.path, "replacing indexed record");
            self.backing[position] = IndexedPkg { record, row };
            return;
        }

        let (column, direction) = self.order.key();
        let comparator = column.comparator();
        let new_key = row.cell(column);

        let position = match direction {
            SortDirection::Descending => self
                .backing
                .iter()
                .position(|item| {
                    comparator.compare(new_key, item.row.cell(column)) != Ordering::Less
                })
                .unwrap_or(self.backing.len()),
            SortDirection::Ascending => self
                .backing
                .iter()
                .position(|item| {
                    comparator.compare(new_key, item.row.cell(column)) == Ordering::Less
                })
                .unwrap_or(self.backing.len()),
        };

        // The visible insertion point is computed independently, over
        // visible rows only, before backing positions shift.
        let visible_position = if self.matches_filter(&row) {
            let position = match direction {
                SortDirection::Descending => self
                    .visible
                    .iter()
                    .position(|&index| {
                        comparator.compare(new_key, self.backing[index].row.cell(column))
                            != Ordering::Less
                    })
                    .unwrap_or(self.visible.len()),
                SortDirection::Ascending => self
                    .visible
                    .iter()
                    .position(|&index| {
                        comparator.compare(new_key, self.backing[index].row.cell(column))
                            == Ordering::Less
                    })
                    .unwrap_or(self.visible.len()),
            };
            Some(position)
        } else {
            None
        };

        for index in self.visible.iter_mut() {
            if *index >= position {
                *index += 1;
            }
        }
        self.backing.insert(position, IndexedPkg { record, row });
        if let Some(visible_position) = visible_position {
            self.visible.insert(visible_position, position);
        }
    }

    /// Remove the record with exactly this path.
    pub fn remove_path(&mut self, path: &str) -> bool {
        let Some(position) = self
            .backing
            .iter()
            .position(|item| item.record.path == path)
        else {
            return false;
        };
        self.remove_at(position);
        true
    }

    /// Remove every record whose path falls under the given directory.
    pub fn remove_under(&mut self, directory: &str) -> usize {
        let mut removed = 0;
        while let Some(position) = self
            .backing
            .iter()
            .position(|item| item.record.path.starts_with(directory))
        {
            self.remove_at(position);
            removed += 1;
        }
        removed
    }

    /// Drop records whose directory is one of `dirs` and whose backing file
    /// no longer exists. Used by the watcher's synchronization pass after a
    /// root reappears.
    pub fn prune_missing(&mut self, dirs: &[String]) -> usize {
        let mut removed = 0;
        loop {
            let Some(position) = self.backing.iter().position(|item| {
                dirs.iter().any(|dir| item.record.directory == *dir) && !item.record.exists()
            }) else {
                break;
            };
            self.remove_at(position);
            removed += 1;
        }
        removed
    }

    fn remove_at(&mut self, position: usize) {
        self.backing.remove(position);
        self.visible.retain(|&index| index != position);
        for index in self.visible.iter_mut() {
            if *index > position {
                *index -= 1;
            }
        }
    }

    /// Change the active sort order: full re-sort of the backing sequence
    /// and rebuild of the visible projection.
    pub fn set_sort(&mut self, order: SortOrder) {
        self.order = order;
        let (column, direction) = order.key();
        let comparator = column.comparator();
        self.backing.sort_by(|a, b| {
            let ordering = comparator.compare(a.row.cell(column), b.row.cell(column));
            match direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            }
        });
        self.rebuild_visible();
    }

    /// Change the filter: a case-insensitive substring matched against the
    /// file name, title and title id cells.
    pub fn set_filter(&mut self, filter: Option<String>) {
        self.filter = filter.map(|f| f.to_lowercase()).filter(|f| !f.is_empty());
        self.rebuild_visible();
    }

    /// Rewrite the location of every record under a remote origin prefix.
    /// Returns the number of records relocated.
    pub fn relocate_remote(&mut self, old_prefix: &str, new_prefix: &str) -> usize {
        let mut relocated = 0;
        for item in self.backing.iter_mut() {
            if item.record.swap_prefix(old_prefix, new_prefix) {
                item.row
                    .set_cell(Column::Path, item.record.path.clone());
                item.row
                    .set_cell(Column::Directory, item.record.directory.clone());
                relocated += 1;
            }
        }
        relocated
    }

    fn matches_filter(&self, row: &DisplayRow) -> bool {
        let Some(filter) = &self.filter else {
            return true;
        };
        row.cell(Column::Filename).to_lowercase().contains(filter)
            || row.cell(Column::Title).to_lowercase().contains(filter)
            || row.cell(Column::TitleId).to_lowercase().contains(filter)
    }

    fn rebuild_visible(&mut self) {
        self.visible = self
            .backing
            .iter()
            .enumerate()
            .filter(|(_, item)| self.matches_filter(&item.row))
            .map(|(index, _)| index)
            .collect();
    }
}
