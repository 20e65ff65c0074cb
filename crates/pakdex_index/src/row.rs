//! Display-row formatting
//!
//! A [`DisplayRow`] is the fixed-schema projection of one metadata record:
//! one formatted string per declared column, derived deterministically from
//! the record, the session's insertion stamp and an immutable
//! [`FormatConfig`] snapshot. Formatting never reads process-wide state, so
//! it stays pure and testable.

use crate::column::{Column, COLUMN_COUNT};
use pakdex_format::PkgMetadata;

/// Placeholder for cells whose source data is absent.
pub const DATA_MISSING: &str = "[N/A]";

/// Check mark used by the Backport column.
const CHECK_MARK: &str = "\u{2713}";

/// Release group tags shipped with the application.
const BUILTIN_RELEASE_GROUPS: &[&str] = &[
    "AUGETY", "BigBlueBox", "BlaZe", "CAF", "DarKmooN", "DUPLEX", "GCMR", "HOODLUM", "iNTERNAL",
    "JRP", "KOTF", "LeveLUp", "LiGHTFORCE", "MarvTM", "MOEMOE", "PiKMiN", "Playable", "PRELUDE",
    "PROTOCOL", "RESPAWN", "SharpHD", "TCD", "UNLiMiTED", "WaLMaRT", "WaYsTeD",
];

/// Release tags shipped with the application.
const BUILTIN_RELEASES: &[&str] = &[
    "Arczi", "CyB1K", "Fugazi", "Golemnight", "High Speed", "OPOISSO893", "RetroGamer_74",
    "SeanP2500", "TKJ13", "VikaCaptive", "Whitehawkx",
];

/// Immutable formatter configuration: the combined release tag lists.
///
/// Built once from the application config and handed to the worker at
/// spawn; user-provided tags extend the built-in lists, and a user tag that
/// differs only in capitalization overrides the built-in spelling.
#[derive(Debug, Clone)]
pub struct FormatConfig {
    pub release_groups: Vec<String>,
    pub releases: Vec<String>,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self::with_user_tags(&[], &[])
    }
}

impl FormatConfig {
    pub fn with_user_tags(user_groups: &[String], user_releases: &[String]) -> Self {
        Self {
            release_groups: merge_tags(BUILTIN_RELEASE_GROUPS, user_groups),
            releases: merge_tags(BUILTIN_RELEASES, user_releases),
        }
    }
}

fn merge_tags(builtin: &[&str], user: &[String]) -> Vec<String> {
    let mut combined: Vec<String> = builtin.iter().map(|t| t.to_string()).collect();
    'user: for tag in user {
        if tag.is_empty() {
            continue;
        }
        for existing in combined.iter_mut() {
            if existing.to_lowercase() == tag.to_lowercase() {
                *existing = tag.clone();
                continue 'user;
            }
        }
        combined.push(tag.clone());
    }
    combined
}

/// Fixed-schema array of formatted cells, one per declared column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayRow {
    cells: [String; COLUMN_COUNT],
}

impl DisplayRow {
    pub fn cell(&self, column: Column) -> &str {
        &self.cells[column.ordinal()]
    }

    pub fn cells(&self) -> &[String; COLUMN_COUNT] {
        &self.cells
    }

    pub(crate) fn set_cell(&mut self, column: Column, value: String) {
        self.cells[column.ordinal()] = value;
    }
}

/// Format one record into its display row.
pub fn format_row(pkg: &PkgMetadata, stamp: u64, config: &FormatConfig) -> DisplayRow {
    let title = pkg.sfo("TITLE").unwrap_or(DATA_MISSING).to_string();
    let title_id = pkg.sfo("TITLE_ID").unwrap_or(DATA_MISSING).to_string();

    let region = match pkg.header.content_id.chars().next() {
        Some('E') => "Europe",
        Some('H') => "Asia",
        Some('I') => "World",
        Some('J') => "Japan",
        Some('U') => "USA",
        _ => "Unknown",
    };

    let version = format_version(pkg);
    let pkg_type = format_type(pkg);

    let (sdk, firmware) = if pkg_type == "DLC" {
        (String::new(), String::new())
    } else {
        (format_sdk(pkg), format_firmware(pkg))
    };

    let filename_lower = pkg.filename.to_lowercase();
    let changelog_lower = pkg.changelog.as_deref().map(|c| c.to_lowercase());

    let backport = if sdk == "5.05"
        || filename_lower.contains("bp")
        || filename_lower.contains("backport")
        || changelog_lower
            .as_deref()
            .is_some_and(|c| c.contains("backport"))
    {
        CHECK_MARK.to_string()
    } else {
        String::new()
    };

    let release_tags = format_release_tags(config, &filename_lower, changelog_lower.as_deref());

    let size = format_size(pkg.header.pkg_size);
    let checksum = pkg.compatibility_checksum().unwrap_or("").to_string();

    DisplayRow {
        cells: [
            stamp.to_string(),
            pkg.path.clone(),
            pkg.directory.clone(),
            pkg.filename.clone(),
            title,
            title_id,
            region.to_string(),
            pkg_type,
            version,
            backport,
            sdk,
            firmware,
            size,
            release_tags,
            checksum,
        ],
    }
}

/// Prefer the changelog's most-current version, then the SFO fields; a
/// single leading zero is stripped for display.
fn format_version(pkg: &PkgMetadata) -> String {
    let version = pkg
        .changelog_version()
        .or_else(|| pkg.sfo("APP_VER"))
        .or_else(|| pkg.sfo("VERSION"));
    match version {
        None => DATA_MISSING.to_string(),
        Some(v) if v.len() > 1 && v.starts_with('0') => v[1..].to_string(),
        Some(v) => v.to_string(),
    }
}

fn format_type(pkg: &PkgMetadata) -> String {
    match pkg.sfo("CATEGORY") {
        None => DATA_MISSING.to_string(),
        Some(category) if category.starts_with("gd") => "App".to_string(),
        Some(category) if category.starts_with("gp") => "Patch".to_string(),
        Some("ac") => "DLC".to_string(),
        Some(_) => "Other".to_string(),
    }
}

/// SDK version from PUBTOOLINFO's `sdk_ver=` field: two-digit major (leading
/// zero stripped) and two-digit minor.
fn format_sdk(pkg: &PkgMetadata) -> String {
    let Some(pubtoolinfo) = pkg.sfo("PUBTOOLINFO") else {
        return "?".to_string();
    };
    let Some(index) = pubtoolinfo.find("sdk_ver=") else {
        return "?".to_string();
    };
    let start = index + "sdk_ver=".len();
    let skip = usize::from(pubtoolinfo[start..].starts_with('0'));
    match (
        pubtoolinfo.get(start + skip..start + 2),
        pubtoolinfo.get(start + 2..start + 4),
    ) {
        (Some(major), Some(minor)) => format!("{major}.{minor}"),
        _ => "?".to_string(),
    }
}

/// Firmware version from SYSTEM_VER's fixed-width hex rendering
/// (`0x05050000` reads as firmware 5.05).
fn format_firmware(pkg: &PkgMetadata) -> String {
    let Some(system_ver) = pkg.sfo("SYSTEM_VER") else {
        return "?".to_string();
    };
    let major = if system_ver.get(2..3) == Some("0") {
        system_ver.get(3..4)
    } else {
        system_ver.get(2..4)
    };
    match (major, system_ver.get(4..6)) {
        (Some(major), Some(minor)) => format!("{major}.{minor}"),
        _ => "?".to_string(),
    }
}

fn format_release_tags(
    config: &FormatConfig,
    filename_lower: &str,
    changelog_lower: Option<&str>,
) -> String {
    let mut tags = String::new();
    for group in &config.release_groups {
        if filename_lower.contains(&group.to_lowercase()) {
            if !tags.is_empty() {
                tags.push_str(", ");
            }
            tags.push_str(group);
        }
    }
    for release in &config.releases {
        let lowered = release.to_lowercase();
        if filename_lower.contains(&lowered)
            || changelog_lower.is_some_and(|c| c.contains(&lowered))
        {
            if !tags.is_empty() {
                tags.push_str(", ");
            }
            tags.push_str(release);
        }
    }
    tags
}

/// Humanize a byte count with decimal units, matching the size comparator's
/// expectations: two decimals for GB, whole numbers below that.
fn format_size(bytes: u64) -> String {
    if bytes > 1_000_000_000 {
        format!("{:.2} GB", bytes as f64 / 1_000_000_000.0)
    } else if bytes > 1_000_000 {
        format!("{} MB", bytes / 1_000_000)
    } else {
        format!("{} KB", bytes / 1_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pakdex_format::{PkgHeader, SfoParameter};

    fn record(params: &[(&str, &str)]) -> PkgMetadata {
        PkgMetadata {
            path: "/data/Example.Game.DUPLEX.pkg".to_string(),
            directory: "/data".to_string(),
            filename: "Example.Game.DUPLEX.pkg".to_string(),
            header: PkgHeader {
                content_id: "UP0000-TEST00000_00-0000000000000000".to_string(),
                pkg_size: 1_234_567_890,
                ..PkgHeader::default()
            },
            params: params
                .iter()
                .map(|(name, value)| SfoParameter {
                    name: name.to_string(),
                    value: value.to_string(),
                })
                .collect(),
            ..PkgMetadata::default()
        }
    }

    #[test]
    fn test_format_row_basic_fields() {
        let pkg = record(&[
            ("TITLE", "Example Game"),
            ("TITLE_ID", "TEST00000"),
            ("CATEGORY", "gd"),
            ("APP_VER", "01.00"),
            ("PUBTOOLINFO", "c_date=20240101,sdk_ver=07000001"),
            ("SYSTEM_VER", "0x07000000"),
        ]);
        let row = format_row(&pkg, 42, &FormatConfig::default());

        assert_eq!(row.cell(Column::Index), "42");
        assert_eq!(row.cell(Column::Title), "Example Game");
        assert_eq!(row.cell(Column::TitleId), "TEST00000");
        assert_eq!(row.cell(Column::Region), "USA");
        assert_eq!(row.cell(Column::Type), "App");
        assert_eq!(row.cell(Column::Version), "1.00");
        assert_eq!(row.cell(Column::Sdk), "7.00");
        assert_eq!(row.cell(Column::Firmware), "7.00");
        assert_eq!(row.cell(Column::Size), "1.23 GB");
        assert_eq!(row.cell(Column::ReleaseTags), "DUPLEX");
    }

    #[test]
    fn test_missing_sfo_fields_use_placeholders() {
        let pkg = record(&[]);
        let row = format_row(&pkg, 0, &FormatConfig::default());
        assert_eq!(row.cell(Column::Title), DATA_MISSING);
        assert_eq!(row.cell(Column::TitleId), DATA_MISSING);
        assert_eq!(row.cell(Column::Type), DATA_MISSING);
        assert_eq!(row.cell(Column::Version), DATA_MISSING);
        assert_eq!(row.cell(Column::Sdk), "?");
        assert_eq!(row.cell(Column::Firmware), "?");
    }

    #[test]
    fn test_dlc_rows_leave_sdk_and_firmware_empty() {
        let pkg = record(&[("CATEGORY", "ac"), ("SYSTEM_VER", "0x05050000")]);
        let row = format_row(&pkg, 0, &FormatConfig::default());
        assert_eq!(row.cell(Column::Type), "DLC");
        assert_eq!(row.cell(Column::Sdk), "");
        assert_eq!(row.cell(Column::Firmware), "");
    }

    #[test]
    fn test_backport_detection_from_sdk() {
        let pkg = record(&[
            ("CATEGORY", "gp"),
            ("PUBTOOLINFO", "sdk_ver=05050000"),
        ]);
        let row = format_row(&pkg, 0, &FormatConfig::default());
        assert_eq!(row.cell(Column::Sdk), "5.05");
        assert_eq!(row.cell(Column::Backport), CHECK_MARK);
    }

    #[test]
    fn test_backport_detection_from_changelog() {
        let mut pkg = record(&[("CATEGORY", "gp")]);
        pkg.filename = "patch.pkg".to_string();
        pkg.path = "/data/patch.pkg".to_string();
        pkg.changelog = Some("Backport to 9.00 by someone".to_string());
        let row = format_row(&pkg, 0, &FormatConfig::default());
        assert_eq!(row.cell(Column::Backport), CHECK_MARK);
    }

    #[test]
    fn test_user_tags_extend_and_override() {
        let config = FormatConfig::with_user_tags(
            &["duplex".to_string(), "NEWGROUP".to_string()],
            &[],
        );
        assert!(config.release_groups.contains(&"duplex".to_string()));
        assert!(!config.release_groups.contains(&"DUPLEX".to_string()));
        assert!(config.release_groups.contains(&"NEWGROUP".to_string()));
    }

    #[test]
    fn test_release_from_changelog() {
        let mut pkg = record(&[]);
        pkg.filename = "clean.pkg".to_string();
        pkg.changelog = Some("Repack by CyB1K".to_string());
        let row = format_row(&pkg, 0, &FormatConfig::default());
        assert_eq!(row.cell(Column::ReleaseTags), "CyB1K");
    }

    #[test]
    fn test_size_units() {
        assert_eq!(format_size(62_000), "62 KB");
        assert_eq!(format_size(500_000_000), "500 MB");
        assert_eq!(format_size(2_500_000_000), "2.50 GB");
    }
}
