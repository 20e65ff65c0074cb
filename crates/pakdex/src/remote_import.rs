//! Remote archive import
//!
//! Discovers installed archives on a remote device over FTP and feeds
//! prebuilt records into the ingestion queue. Only the metadata region of
//! each remote file is transferred: the fixed header prefix first, to learn
//! how far the metadata reaches, then exactly that many bytes.

use anyhow::{bail, Context, Result};
use byteorder::{BigEndian, ReadBytesExt};
use pakdex_format::{PkgMetadata, HEADER_LEN};
use pakdex_ingest::{CancelToken, IngestionQueue, IngestionRequest};
use pakdex_remote::{Connect, FtpClient};
use regex::Regex;
use std::io::Cursor;
use tracing::{info, warn};

/// Directory name shape of installed titles.
const TITLE_DIR_PATTERN: &str = "^[A-Z]{4}[0-9]{5}$";

/// Where installed archives live, on internal and extended storage.
const APP_ROOTS: [&str; 2] = ["/user/app", "/mnt/ext0/user/app"];
const PATCH_ROOTS: [&str; 2] = ["/user/patch", "/mnt/ext0/user/patch"];
const ADDCONT_ROOTS: [&str; 2] = ["/user/addcont", "/mnt/ext0/user/addcont"];

/// Outcome counters of one import run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportStats {
    pub found: usize,
    pub imported: usize,
    pub failed: usize,
}

/// Enumerate every archive on the remote device and queue a prebuilt record
/// for each. Per-file failures are logged and skipped; connection-level
/// failures abort the run and surface once to the caller.
pub fn import_remote(
    host: &str,
    port: u16,
    queue: &IngestionQueue,
    cancel: &CancelToken,
) -> Result<ImportStats> {
    let mut client = match FtpClient::connect(host, port)
        .with_context(|| format!("Failed to connect to {host}:{port}"))?
    {
        Connect::Ready(client) => client,
        Connect::TemporarilyUnavailable => bail!("{host}:{port} is temporarily unavailable"),
    };

    let result = run_import(&mut client, host, port, queue, cancel);
    client.disconnect();
    result
}

fn run_import(
    client: &mut FtpClient,
    host: &str,
    port: u16,
    queue: &IngestionQueue,
    cancel: &CancelToken,
) -> Result<ImportStats> {
    client.login_anonymous().context("Login failed")?;
    client.set_binary(true).context("Could not enter binary mode")?;

    let title_dir = Regex::new(TITLE_DIR_PATTERN).context("Invalid title pattern")?;

    info!(host, port, "searching for installed archives");
    let mut directories = Vec::new();
    for root in APP_ROOTS.iter().chain(&PATCH_ROOTS) {
        directories.extend(client.list_directories(root, Some(&title_dir))?);
    }
    // Add-on content nests one level deeper: title directory, then one
    // directory per content item.
    for root in &ADDCONT_ROOTS {
        for title in client.list_directories(root, Some(&title_dir))? {
            directories.extend(client.list_directories(&title, None)?);
        }
    }

    let mut files = Vec::new();
    for directory in &directories {
        files.extend(client.list_files(directory, ".pkg")?);
    }
    info!(count = files.len(), "remote archives found");

    let prefix = format!("ftp://{host}:{port}");
    let mut stats = ImportStats {
        found: files.len(),
        ..ImportStats::default()
    };

    for file in &files {
        if cancel.is_cancelled() {
            info!("remote import interrupted");
            break;
        }

        match fetch_record(client, &prefix, file) {
            Ok(record) => {
                queue.push(IngestionRequest::Record(Box::new(record)));
                stats.imported += 1;
            }
            Err(error) => {
                warn!(%file, %error, "skipping remote archive");
                stats.failed += 1;
            }
        }
    }

    info!(
        found = stats.found,
        imported = stats.imported,
        failed = stats.failed,
        "remote import finished"
    );
    Ok(stats)
}

/// Download the metadata region of one remote archive and parse it. The
/// header prefix declares how far the entry payloads reach.
fn fetch_record(client: &mut FtpClient, prefix: &str, file: &str) -> Result<PkgMetadata> {
    let header = client.download_prefix(file, HEADER_LEN)?;
    if header.len() < 0x30 {
        bail!("remote file shorter than the archive header");
    }

    let mut cursor = Cursor::new(&header);
    cursor.set_position(0x20);
    let body_offset = cursor.read_u64::<BigEndian>()?;
    let body_size = cursor.read_u64::<BigEndian>()?;
    let metadata_len = body_offset
        .checked_add(body_size)
        .context("implausible metadata region")?;

    let bytes = client.download_prefix(file, metadata_len)?;
    let mut record = PkgMetadata::from_bytes(&bytes)?;
    record.locate_remote(prefix, file);
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn test_title_dir_pattern() {
        let pattern = Regex::new(TITLE_DIR_PATTERN).unwrap();
        assert!(pattern.is_match("CUSA12345"));
        assert!(pattern.is_match("TEST00000"));
        assert!(!pattern.is_match("cusa12345"));
        assert!(!pattern.is_match("CUSA1234"));
        assert!(!pattern.is_match("XCUSA12345X"));
    }
}
