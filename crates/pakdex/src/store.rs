//! Persisted metadata store
//!
//! Records are written as an ordered sequence of self-describing JSON lines
//! so the file survives schema growth: a record missing the current schema
//! version loads its legacy fields and leaves new fields at their defaults
//! instead of failing the whole file.

use anyhow::{Context, Result};
use pakdex_format::PkgMetadata;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Current store schema version.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    #[serde(default)]
    schema_version: u32,
    record: PkgMetadata,
}

/// Ordered metadata persistence in a single file.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    path: PathBuf,
}

impl MetadataStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all records in their stored order. A missing file is an empty
    /// store; a corrupt line ends the load with whatever was read so far.
    pub fn load(&self) -> Result<Vec<PkgMetadata>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = std::fs::File::open(&self.path)
            .with_context(|| format!("Failed to open store {}", self.path.display()))?;

        let mut records = Vec::new();
        for (number, line) in BufReader::new(file).lines().enumerate() {
            let line = line.with_context(|| format!("Failed to read store line {number}"))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<StoredRecord>(&line) {
                Ok(stored) => {
                    if stored.schema_version > SCHEMA_VERSION {
                        warn!(
                            line = number,
                            version = stored.schema_version,
                            "record written by a newer version, loading known fields"
                        );
                    }
                    records.push(stored.record);
                }
                Err(error) => {
                    warn!(line = number, %error, "corrupt store record, stopping load");
                    break;
                }
            }
        }
        info!(count = records.len(), path = %self.path.display(), "loaded metadata store");
        Ok(records)
    }

    /// Write all records in order, atomically replacing the previous file.
    pub fn save<'a, I>(&self, records: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a PkgMetadata>,
    {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let temp_path = self.path.with_extension("jsonl.tmp");
        let file = std::fs::File::create(&temp_path)
            .with_context(|| format!("Failed to create {}", temp_path.display()))?;
        let mut writer = BufWriter::new(file);

        let mut count = 0usize;
        for record in records {
            let stored = StoredRecord {
                schema_version: SCHEMA_VERSION,
                record: record.clone(),
            };
            let line = serde_json::to_string(&stored).context("Failed to encode record")?;
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
            count += 1;
        }
        writer.flush()?;
        drop(writer);

        std::fs::rename(&temp_path, &self.path)
            .with_context(|| format!("Failed to replace store {}", self.path.display()))?;
        info!(count, path = %self.path.display(), "saved metadata store");
        Ok(())
    }
}
