//! On-disk snapshot of learned mappings
//!
//! The first line holds the format version. Version 1 follows with one JSON
//! object per mapping:
//!
//! ```text
//! 1
//! {"LHS":"www.example.com","RHS":"cdn.example.net","Expiry":"2024-01-01T10:00:00Z","Type":"name"}
//! {"LHS":"cdn.example.net","RHS":"192.0.2.10","Expiry":"2024-01-01T10:00:00Z","Type":"ip"}
//! ```
//!
//! Saves go to a temporary file that is renamed over the real one, so a
//! failed save never damages the previous snapshot.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_derive::{Deserialize, Serialize};

use crate::dns::cache::Mapping;
use crate::dns::errors::{Result, StoreError};

pub const FORMAT_VERSION: &str = "1";

const TYPE_IP: &str = "ip";
const TYPE_NAME: &str = "name";

/// Mappings with this little life left are not worth restoring.
const MIN_REMAINING: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct MappingV1 {
    #[serde(rename = "LHS")]
    lhs: String,
    #[serde(rename = "RHS")]
    rhs: String,
    #[serde(rename = "Expiry")]
    expiry: String,
    #[serde(rename = "Type")]
    kind: String,
}

/// A mapping read back from disk, ready to be stored again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredMapping {
    pub name: String,
    pub value: String,
    pub ttl: Duration,
    pub is_alias: bool,
}

fn temp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// Writes `mappings` to `path` in the current format.
pub fn save(path: &Path, mappings: &[Mapping]) -> Result<()> {
    log::debug!("Saving DNS mappings to {}", path.display());

    let tmp = temp_path(path);
    {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        writeln!(writer, "{}", FORMAT_VERSION)?;

        for mapping in mappings {
            let record = MappingV1 {
                lhs: mapping.name.clone(),
                rhs: mapping.value.clone(),
                expiry: mapping.expiry.to_rfc3339_opts(SecondsFormat::Secs, true),
                kind: (if mapping.is_alias { TYPE_NAME } else { TYPE_IP }).to_string(),
            };
            serde_json::to_writer(&mut writer, &record)?;
            writer.write_all(b"\n")?;
        }

        writer.flush()?;
    }

    fs::rename(&tmp, path)?;
    log::debug!("Finished saving {} DNS mappings", mappings.len());

    Ok(())
}

/// Reads the snapshot at `path`, keeping only mappings that still have more
/// than a second to live at `now`.
pub fn load(path: &Path, now: DateTime<Utc>) -> Result<Vec<RestoredMapping>> {
    let reader = BufReader::new(File::open(path)?);
    let mut lines = reader.lines();

    let version = match lines.next() {
        Some(line) => line?,
        None => return Ok(Vec::new()),
    };

    match version.trim() {
        FORMAT_VERSION => {
            log::info!("Read mappings in v{} format", FORMAT_VERSION);
            load_v1(lines, now)
        }
        other => Err(StoreError::UnsupportedVersion {
            version: other.to_string(),
        }),
    }
}

fn load_v1<I>(lines: I, now: DateTime<Utc>) -> Result<Vec<RestoredMapping>>
where
    I: Iterator<Item = std::io::Result<String>>,
{
    let mut restored = Vec::new();

    for line in lines {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let record: MappingV1 = serde_json::from_str(&line)?;
        let expiry = DateTime::parse_from_rfc3339(&record.expiry)?.with_timezone(&Utc);

        let remaining = match (expiry - now).to_std() {
            Ok(remaining) if remaining > MIN_REMAINING => remaining,
            _ => {
                log::debug!("Ignore expired mapping {:?}", record);
                continue;
            }
        };

        log::debug!("Recreate mapping {:?}", record);
        // Older snapshots may hold mixed-case names.
        restored.push(RestoredMapping {
            name: record.lhs.to_lowercase(),
            value: record.rhs.to_lowercase(),
            ttl: remaining,
            is_alias: record.kind == TYPE_NAME,
        });
    }

    Ok(restored)
}
