//! Command history — timestamped entries with plain-text persistence.
//!
//! The on-disk format is one entry per line; timestamps are not
//! persisted. History is append-only through the public editor API, and
//! the editor tracks a dirty flag so embedders can save only when
//! something changed.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// One remembered input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub entry: String,
    /// Unix seconds at the time the entry was added.
    pub timestamp: i64,
}

impl HistoryEntry {
    /// A new entry stamped with the current time.
    #[must_use]
    pub fn now(entry: String) -> Self {
        #[allow(clippy::cast_possible_wrap)] // Unix seconds fit i64 for eons.
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs() as i64);
        Self { entry, timestamp }
    }
}

/// Read a plain-text history file, one entry per line.
pub(crate) fn load_entries(path: &Path) -> io::Result<Vec<String>> {
    let reader = BufReader::new(File::open(path)?);
    reader.lines().collect()
}

/// Write entries as plain text, one per line.
pub(crate) fn save_entries(path: &Path, entries: &[HistoryEntry]) -> io::Result<()> {
    let mut file = File::create(path)?;
    for entry in entries {
        writeln!(file, "{}", entry.entry)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_round_trip_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history");

        let entries = vec![
            HistoryEntry::now("ls -la".into()),
            HistoryEntry::now("cargo check".into()),
        ];
        save_entries(&path, &entries).unwrap();

        let loaded = load_entries(&path).unwrap();
        assert_eq!(loaded, vec!["ls -la".to_string(), "cargo check".to_string()]);
    }

    #[test]
    fn empty_history_saves_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history");
        save_entries(&path, &[]).unwrap();
        assert_eq!(load_entries(&path).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_entries(&dir.path().join("absent")).is_err());
    }

    #[test]
    fn timestamps_are_recent() {
        let entry = HistoryEntry::now("x".into());
        assert!(entry.timestamp > 1_600_000_000);
    }
}
