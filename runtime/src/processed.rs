//! File-backed processed-booking guard
//!
//! Persists the ids of bookings whose loyalty spend was already recorded as a
//! JSON array, so the guard survives restarts of the CLI.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use voyage_checkout_core::booking::BookingId;
use voyage_checkout_core::session::ProcessedBookings;

/// [`ProcessedBookings`] stored in a JSON file
///
/// The file is read once on open and rewritten on every append. A write
/// failure is logged; the id stays recorded for the rest of the process.
#[derive(Debug)]
pub struct FileProcessedBookings {
    path: PathBuf,
    ids: Mutex<BTreeSet<i64>>,
}

impl FileProcessedBookings {
    /// Open the store at `path`
    ///
    /// A missing, unreadable or corrupt file is treated as an empty store;
    /// the next append rewrites it.
    #[must_use]
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let ids = match Self::load(&path) {
            Ok(ids) => ids,
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "Could not read processed bookings, starting empty");
                BTreeSet::new()
            },
        };
        tracing::debug!(path = %path.display(), count = ids.len(), "Opened processed-bookings store");
        Self {
            path,
            ids: Mutex::new(ids),
        }
    }

    fn load(path: &Path) -> io::Result<BTreeSet<i64>> {
        match std::fs::read_to_string(path) {
            Ok(content) if content.trim().is_empty() => Ok(BTreeSet::new()),
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(BTreeSet::new()),
            Err(e) => Err(e),
        }
    }

    /// Backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, ids: &BTreeSet<i64>) -> io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string(ids).map_err(io::Error::other)?;
        std::fs::write(&self.path, content)
    }
}

impl ProcessedBookings for FileProcessedBookings {
    fn has_processed(&self, booking_id: BookingId) -> bool {
        self.ids
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains(&booking_id.0)
    }

    fn mark_processed(&self, booking_id: BookingId) {
        let mut ids = self
            .ids
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if ids.insert(booking_id.0) {
            if let Err(error) = self.persist(&ids) {
                tracing::warn!(%booking_id, path = %self.path.display(), %error, "Failed to persist processed booking");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed.json");

        let store = FileProcessedBookings::open(&path);
        assert!(!store.has_processed(BookingId(7)));
        store.mark_processed(BookingId(7));
        store.mark_processed(BookingId(7));
        assert!(store.has_processed(BookingId(7)));

        let reopened = FileProcessedBookings::open(&path);
        assert!(reopened.has_processed(BookingId(7)));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[7]");
    }

    #[test]
    fn creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/nested/processed.json");
        FileProcessedBookings::open(&path).mark_processed(BookingId(1));
        assert!(path.exists());
    }

    #[test]
    fn corrupt_file_starts_empty_and_is_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = FileProcessedBookings::open(&path);
        assert!(!store.has_processed(BookingId(3)));
        store.mark_processed(BookingId(3));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[3]");
    }
}
