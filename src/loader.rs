//! Background loads: the roster read pair and per-slot photo fetches.
//!
//! Loads run on worker threads and post results back over a channel. Roster
//! results are tagged with a load generation; a result whose generation is
//! no longer current is discarded so a slow stale response can never
//! clobber a newer one. Photo results carry the record id and URL they were
//! fetched for, which gives each image slot the same staleness guard.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread;

use serde_json::Value;

use crate::library;
use crate::record::{self, ProfileRecord};
use crate::remote::Directory;

/// The two image slots the UI drives independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoSlotId {
    Avatar,
    Portrait,
}

#[derive(Debug)]
pub enum FetchEvent {
    Roster {
        generation: u64,
        result: Result<Vec<ProfileRecord>, String>,
        /// Secondary-read degradation notice; the roster still loaded.
        warning: Option<String>,
    },
    Photo {
        slot: PhotoSlotId,
        record_id: i64,
        url: String,
        result: Result<Vec<u8>, String>,
    },
}

pub struct Fetcher {
    directory: Arc<dyn Directory>,
    tx: Sender<FetchEvent>,
    rx: Receiver<FetchEvent>,
    generation: u64,
}

impl Fetcher {
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        let (tx, rx) = channel();
        Self {
            directory,
            tx,
            rx,
            generation: 0,
        }
    }

    /// True if a roster result with this tag is still worth applying.
    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }

    /// Start a roster load. Any load still in flight becomes stale; its
    /// result will be discarded on arrival. The underlying requests are not
    /// cancelled, only ignored.
    pub fn request_roster(
        &mut self,
        list_id: String,
        image_library: Option<String>,
        origin: String,
    ) -> u64 {
        self.generation += 1;
        let generation = self.generation;
        let directory = Arc::clone(&self.directory);
        let tx = self.tx.clone();
        thread::spawn(move || {
            let (result, warning) =
                load_roster(directory.as_ref(), &list_id, image_library.as_deref(), &origin);
            let _ = tx.send(FetchEvent::Roster {
                generation,
                result,
                warning,
            });
        });
        generation
    }

    /// Fetch one image for a slot. The caller keeps at most one request in
    /// flight per slot.
    pub fn request_photo(&self, slot: PhotoSlotId, record_id: i64, url: String) {
        let directory = Arc::clone(&self.directory);
        let tx = self.tx.clone();
        thread::spawn(move || {
            let result = directory
                .fetch_image_bytes(&url)
                .map_err(|err| err.to_string());
            let _ = tx.send(FetchEvent::Photo {
                slot,
                record_id,
                url,
                result,
            });
        });
    }

    pub fn try_recv(&self) -> Option<FetchEvent> {
        self.rx.try_recv().ok()
    }
}

/// Issue the two source reads in parallel, then map, index, and merge. A
/// secondary-read failure degrades to a warning and an empty index; a
/// primary failure is the load's error.
pub fn load_roster(
    directory: &dyn Directory,
    list_id: &str,
    image_library: Option<&str>,
    origin: &str,
) -> (Result<Vec<ProfileRecord>, String>, Option<String>) {
    let (primary, secondary) = rayon::join(
        || directory.fetch_profiles(list_id),
        || match image_library {
            Some(id) if !id.trim().is_empty() => directory.fetch_image_entries(id).map(Some),
            _ => Ok(None),
        },
    );

    let rows: Vec<Value> = match primary {
        Ok(rows) => rows,
        Err(err) => return (Err(err.to_string()), None),
    };

    let (entries, warning) = match secondary {
        Ok(entries) => (entries.unwrap_or_default(), None),
        Err(err) => (
            Vec::new(),
            Some(format!("image library unavailable: {err}")),
        ),
    };

    let profiles: Vec<ProfileRecord> = rows
        .iter()
        .map(|row| record::map_record(row, origin))
        .collect();
    let index = library::build_index(&entries, origin);
    let merged = library::merge_photos(&profiles, &index);
    (Ok(merged), warning)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::library::ImageEntry;
    use crate::remote::{DirectoryError, SourceInfo};
    use serde_json::json;

    /// In-memory directory for driving the pipeline offline.
    pub(crate) struct FakeDirectory {
        pub profiles: Result<Vec<Value>, String>,
        pub images: Result<Vec<ImageEntry>, String>,
        pub photo_bytes: Result<Vec<u8>, String>,
    }

    impl Default for FakeDirectory {
        fn default() -> Self {
            Self {
                profiles: Ok(Vec::new()),
                images: Ok(Vec::new()),
                photo_bytes: Err("no photo".to_string()),
            }
        }
    }

    fn shape_err(detail: &str) -> DirectoryError {
        DirectoryError::Shape {
            url: "fake://directory".to_string(),
            detail: detail.to_string(),
        }
    }

    impl Directory for FakeDirectory {
        fn list_sources(&self) -> Result<Vec<SourceInfo>, DirectoryError> {
            Ok(Vec::new())
        }

        fn fetch_profiles(&self, _list_id: &str) -> Result<Vec<Value>, DirectoryError> {
            self.profiles.clone().map_err(|e| shape_err(&e))
        }

        fn fetch_image_entries(&self, _list_id: &str) -> Result<Vec<ImageEntry>, DirectoryError> {
            self.images.clone().map_err(|e| shape_err(&e))
        }

        fn fetch_image_bytes(&self, _url: &str) -> Result<Vec<u8>, DirectoryError> {
            self.photo_bytes.clone().map_err(|e| shape_err(&e))
        }
    }

    const ORIGIN: &str = "https://contoso.example.com";

    fn two_profiles() -> Vec<Value> {
        vec![
            json!({ "Id": 1, "Title": "Ann Lee", "Role": "Engineer" }),
            json!({ "Id": 2, "Title": "Bo Kim", "Role": "Designer" }),
        ]
    }

    #[test]
    fn load_merges_library_photos_by_name() {
        let directory = FakeDirectory {
            profiles: Ok(two_profiles()),
            images: Ok(vec![ImageEntry {
                title: None,
                file_name: Some("ann-lee.jpg".to_string()),
                file_ref: Some("/lib/ann-lee.jpg".to_string()),
            }]),
            ..Default::default()
        };

        let (result, warning) = load_roster(&directory, "list", Some("library"), ORIGIN);
        let roster = result.unwrap();
        assert!(warning.is_none());
        assert_eq!(roster.len(), 2);
        assert_eq!(
            roster[0].photo_url.as_deref(),
            Some("https://contoso.example.com/lib/ann-lee.jpg")
        );
        assert_eq!(roster[1].photo_url, None);
    }

    #[test]
    fn secondary_failure_degrades_to_a_warning() {
        let directory = FakeDirectory {
            profiles: Ok(two_profiles()),
            images: Err("library offline".to_string()),
            ..Default::default()
        };

        let (result, warning) = load_roster(&directory, "list", Some("library"), ORIGIN);
        let roster = result.unwrap();
        assert_eq!(roster.len(), 2, "primary data still renders");
        assert!(roster.iter().all(|p| p.photo_url.is_none()));
        assert!(warning.unwrap().contains("library offline"));
    }

    #[test]
    fn primary_failure_is_the_loads_error() {
        let directory = FakeDirectory {
            profiles: Err("list gone".to_string()),
            ..Default::default()
        };

        let (result, warning) = load_roster(&directory, "list", None, ORIGIN);
        assert!(result.unwrap_err().contains("list gone"));
        assert!(warning.is_none());
    }

    #[test]
    fn absent_library_id_reads_nothing_secondary() {
        let directory = FakeDirectory {
            profiles: Ok(two_profiles()),
            images: Err("library should not be read".to_string()),
            ..Default::default()
        };

        // With no library configured the secondary read is skipped, so its
        // error can never surface.
        let (result, warning) = load_roster(&directory, "list", None, ORIGIN);
        assert!(result.is_ok());
        assert!(warning.is_none());
    }

    #[test]
    fn newer_request_makes_older_generation_stale() {
        let mut fetcher = Fetcher::new(Arc::new(FakeDirectory::default()));
        let first = fetcher.request_roster("a".to_string(), None, ORIGIN.to_string());
        let second = fetcher.request_roster("b".to_string(), None, ORIGIN.to_string());
        assert!(!fetcher.is_current(first));
        assert!(fetcher.is_current(second));
    }
}
