use crate::manifest::scan_media_dir;
use harvest_core::{CoreError, HarvestConfig, PostRecord, StoreError};
use serde_json::Value;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

/// Per-hashtag JSON array of posts under the data directory.
#[derive(Debug, Clone)]
pub struct RecordStore {
    config: HarvestConfig,
}

impl RecordStore {
    pub fn new(config: HarvestConfig) -> Self {
        Self { config }
    }

    pub fn dataset_path(&self, hashtag: &str) -> PathBuf {
        self.config.posts_file(hashtag)
    }

    pub fn exists(&self, hashtag: &str) -> bool {
        self.dataset_path(hashtag).is_file()
    }

    pub fn media_dir(&self, hashtag: &str) -> PathBuf {
        self.config.media_dir(hashtag)
    }

    /// Ids of posts whose media already sits in the hashtag's media directory.
    pub fn media_manifest(&self, hashtag: &str) -> Result<HashSet<String>, CoreError> {
        scan_media_dir(&self.media_dir(hashtag))
    }

    /// Modification time of the dataset, `None` if it was never written.
    pub fn last_updated(&self, hashtag: &str) -> Option<SystemTime> {
        fs::metadata(self.dataset_path(hashtag))
            .and_then(|meta| meta.modified())
            .ok()
    }

    /// Load the dataset, or an empty one if none exists yet.
    ///
    /// A file that is not a JSON array of objects with usable ids is
    /// reported as [`StoreError::CorruptData`] and left on disk as is.
    pub fn load(&self, hashtag: &str) -> Result<Vec<PostRecord>, CoreError> {
        let path = self.dataset_path(hashtag);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No dataset for #{} yet", hashtag);
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(StoreError::ReadFailed {
                    path,
                    reason: e.to_string(),
                }
                .into())
            }
        };

        let corrupt = |reason: String| StoreError::CorruptData {
            path: path.clone(),
            reason,
        };

        let values: Vec<Value> =
            serde_json::from_slice(&bytes).map_err(|e| corrupt(e.to_string()))?;
        let records = values
            .into_iter()
            .enumerate()
            .map(|(index, value)| PostRecord::parse(value, index))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| corrupt(e.to_string()))?;

        debug!("Loaded {} records for #{} from {}", records.len(), hashtag, path.display());
        Ok(records)
    }

    /// Replace the dataset wholesale.
    ///
    /// The array is written to a sibling temp file, synced, then renamed over
    /// the dataset, so a crash leaves either the old or the new file.
    pub fn save(&self, hashtag: &str, records: &[PostRecord]) -> Result<(), CoreError> {
        let path = self.dataset_path(hashtag);
        let write_failed = |e: io::Error| StoreError::WriteFailed {
            path: path.clone(),
            reason: e.to_string(),
        };

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(write_failed)?;

        let payload = serde_json::to_vec(records)?;
        let temp_path = dir.join(format!(
            ".{}.{}.tmp",
            self.config.posts_file_name,
            uuid::Uuid::new_v4()
        ));

        let result =
            write_synced(&temp_path, &payload).and_then(|()| fs::rename(&temp_path, &path));
        if let Err(e) = result {
            let _ = fs::remove_file(&temp_path);
            return Err(write_failed(e).into());
        }

        debug!("Saved {} records for #{} to {}", records.len(), hashtag, path.display());
        Ok(())
    }
}

fn write_synced(path: &Path, payload: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(payload)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store_in(dir: &Path) -> RecordStore {
        RecordStore::new(HarvestConfig {
            data_dir: dir.to_path_buf(),
            ..HarvestConfig::default()
        })
    }

    fn record(value: Value) -> PostRecord {
        PostRecord::parse(value, 0).unwrap()
    }

    #[test]
    fn test_load_missing_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_in(tmp.path());

        assert!(store.load("cats").unwrap().is_empty());
        assert!(!store.exists("cats"));
        assert!(store.last_updated("cats").is_none());
    }

    #[test]
    fn test_save_creates_directories_and_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_in(tmp.path());
        let records = vec![
            record(json!({"id": "1", "desc": "first"})),
            record(json!({"id": "2", "textExtra": [{"hashtagName": "cats"}]})),
        ];

        store.save("cats", &records).unwrap();

        assert!(tmp.path().join("cats").join("posts.json").is_file());
        assert_eq!(store.load("cats").unwrap(), records);
        assert!(store.last_updated("cats").is_some());
    }

    #[test]
    fn test_save_leaves_no_temp_files() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_in(tmp.path());

        store.save("cats", &[record(json!({"id": "1"}))]).unwrap();
        store.save("cats", &[record(json!({"id": "2"}))]).unwrap();

        let names: Vec<_> = fs::read_dir(tmp.path().join("cats"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["posts.json"]);
        assert_eq!(store.load("cats").unwrap()[0].id(), "2");
    }

    #[test]
    fn test_truncated_file_is_corrupt_and_preserved() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_in(tmp.path());
        let path = store.dataset_path("cats");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, br#"[{"id": "1"}, {"id": "#).unwrap();

        let err = store.load("cats").unwrap_err();
        assert!(matches!(err, CoreError::Store(StoreError::CorruptData { .. })));
        assert_eq!(fs::read(&path).unwrap(), br#"[{"id": "1"}, {"id": "#.to_vec());
    }

    #[test]
    fn test_stored_record_without_id_is_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_in(tmp.path());
        let path = store.dataset_path("cats");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, br#"[{"id": "1"}, {"desc": "orphan"}]"#).unwrap();

        assert!(matches!(
            store.load("cats"),
            Err(CoreError::Store(StoreError::CorruptData { .. }))
        ));
    }

    #[test]
    fn test_non_array_is_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_in(tmp.path());
        let path = store.dataset_path("cats");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, br#"{"cats": ["1", "2"]}"#).unwrap();

        assert!(store.load("cats").is_err());
    }
}
