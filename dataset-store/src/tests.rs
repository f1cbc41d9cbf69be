#[cfg(test)]
mod tests {
    use crate::RecordStore;
    use harvest_core::{HarvestConfig, PostRecord};
    use serde_json::json;
    use std::fs;
    use std::time::Duration;

    fn setup_test_store() -> (tempfile::TempDir, RecordStore) {
        let tmp = tempfile::tempdir().expect("Failed to create temp dir");
        let store = RecordStore::new(HarvestConfig {
            data_dir: tmp.path().to_path_buf(),
            ..HarvestConfig::default()
        });
        (tmp, store)
    }

    #[test]
    fn test_datasets_are_isolated_per_hashtag() {
        let (_tmp, store) = setup_test_store();
        let cat = PostRecord::parse(json!({"id": "1"}), 0).unwrap();
        let dog = PostRecord::parse(json!({"id": "2"}), 0).unwrap();

        store.save("cats", &[cat.clone()]).unwrap();
        store.save("dogs", &[dog.clone()]).unwrap();

        assert_eq!(store.load("cats").unwrap(), vec![cat]);
        assert_eq!(store.load("dogs").unwrap(), vec![dog]);
    }

    #[test]
    fn test_last_updated_moves_forward_on_save() {
        let (_tmp, store) = setup_test_store();
        let record = PostRecord::parse(json!({"id": "1"}), 0).unwrap();

        store.save("cats", &[record.clone()]).unwrap();
        let first = store.last_updated("cats").unwrap();
        std::thread::sleep(Duration::from_millis(20));
        store.save("cats", &[record]).unwrap();
        let second = store.last_updated("cats").unwrap();

        assert!(second >= first);
    }

    #[test]
    fn test_media_manifest_reads_hashtag_media_dir() {
        let (_tmp, store) = setup_test_store();
        let media_dir = store.media_dir("cats");
        fs::create_dir_all(&media_dir).unwrap();
        fs::write(media_dir.join("10.mp4"), b"video").unwrap();
        fs::write(media_dir.join("11_00.jpeg"), b"image").unwrap();

        let manifest = store.media_manifest("cats").unwrap();
        assert!(manifest.contains("10"));
        assert!(manifest.contains("11"));
        assert_eq!(manifest.len(), 2);
        assert!(store.media_manifest("dogs").unwrap().is_empty());
    }
}
