use harvest_core::CoreError;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;

/// Suffixes of files that a downloader is still writing.
const PARTIAL_SUFFIXES: [&str; 3] = [".part", ".ytdl", ".tmp"];

/// Post id a media file belongs to: `{id}.{ext}` or `{id}_{index}.{ext}`.
pub fn post_id_from_file_name(name: &str) -> Option<&str> {
    if name.starts_with('.') || PARTIAL_SUFFIXES.iter().any(|s| name.ends_with(s)) {
        return None;
    }
    let stem = name.split('.').next()?;
    let id = stem.split('_').next()?;
    (!id.is_empty()).then_some(id)
}

/// Ids of posts whose media is already in `media_dir`. A missing directory
/// yields an empty manifest.
pub fn scan_media_dir(media_dir: &Path) -> Result<HashSet<String>, CoreError> {
    let entries = match fs::read_dir(media_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(HashSet::new()),
        Err(e) => return Err(e.into()),
    };

    let mut ids = HashSet::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        if let Some(id) = name.to_str().and_then(post_id_from_file_name) {
            ids.insert(id.to_string());
        }
    }
    Ok(ids)
}
