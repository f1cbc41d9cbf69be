use crate::error::CoreError;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Bring user-supplied hashtags into the form used for directory names:
/// trimmed, without a leading `#`, lowercase. Empty entries and repeats are
/// dropped; first occurrence wins.
pub fn normalize_hashtags<I, S>(hashtags: I) -> Result<Vec<String>, CoreError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut normalized = Vec::new();

    for raw in hashtags {
        let tag = raw
            .as_ref()
            .trim()
            .trim_start_matches('#')
            .trim()
            .to_lowercase();
        if tag.is_empty() {
            continue;
        }
        // The hashtag names a directory under the data dir.
        if tag.contains(['/', '\\']) || tag == "." || tag == ".." {
            return Err(CoreError::InvalidInput {
                message: format!("'{}' is not a valid hashtag", raw.as_ref()),
            });
        }
        if seen.insert(tag.clone()) {
            normalized.push(tag);
        }
    }

    Ok(normalized)
}

/// Read hashtags separated by newlines or commas.
pub fn load_hashtags_from_file(path: &Path) -> Result<Vec<String>, CoreError> {
    if !path.is_file() {
        return Err(CoreError::InvalidInput {
            message: format!("{} does not exist", path.display()),
        });
    }
    let contents = fs::read_to_string(path)?;
    normalize_hashtags(contents.split(['\n', ',']))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_and_lowercases() {
        let tags = normalize_hashtags(["  #Cats ", "DOGS", "#", "", "##fyp"]).unwrap();
        assert_eq!(tags, vec!["cats", "dogs", "fyp"]);
    }

    #[test]
    fn test_normalize_drops_repeats() {
        let tags = normalize_hashtags(["cats", "#CATS", "dogs", "cats"]).unwrap();
        assert_eq!(tags, vec!["cats", "dogs"]);
    }

    #[test]
    fn test_normalize_rejects_path_like_tags() {
        assert!(normalize_hashtags(["../etc"]).is_err());
        assert!(normalize_hashtags([".."]).is_err());
        assert!(normalize_hashtags(["a\\b"]).is_err());
    }

    #[test]
    fn test_load_from_file_splits_lines_and_commas() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tags.txt");
        fs::write(&path, "#Cats, dogs\r\nbirds\n\n,fish,").unwrap();

        let tags = load_hashtags_from_file(&path).unwrap();
        assert_eq!(tags, vec!["cats", "dogs", "birds", "fish"]);
    }

    #[test]
    fn test_load_missing_file_is_invalid_input() {
        let tmp = tempfile::tempdir().unwrap();
        let result = load_hashtags_from_file(&tmp.path().join("missing.txt"));
        assert!(matches!(result, Err(CoreError::InvalidInput { .. })));
    }
}
