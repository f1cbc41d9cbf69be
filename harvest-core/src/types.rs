use crate::error::{FetchError, RecordError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// One scraped post.
///
/// Only `id` is validated; every other field is an opaque payload owned by the
/// remote source and is written back to disk exactly as it was received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct PostRecord {
    id: String,
    fields: Map<String, Value>,
}

impl PostRecord {
    /// Validate a raw record. `index` is the position in its batch and is only
    /// used for error reporting.
    pub fn parse(value: Value, index: usize) -> Result<Self, RecordError> {
        let Value::Object(fields) = value else {
            return Err(RecordError::NotAnObject { index });
        };

        let id = match fields.get("id") {
            None | Some(Value::Null) => return Err(RecordError::MissingId { index }),
            Some(Value::String(s)) if s.trim().is_empty() => {
                return Err(RecordError::MissingId { index })
            }
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Number(n)) if n.is_u64() || n.is_i64() => n.to_string(),
            Some(other) => {
                return Err(RecordError::InvalidId {
                    index,
                    value: other.to_string(),
                })
            }
        };
        if !is_valid_post_id(&id) {
            return Err(RecordError::InvalidId { index, value: id });
        }

        Ok(Self { id, fields })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Hashtag names attached to the post, in the order they appear. A tag can
    /// be listed more than once; use [`PostRecord::hashtag_set`] for presence.
    ///
    /// Reads `textExtra[].hashtagName`, `hashtags[].name` and
    /// `challenges[].title`.
    pub fn hashtags(&self) -> Vec<&str> {
        let mut tags = Vec::new();
        for (field, key) in [
            ("textExtra", "hashtagName"),
            ("hashtags", "name"),
            ("challenges", "title"),
        ] {
            let Some(Value::Array(items)) = self.fields.get(field) else {
                continue;
            };
            tags.extend(
                items
                    .iter()
                    .filter_map(|item| item.get(key).and_then(Value::as_str))
                    .filter(|tag| !tag.is_empty()),
            );
        }
        tags
    }

    /// Distinct hashtags, keeping first-seen order.
    pub fn hashtag_set(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.hashtags()
            .into_iter()
            .filter(|tag| seen.insert(*tag))
            .collect()
    }

    /// Author handle from `author.uniqueId`, or `author` when it is a plain string.
    pub fn author_handle(&self) -> Option<&str> {
        match self.fields.get("author")? {
            Value::String(s) if !s.is_empty() => Some(s),
            Value::Object(author) => author
                .get("uniqueId")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty()),
            _ => None,
        }
    }
}

/// Whether `id` can name media files: ASCII letters, digits and `-` only.
///
/// Media files are `{id}.{ext}` or `{id}_{NN}.{ext}` inside the hashtag's
/// media directory, so `.`, `_` and path separators are reserved.
pub fn is_valid_post_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

impl TryFrom<Value> for PostRecord {
    type Error = RecordError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::parse(value, 0)
    }
}

impl From<PostRecord> for Value {
    fn from(record: PostRecord) -> Self {
        Value::Object(record.fields)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HashtagCount {
    pub hashtag: String,
    pub count: usize,
}

/// Co-occurrence counts for one dataset, ordered by descending count.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrequencyTable {
    entries: Vec<HashtagCount>,
    total_posts: usize,
}

impl FrequencyTable {
    /// `entries` must already be in presentation order.
    pub fn new(entries: Vec<HashtagCount>, total_posts: usize) -> Self {
        Self {
            entries,
            total_posts,
        }
    }

    pub fn entries(&self) -> &[HashtagCount] {
        &self.entries
    }

    pub fn top(&self, n: usize) -> &[HashtagCount] {
        &self.entries[..n.min(self.entries.len())]
    }

    pub fn get(&self, hashtag: &str) -> Option<usize> {
        self.entries
            .iter()
            .find(|e| e.hashtag == hashtag)
            .map(|e| e.count)
    }

    pub fn total_posts(&self) -> usize {
        self.total_posts
    }

    /// Share of posts in the dataset carrying a tag with `count` occurrences.
    pub fn frequency(&self, count: usize) -> f64 {
        if self.total_posts == 0 {
            0.0
        } else {
            count as f64 / self.total_posts as f64
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Where a post's media can be fetched from.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaSource {
    Video {
        page_url: String,
        direct_url: Option<String>,
    },
    Gallery {
        image_urls: Vec<String>,
        audio_url: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaTask {
    pub post_id: String,
    pub source: MediaSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Neither a video nor an image gallery is described.
    NoMediaReference,
    /// A video post without an author handle has no page URL.
    MissingAuthor,
    /// An image gallery with no image URLs.
    EmptyGallery,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            SkipReason::NoMediaReference => "no media reference",
            SkipReason::MissingAuthor => "missing author",
            SkipReason::EmptyGallery => "empty image gallery",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaSkip {
    pub post_id: String,
    pub reason: SkipReason,
}

/// Result of one hashtag search.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// Raw records, not yet validated.
    Fetched(Vec<Value>),
    Empty,
    /// The search failed in a way that may succeed on a later run.
    Transient(FetchError),
}
