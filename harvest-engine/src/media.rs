use harvest_core::{MediaSkip, MediaSource, MediaTask, PostRecord, SkipReason};
use serde_json::Value;
use std::collections::HashSet;

const POST_PAGE_BASE: &str = "https://www.tiktok.com";

/// Work left for the media phase of one hashtag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaPlan {
    pub tasks: Vec<MediaTask>,
    pub skipped: Vec<MediaSkip>,
}

/// Posts whose media has not been downloaded yet.
pub fn pending_media<'a>(
    records: &'a [PostRecord],
    already_downloaded: &HashSet<String>,
) -> Vec<&'a PostRecord> {
    records
        .iter()
        .filter(|record| !already_downloaded.contains(record.id()))
        .collect()
}

/// Decide how a post's media can be fetched by looking at which fields are
/// populated.
pub fn classify(record: &PostRecord) -> Result<MediaSource, SkipReason> {
    if let Some(gallery) = record.get("imagePost").filter(|v| !v.is_null()) {
        let image_urls: Vec<String> = gallery
            .get("images")
            .and_then(Value::as_array)
            .map(|images| images.iter().filter_map(first_image_url).collect())
            .unwrap_or_default();
        if image_urls.is_empty() {
            return Err(SkipReason::EmptyGallery);
        }
        let audio_url = record
            .get("music")
            .and_then(|music| music.get("playUrl"))
            .and_then(non_empty_str);
        return Ok(MediaSource::Gallery {
            image_urls,
            audio_url,
        });
    }

    let Some(video) = record.get("video").filter(|v| !v.is_null()) else {
        return Err(SkipReason::NoMediaReference);
    };
    let Some(author) = record.author_handle() else {
        return Err(SkipReason::MissingAuthor);
    };

    let direct_url = ["playAddr", "downloadAddr"]
        .iter()
        .find_map(|key| video.get(*key).and_then(non_empty_str));

    Ok(MediaSource::Video {
        page_url: format!("{}/@{}/video/{}", POST_PAGE_BASE, author, record.id()),
        direct_url,
    })
}

/// Pending posts, classified. Posts with nothing to download are listed in
/// `skipped` with the reason.
pub fn plan_media(records: &[PostRecord], already_downloaded: &HashSet<String>) -> MediaPlan {
    let mut plan = MediaPlan::default();
    for record in pending_media(records, already_downloaded) {
        match classify(record) {
            Ok(source) => plan.tasks.push(MediaTask {
                post_id: record.id().to_string(),
                source,
            }),
            Err(reason) => plan.skipped.push(MediaSkip {
                post_id: record.id().to_string(),
                reason,
            }),
        }
    }
    plan
}

fn first_image_url(image: &Value) -> Option<String> {
    image
        .get("imageURL")
        .and_then(|url| url.get("urlList"))
        .and_then(Value::as_array)
        .and_then(|list| list.first())
        .and_then(non_empty_str)
}

fn non_empty_str(value: &Value) -> Option<String> {
    value
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
