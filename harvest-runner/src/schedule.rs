use std::time::SystemTime;

/// Order hashtags oldest data first: hashtags without a dataset lead, then
/// datasets by ascending modification time. Equal keys keep input order.
pub fn prioritize<F>(hashtags: &[String], last_updated: F) -> Vec<String>
where
    F: Fn(&str) -> Option<SystemTime>,
{
    let mut keyed: Vec<(Option<SystemTime>, &String)> = hashtags
        .iter()
        .map(|hashtag| (last_updated(hashtag), hashtag))
        .collect();
    // `None` sorts before any `Some`.
    keyed.sort_by_key(|(updated, _)| *updated);
    keyed.into_iter().map(|(_, hashtag)| hashtag.clone()).collect()
}
