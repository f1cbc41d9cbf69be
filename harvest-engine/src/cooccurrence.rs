use harvest_core::{FrequencyTable, HashtagCount, PostRecord};
use std::collections::HashMap;

/// Count, for every hashtag, the number of posts carrying it.
///
/// A tag listed several times on one post counts once. `exclude` drops the
/// source hashtag (compared case-insensitively, leading `#` ignored), which
/// sits on nearly every post and says nothing about co-occurrence.
///
/// Entries are ordered by descending count; ties keep the order in which the
/// tags were first met while walking `records`.
pub fn aggregate(records: &[PostRecord], exclude: Option<&str>) -> FrequencyTable {
    let exclude = exclude.map(|tag| tag.trim().trim_start_matches('#').to_lowercase());

    // tag -> (count, first seen)
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for record in records {
        for tag in record.hashtag_set() {
            if exclude.as_deref().is_some_and(|ex| tag.to_lowercase() == ex) {
                continue;
            }
            let next_rank = counts.len();
            counts.entry(tag).or_insert((0, next_rank)).0 += 1;
        }
    }

    let mut ranked: Vec<(&str, usize, usize)> = counts
        .into_iter()
        .map(|(tag, (count, first_seen))| (tag, count, first_seen))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

    let entries = ranked
        .into_iter()
        .map(|(tag, count, _)| HashtagCount {
            hashtag: tag.to_string(),
            count,
        })
        .collect();

    FrequencyTable::new(entries, records.len())
}
