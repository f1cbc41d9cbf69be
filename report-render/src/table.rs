use harvest_core::FrequencyTable;
use std::fmt::Write;

/// Render the `top_n` most frequent co-occurring hashtags as a fixed-width
/// table, followed by the dataset size.
pub fn render_table(table: &FrequencyTable, source: &str, top_n: usize) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = writeln!(out, "Co-occurring hashtags for #{} posts", source);
    let _ = writeln!(
        out,
        "{:<8} {:<30} {:<15} {:<15}",
        "Rank", "Hashtag", "Occurrences", "Frequency"
    );
    for (rank, entry) in table.top(top_n).iter().enumerate() {
        let _ = writeln!(
            out,
            "{:<8} {:<30} {:<15} {:.4}",
            rank + 1,
            entry.hashtag,
            entry.count,
            table.frequency(entry.count)
        );
    }
    let _ = writeln!(out, "Total posts: {}", table.total_posts());
    out
}
