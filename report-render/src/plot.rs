use chrono::{DateTime, TimeZone};
use harvest_core::{CoreError, FrequencyTable};
use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const WIDTH: f64 = 640.0;
const LABEL_WIDTH: f64 = 170.0;
const RIGHT_MARGIN: f64 = 60.0;
const TOP: f64 = 56.0;
const BAR_HEIGHT: f64 = 20.0;
const BAR_GAP: f64 = 8.0;
const AXIS_SPACE: f64 = 56.0;
const BAR_COLOR: &str = "#4c72b0";

fn svg_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Smallest multiple of ten at or above `max_percent`, at least 10.
fn axis_limit(max_percent: f64) -> f64 {
    ((max_percent / 10.0).ceil() * 10.0).clamp(10.0, 100.0)
}

/// `{hashtag}__{YYYY_MM_DD_HH_MM_SS}.svg`
pub fn plot_file_name<Tz: TimeZone>(hashtag: &str, at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("{}__{}.svg", hashtag, at.format("%Y_%m_%d_%H_%M_%S"))
}

/// Horizontal bar chart of the `top_n` hashtags co-occurring with `source`,
/// bar length being the percentage of posts carrying the tag. The source tag
/// is left out even if the table still holds it.
pub fn render_bar_chart(table: &FrequencyTable, source: &str, top_n: usize) -> String {
    let bars: Vec<(&str, f64)> = table
        .entries()
        .iter()
        .filter(|entry| !entry.hashtag.eq_ignore_ascii_case(source))
        .take(top_n)
        .map(|entry| (entry.hashtag.as_str(), table.frequency(entry.count) * 100.0))
        .collect();

    let rows = bars.len().max(1) as f64;
    let height = TOP + rows * (BAR_HEIGHT + BAR_GAP) + AXIS_SPACE;
    let plot_width = WIDTH - LABEL_WIDTH - RIGHT_MARGIN;
    let limit = axis_limit(bars.iter().map(|(_, pct)| *pct).fold(0.0, f64::max));
    let axis_y = TOP + rows * (BAR_HEIGHT + BAR_GAP);

    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" font-family="sans-serif">"#,
        w = WIDTH,
        h = height
    );
    let _ = writeln!(svg, r#"<rect width="100%" height="100%" fill="white"/>"#);
    let _ = writeln!(
        svg,
        r#"<text x="{x}" y="28" font-size="16" text-anchor="middle">Co-occurring hashtags for #{title} posts</text>"#,
        x = WIDTH / 2.0,
        title = svg_escape(source)
    );

    // Vertical grid lines with percent ticks.
    for step in 0..=5 {
        let pct = limit * step as f64 / 5.0;
        let x = LABEL_WIDTH + plot_width * step as f64 / 5.0;
        let _ = writeln!(
            svg,
            r##"<line x1="{x:.1}" y1="{top}" x2="{x:.1}" y2="{axis_y}" stroke="#dddddd"/>"##,
            top = TOP - BAR_GAP / 2.0,
        );
        let _ = writeln!(
            svg,
            r#"<text x="{x:.1}" y="{y}" font-size="11" text-anchor="middle">{pct:.0}%</text>"#,
            y = axis_y + 16.0,
        );
    }

    if bars.is_empty() {
        let _ = writeln!(
            svg,
            r#"<text x="{x}" y="{y}" font-size="12" text-anchor="middle">No co-occurring hashtags</text>"#,
            x = LABEL_WIDTH + plot_width / 2.0,
            y = TOP + BAR_HEIGHT * 0.75,
        );
    }

    for (row, (label, pct)) in bars.iter().enumerate() {
        let y = TOP + row as f64 * (BAR_HEIGHT + BAR_GAP);
        let bar_width = plot_width * (pct / limit).min(1.0);
        let _ = writeln!(
            svg,
            r#"<text x="{lx}" y="{ty:.1}" font-size="12" text-anchor="end">{label}</text>"#,
            lx = LABEL_WIDTH - 8.0,
            ty = y + BAR_HEIGHT * 0.7,
            label = svg_escape(label),
        );
        let _ = writeln!(
            svg,
            r#"<rect x="{LABEL_WIDTH}" y="{y:.1}" width="{bar_width:.1}" height="{BAR_HEIGHT}" fill="{BAR_COLOR}"><title>{title}: {pct:.1}%</title></rect>"#,
            title = svg_escape(label),
        );
    }

    let _ = writeln!(
        svg,
        r#"<text x="{x}" y="{y}" font-size="12" text-anchor="middle">Percent of posts with co-occurring hashtag</text>"#,
        x = LABEL_WIDTH + plot_width / 2.0,
        y = height - 12.0,
    );
    svg.push_str("</svg>\n");
    svg
}

/// Write `svg` into `plots_dir` under the timestamped name, creating the
/// directory if needed.
pub fn save_plot<Tz: TimeZone>(
    svg: &str,
    plots_dir: &Path,
    hashtag: &str,
    at: &DateTime<Tz>,
) -> Result<PathBuf, CoreError>
where
    Tz::Offset: std::fmt::Display,
{
    fs::create_dir_all(plots_dir)?;
    let path = plots_dir.join(plot_file_name(hashtag, at));
    fs::write(&path, svg)?;
    info!("Plot saved to file: {}", path.display());
    Ok(path)
}
