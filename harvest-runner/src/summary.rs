use std::fmt;
use std::path::PathBuf;

/// Per-hashtag processing phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Fetch,
    Reconcile,
    Persist,
    Report,
    Media,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Fetch => "fetch",
            Phase::Reconcile => "reconcile",
            Phase::Persist => "persist",
            Phase::Report => "report",
            Phase::Media => "media",
        };
        f.write_str(name)
    }
}

/// Terminal state of one hashtag.
#[derive(Debug, Clone, PartialEq)]
pub enum HashtagStatus {
    Completed,
    Failed { phase: Phase, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchSummary {
    /// Fetching was not requested for this run.
    Skipped,
    Empty,
    Fetched(usize),
    Transient(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaStats {
    pub already_present: usize,
    pub downloaded: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HashtagReport {
    pub hashtag: String,
    pub status: HashtagStatus,
    pub fetch: FetchSummary,
    pub new_count: usize,
    pub previously_known: usize,
    pub replaced: usize,
    pub rejected: usize,
    pub total_records: usize,
    pub table: Option<String>,
    pub plot: Option<PathBuf>,
    pub media: Option<MediaStats>,
    /// Report or media phases that went wrong after the dataset was saved.
    pub problems: Vec<(Phase, String)>,
}

impl HashtagReport {
    pub fn new(hashtag: &str) -> Self {
        Self {
            hashtag: hashtag.to_string(),
            status: HashtagStatus::Completed,
            fetch: FetchSummary::Skipped,
            new_count: 0,
            previously_known: 0,
            replaced: 0,
            rejected: 0,
            total_records: 0,
            table: None,
            plot: None,
            media: None,
            problems: Vec::new(),
        }
    }

    pub fn fail(&mut self, phase: Phase, reason: impl Into<String>) {
        self.status = HashtagStatus::Failed {
            phase,
            reason: reason.into(),
        };
    }

    pub fn note_problem(&mut self, phase: Phase, reason: impl Into<String>) {
        self.problems.push((phase, reason.into()));
    }

    pub fn succeeded(&self) -> bool {
        self.status == HashtagStatus::Completed
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub hashtags: Vec<HashtagReport>,
}

impl RunSummary {
    pub fn total_new(&self) -> usize {
        self.hashtags.iter().map(|h| h.new_count).sum()
    }

    pub fn succeeded(&self) -> usize {
        self.hashtags.iter().filter(|h| h.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.hashtags.len() - self.succeeded()
    }

    /// The run counts as successful when at least one hashtag completed.
    pub fn any_succeeded(&self) -> bool {
        self.succeeded() > 0
    }

    pub fn get(&self, hashtag: &str) -> Option<&HashtagReport> {
        self.hashtags.iter().find(|h| h.hashtag == hashtag)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n=== Harvest Run Complete ===")?;
        writeln!(f, "Hashtags completed: {}", self.succeeded())?;
        writeln!(f, "Hashtags failed:    {}", self.failed())?;
        for report in &self.hashtags {
            match &report.status {
                HashtagStatus::Completed => writeln!(
                    f,
                    "  #{}: {} new, {} known, {} stored",
                    report.hashtag, report.new_count, report.previously_known, report.total_records
                )?,
                HashtagStatus::Failed { phase, reason } => {
                    writeln!(f, "  #{}: failed during {}: {}", report.hashtag, phase, reason)?
                }
            }
            for (phase, reason) in &report.problems {
                writeln!(f, "    {} problem: {}", phase, reason)?;
            }
            if report.rejected > 0 {
                writeln!(f, "    rejected records: {}", report.rejected)?;
            }
            if let Some(media) = &report.media {
                writeln!(
                    f,
                    "    media: {} downloaded, {} failed, {} skipped, {} already present",
                    media.downloaded, media.failed, media.skipped, media.already_present
                )?;
            }
        }
        write!(f, "Successfully scraped {} new posts", self.total_new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_display() {
        let mut ok = HashtagReport::new("cats");
        ok.new_count = 3;
        ok.total_records = 5;
        ok.note_problem(Phase::Report, "plots dir not writable");
        let mut bad = HashtagReport::new("dogs");
        bad.fail(Phase::Fetch, "rate limited");

        let summary = RunSummary {
            hashtags: vec![ok, bad],
        };
        assert_eq!(summary.total_new(), 3);
        assert_eq!(summary.succeeded(), 1);
        assert_eq!(summary.failed(), 1);
        assert!(summary.any_succeeded());

        let text = summary.to_string();
        assert!(text.contains("#cats: 3 new"));
        assert!(text.contains("#dogs: failed during fetch: rate limited"));
        assert!(text.contains("report problem: plots dir not writable"));
        assert!(text.ends_with("Successfully scraped 3 new posts"));
    }

    #[test]
    fn test_empty_run_is_not_a_success() {
        assert!(!RunSummary::default().any_succeeded());
    }
}
