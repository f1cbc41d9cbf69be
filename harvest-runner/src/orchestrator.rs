//! Sequential harvest driver: one hashtag at a time through
//! fetch, reconcile, persist, report and media, each hashtag isolated from
//! the failures of the others.

use crate::schedule::prioritize;
use crate::summary::{FetchSummary, HashtagReport, MediaStats, Phase, RunSummary};
use dataset_store::RecordStore;
use harvest_core::{
    CoreError, ErrorExt, FetchOutcome, HarvestConfig, MediaDownloader, PostFetcher, PostRecord,
};
use harvest_engine::{aggregate, plan_media, reconcile, Reconciliation};
use report_render::{render_bar_chart, render_table, save_plot};
use tracing::{debug, info, warn};

/// Which phases run, and their knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    pub fetch: bool,
    pub table: bool,
    pub plot: bool,
    pub download: bool,
    pub limit: usize,
    pub top_n: usize,
    pub exclude_source: bool,
}

impl RunOptions {
    /// Fetch only, with limits taken from the config.
    pub fn from_config(config: &HarvestConfig) -> Self {
        Self {
            fetch: true,
            table: false,
            plot: false,
            download: false,
            limit: config.fetch.limit,
            top_n: config.report.top_n,
            exclude_source: config.report.exclude_source,
        }
    }

    fn touches_network(&self) -> bool {
        self.fetch || self.download
    }
}

pub struct Orchestrator<F, D> {
    config: HarvestConfig,
    store: RecordStore,
    fetcher: F,
    downloader: D,
    options: RunOptions,
}

impl<F, D> Orchestrator<F, D>
where
    F: PostFetcher,
    D: MediaDownloader,
{
    pub fn new(config: HarvestConfig, fetcher: F, downloader: D, options: RunOptions) -> Self {
        let store = RecordStore::new(config.clone());
        Self {
            config,
            store,
            fetcher,
            downloader,
            options,
        }
    }

    /// Processing order for `hashtags`, oldest data first.
    pub fn schedule(&self, hashtags: &[String]) -> Vec<String> {
        prioritize(hashtags, |hashtag| self.store.last_updated(hashtag))
    }

    /// Process every hashtag in priority order, pausing between hashtags
    /// when the run talks to the remote service.
    pub async fn run(&self, hashtags: &[String]) -> RunSummary {
        let ordered = self.schedule(hashtags);
        let delay = self.config.inter_request_delay();
        let mut summary = RunSummary::default();

        info!("Processing {} hashtag(s): {}", ordered.len(), ordered.join(", "));
        for (index, hashtag) in ordered.iter().enumerate() {
            if index > 0 && self.options.touches_network() && !delay.is_zero() {
                debug!("Sleeping {:?} before #{}", delay, hashtag);
                tokio::time::sleep(delay).await;
            }

            let report = self.process(hashtag).await;
            if report.succeeded() {
                info!(
                    "#{} done: {} new, {} previously known, {} stored",
                    hashtag, report.new_count, report.previously_known, report.total_records
                );
            }
            summary.hashtags.push(report);
        }

        info!("Successfully scraped {} new posts", summary.total_new());
        summary
    }

    /// Run one hashtag through its phases. Never fails: the outcome, failed
    /// or not, is recorded in the returned report.
    pub async fn process(&self, hashtag: &str) -> HashtagReport {
        let mut report = HashtagReport::new(hashtag);

        let merged = match self.collect(hashtag, &mut report).await {
            Ok(Some(records)) => records,
            Ok(None) => return report,
            Err((phase, e)) => {
                warn!("Skipping #{} after {} failure", hashtag, phase);
                match phase {
                    Phase::Persist => e.log_error(),
                    _ => e.log_warn(),
                };
                report.fail(phase, e.user_friendly_message());
                return report;
            }
        };
        report.total_records = merged.len();

        // The dataset is persisted at this point; later phases only add
        // problems to the report.
        if self.options.table || self.options.plot {
            if let Err(e) = self.report(hashtag, &merged, &mut report) {
                warn!("Report for #{} not produced", hashtag);
                e.log_warn();
                report.note_problem(Phase::Report, e.user_friendly_message());
            }
        }

        if self.options.download {
            match self.download_media(hashtag, &merged).await {
                Ok(stats) => report.media = Some(stats),
                Err(e) => {
                    warn!("Media phase for #{} aborted", hashtag);
                    e.log_warn();
                    report.note_problem(Phase::Media, e.user_friendly_message());
                }
            }
        }

        report
    }

    /// Fetch, reconcile and persist. Returns the hashtag's current records,
    /// or `None` when the hashtag ended in a transient failure.
    async fn collect(
        &self,
        hashtag: &str,
        report: &mut HashtagReport,
    ) -> Result<Option<Vec<PostRecord>>, (Phase, CoreError)> {
        // A corrupt dataset is found before spending any requests on it.
        let existing = self
            .store
            .load(hashtag)
            .map_err(|e| (Phase::Reconcile, e))?;

        if !self.options.fetch {
            if !self.store.exists(hashtag) {
                let e = CoreError::InvalidInput {
                    message: format!(
                        "no stored posts for #{}; run without --no-fetch first",
                        hashtag
                    ),
                };
                return Err((Phase::Reconcile, e));
            }
            let reconciliation = reconcile(existing, Vec::new());
            record_counts(report, &reconciliation);
            return Ok(Some(reconciliation.merged));
        }

        info!("Fetching up to {} posts for #{}", self.options.limit, hashtag);
        let fetched = match self
            .fetcher
            .fetch(hashtag, self.options.limit)
            .await
            .map_err(|e| (Phase::Fetch, e))?
        {
            FetchOutcome::Fetched(batch) => {
                report.fetch = FetchSummary::Fetched(batch.len());
                batch
            }
            FetchOutcome::Empty => {
                warn!("No posts returned for #{}", hashtag);
                report.fetch = FetchSummary::Empty;
                Vec::new()
            }
            FetchOutcome::Transient(e) => {
                warn!(
                    code = %e.error_code(),
                    "Fetch for #{} failed transiently, dataset left as is: {}", hashtag, e
                );
                report.fetch = FetchSummary::Transient(e.to_string());
                report.fail(Phase::Fetch, e.user_friendly_message());
                return Ok(None);
            }
        };

        let reconciliation = reconcile(existing, fetched);
        for rejected in &reconciliation.rejected {
            warn!(
                code = %rejected.error_code(),
                "Dropped record from #{} batch: {}", hashtag, rejected
            );
        }

        if reconciliation.has_changes() {
            self.store
                .save(hashtag, &reconciliation.merged)
                .map_err(|e| (Phase::Persist, e))?;
            debug!("Saved {} records for #{}", reconciliation.merged.len(), hashtag);
        } else {
            debug!("Nothing new for #{}, dataset not rewritten", hashtag);
        }
        record_counts(report, &reconciliation);

        Ok(Some(reconciliation.merged))
    }

    fn report(
        &self,
        hashtag: &str,
        records: &[PostRecord],
        report: &mut HashtagReport,
    ) -> Result<(), CoreError> {
        let exclude = self.options.exclude_source.then_some(hashtag);

        if self.options.table {
            let table = aggregate(records, exclude);
            let rendered = render_table(&table, hashtag, self.options.top_n);
            print!("\n{}", rendered);
            report.table = Some(rendered);
        }

        if self.options.plot {
            // The plot never shows the source tag.
            let table = aggregate(records, Some(hashtag));
            let svg = render_bar_chart(&table, hashtag, self.options.top_n);
            let path = save_plot(
                &svg,
                &self.config.plots_dir(hashtag),
                hashtag,
                &chrono::Local::now(),
            )?;
            report.plot = Some(path);
        }

        Ok(())
    }

    async fn download_media(
        &self,
        hashtag: &str,
        records: &[PostRecord],
    ) -> Result<MediaStats, CoreError> {
        let downloaded = self.store.media_manifest(hashtag)?;
        let plan = plan_media(records, &downloaded);
        let media_dir = self.store.media_dir(hashtag);

        let mut stats = MediaStats {
            already_present: records
                .len()
                .saturating_sub(plan.tasks.len() + plan.skipped.len()),
            skipped: plan.skipped.len(),
            ..MediaStats::default()
        };
        for skip in &plan.skipped {
            debug!("No media to fetch for post {}: {}", skip.post_id, skip.reason);
        }

        info!(
            "Downloading media for {} post(s) of #{} ({} already present)",
            plan.tasks.len(),
            hashtag,
            stats.already_present
        );
        for task in &plan.tasks {
            match self.downloader.download(task, &media_dir).await {
                Ok(files) => {
                    debug!("Post {}: {} file(s)", task.post_id, files.len());
                    stats.downloaded += 1;
                }
                Err(e) => {
                    warn!(
                        code = %e.error_code(),
                        "Media for post {} not downloaded: {}", task.post_id, e
                    );
                    stats.failed += 1;
                }
            }
        }

        Ok(stats)
    }
}

fn record_counts(report: &mut HashtagReport, reconciliation: &Reconciliation) {
    report.new_count = reconciliation.new_count;
    report.previously_known = reconciliation.previously_known_count;
    report.replaced = reconciliation.replaced_count;
    report.rejected = reconciliation.rejected.len();
}
