/// Per-run change-detection coordinator.
///
/// For each source, strictly in sequence: fetch -> archive decision -> classify -> summarize
/// -> record. The summarizer is only reached when the archive wrote a new snapshot and, for
/// an existing source, the classifier judged the change substantive. Sources run
/// concurrently up to the configured bound; a failure in one never touches another.
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{error, info, warn};

use crate::archive::{ArchiveOutcome, ArchiveStore};
use crate::classifier::{ChangeClassifier, ChangeVerdict};
use crate::error::{FetchError, SourceError, Stage, SummaryError};
use crate::fetch::PageFetcher;
use crate::model::{ResultRecord, ResultsDocument, Source};
use crate::summarize::Summarizer;

pub const PLACEHOLDER_SUMMARY: &str = "Initial snapshot created. Monitoring active.";

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub concurrency: usize,
    pub fetch_timeout: Duration,
    pub summary_timeout: Duration,
}

/// What happened to one source in this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus {
    /// Raw bytes identical to the latest snapshot.
    Unchanged,
    /// First snapshot ever for this source.
    FirstSnapshot,
    /// New snapshot written, classified as not substantive.
    Cosmetic,
    /// New snapshot written, classified as substantive.
    Changed,
    /// Processing aborted; the prior record was kept.
    Failed,
}

impl SourceStatus {
    pub fn wrote_snapshot(self) -> bool {
        matches!(
            self,
            SourceStatus::FirstSnapshot | SourceStatus::Cosmetic | SourceStatus::Changed
        )
    }
}

#[derive(Debug, Clone)]
pub struct SourceOutcome {
    pub record: ResultRecord,
    pub status: SourceStatus,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub document: ResultsDocument,
    pub statuses: Vec<SourceStatus>,
}

impl RunReport {
    pub fn count(&self, status: SourceStatus) -> usize {
        self.statuses.iter().filter(|s| **s == status).count()
    }

    pub fn archived(&self) -> usize {
        self.statuses.iter().filter(|s| s.wrote_snapshot()).count()
    }
}

pub struct ChangeDetectionPipeline {
    archive: Arc<ArchiveStore>,
    classifier: Arc<ChangeClassifier>,
    fetcher: Arc<dyn PageFetcher>,
    summarizer: Arc<dyn Summarizer>,
    settings: PipelineSettings,
}

impl ChangeDetectionPipeline {
    pub fn new(
        archive: Arc<ArchiveStore>,
        classifier: Arc<ChangeClassifier>,
        fetcher: Arc<dyn PageFetcher>,
        summarizer: Arc<dyn Summarizer>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            archive,
            classifier,
            fetcher,
            summarizer,
            settings,
        }
    }

    /// Process every source and assemble the results document, in source order.
    pub async fn run(
        &self,
        sources: &[Source],
        prior: Option<&ResultsDocument>,
        now: DateTime<Utc>,
    ) -> RunReport {
        let outcomes: Vec<SourceOutcome> = stream::iter(sources)
            .map(|source| {
                let prior_record = prior.and_then(|doc| doc.record_for(&source.name));
                async move {
                    match self.process_source(source, now).await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            error!(
                                slug = %source.slug,
                                stage = %e.stage(),
                                error = %e,
                                "source processing failed, keeping prior record"
                            );
                            SourceOutcome {
                                record: self.preserved_record(source, prior_record),
                                status: SourceStatus::Failed,
                            }
                        }
                    }
                }
            })
            .buffered(self.settings.concurrency.max(1))
            .collect()
            .await;

        let (records, statuses): (Vec<_>, Vec<_>) = outcomes
            .into_iter()
            .map(|o| (o.record, o.status))
            .unzip();
        RunReport {
            document: ResultsDocument {
                updated_at: now,
                companies: records,
            },
            statuses,
        }
    }

    /// Run one source through the pipeline.
    pub async fn process_source(
        &self,
        source: &Source,
        now: DateTime<Utc>,
    ) -> Result<SourceOutcome, SourceError> {
        let slug = source.slug.as_str();

        let raw = tokio::time::timeout(self.settings.fetch_timeout, self.fetcher.fetch(&source.url))
            .await
            .map_err(|_| FetchError::Timeout(self.settings.fetch_timeout))??;

        let outcome = self.archive.archive(slug, &raw, now.date_naive())?;

        let mut record = ResultRecord {
            name: source.name.clone(),
            category: source.category.clone(),
            tos_url: source.url.clone(),
            last_checked: Some(now),
            changed: Some(false),
            change_reason: None,
            summary: None,
        };

        let status = match outcome {
            ArchiveOutcome::Unchanged { .. } => {
                record.summary = Some(self.persisted_summary(slug));
                SourceStatus::Unchanged
            }
            ArchiveOutcome::First { current } => {
                let fresh = self
                    .with_summary_timeout(self.summarizer.summarize_overview(&current.content))
                    .await;
                record.summary = Some(self.settle_summary(slug, fresh));
                SourceStatus::FirstSnapshot
            }
            ArchiveOutcome::Changed { previous, current } => {
                let (verdict, old_text, new_text) =
                    self.classify(previous.content, current.content).await?;
                match (verdict.substantive, verdict.reason) {
                    (true, Some(reason)) => {
                        let reason = reason.to_string();
                        info!(slug, reason = %reason, "substantive change detected");
                        let fresh = self
                            .with_summary_timeout(
                                self.summarizer.summarize_diff(&old_text, &new_text, &reason),
                            )
                            .await;
                        record.summary = Some(self.settle_summary(slug, fresh));
                        record.changed = Some(true);
                        record.change_reason = Some(reason);
                        SourceStatus::Changed
                    }
                    _ => {
                        info!(slug, "new version archived, change not substantive");
                        record.summary = Some(self.persisted_summary(slug));
                        SourceStatus::Cosmetic
                    }
                }
            }
        };

        info!(slug, status = ?status, "source checked");
        Ok(SourceOutcome { record, status })
    }

    async fn classify(
        &self,
        old_text: String,
        new_text: String,
    ) -> Result<(ChangeVerdict, String, String), SourceError> {
        let classifier = Arc::clone(&self.classifier);
        tokio::task::spawn_blocking(move || {
            let verdict = classifier.classify(&old_text, &new_text);
            (verdict, old_text, new_text)
        })
        .await
        .map_err(|e| SourceError::Classify(e.to_string()))
    }

    async fn with_summary_timeout<F>(&self, fut: F) -> Result<String, SummaryError>
    where
        F: std::future::Future<Output = Result<String, SummaryError>>,
    {
        tokio::time::timeout(self.settings.summary_timeout, fut)
            .await
            .map_err(|_| SummaryError::Timeout(self.settings.summary_timeout))?
    }

    /// Persist a freshly generated summary, or fall back to the persisted one when
    /// generation failed.
    fn settle_summary(&self, slug: &str, fresh: Result<String, SummaryError>) -> String {
        match fresh {
            Ok(summary) => {
                if let Err(e) = self.archive.write_summary(slug, &summary) {
                    warn!(slug, stage = %Stage::Persist, error = %e, "failed to persist summary");
                }
                summary
            }
            Err(e) => {
                warn!(slug, stage = %Stage::Summarize, error = %e, "summary generation failed, using persisted summary");
                self.persisted_summary(slug)
            }
        }
    }

    fn persisted_summary(&self, slug: &str) -> String {
        match self.archive.read_summary(slug) {
            Ok(Some(summary)) => summary,
            Ok(None) => PLACEHOLDER_SUMMARY.to_string(),
            Err(e) => {
                warn!(slug, error = %e, "failed to read persisted summary");
                PLACEHOLDER_SUMMARY.to_string()
            }
        }
    }

    /// The record to publish for a source whose run was aborted.
    fn preserved_record(&self, source: &Source, prior: Option<&ResultRecord>) -> ResultRecord {
        if let Some(prior) = prior {
            return prior.clone();
        }
        let mut record = ResultRecord::bare(source);
        record.summary = self.archive.read_summary(&source.slug).ok().flatten();
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::classifier::{
        ChangeRule, ClassifierConfig, Comparison, DEFAULT_PERCENT_CHANGE_THRESHOLD,
        DEFAULT_SIMILARITY_THRESHOLD,
    };
    use crate::hot_section::{default_hot_sections, HotSection, NewSectionPolicy};
    use crate::similarity::SequenceScorer;
    use tos_common::openai::OpenAiClientError;

    #[derive(Default)]
    struct FakeFetcher {
        pages: Mutex<HashMap<String, String>>,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    impl FakeFetcher {
        fn set(&self, url: &str, text: &str) {
            self.pages
                .lock()
                .unwrap()
                .insert(url.to_string(), text.to_string());
        }

        fn remove(&self, url: &str) {
            self.pages.lock().unwrap().remove(url);
        }
    }

    #[async_trait]
    impl PageFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let page = self.pages.lock().unwrap().get(url).cloned();
            page.ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 503,
            })
        }
    }

    #[derive(Default)]
    struct FakeSummarizer {
        overview_calls: AtomicUsize,
        diff_calls: AtomicUsize,
        fail: AtomicBool,
    }

    impl FakeSummarizer {
        fn total_calls(&self) -> usize {
            self.overview_calls.load(Ordering::SeqCst) + self.diff_calls.load(Ordering::SeqCst)
        }

        fn result(&self, text: &str) -> Result<String, SummaryError> {
            if self.fail.load(Ordering::SeqCst) {
                Err(SummaryError::Client(OpenAiClientError::EmptyCompletion))
            } else {
                Ok(text.to_string())
            }
        }
    }

    #[async_trait]
    impl Summarizer for FakeSummarizer {
        async fn summarize_overview(&self, _text: &str) -> Result<String, SummaryError> {
            self.overview_calls.fetch_add(1, Ordering::SeqCst);
            self.result("overview summary")
        }

        async fn summarize_diff(
            &self,
            _old_text: &str,
            _new_text: &str,
            reason: &str,
        ) -> Result<String, SummaryError> {
            self.diff_calls.fetch_add(1, Ordering::SeqCst);
            self.result(&format!("diff summary: {reason}"))
        }
    }

    /// Never fires; counts how often the classifier consults it.
    struct CountingRule {
        calls: Arc<AtomicUsize>,
    }

    impl ChangeRule for CountingRule {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn evaluate(&self, _cmp: &Comparison<'_>) -> Option<ChangeVerdict> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            None
        }
    }

    struct Harness {
        _tmp: TempDir,
        archive: Arc<ArchiveStore>,
        fetcher: Arc<FakeFetcher>,
        summarizer: Arc<FakeSummarizer>,
        pipeline: ChangeDetectionPipeline,
    }

    fn default_classifier() -> ChangeClassifier {
        let config = ClassifierConfig {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            percent_change_threshold: DEFAULT_PERCENT_CHANGE_THRESHOLD,
            hot_sections: default_hot_sections()
                .iter()
                .map(|s| HotSection::compile(s).unwrap())
                .collect(),
            new_section_policy: NewSectionPolicy::Score,
        };
        ChangeClassifier::new(config, Arc::new(SequenceScorer))
    }

    fn build_harness(
        fetcher: FakeFetcher,
        fetch_timeout: Duration,
        classifier: ChangeClassifier,
    ) -> Harness {
        let tmp = TempDir::new().unwrap();
        let archive = Arc::new(ArchiveStore::open(tmp.path().join("archive")).unwrap());
        let fetcher = Arc::new(fetcher);
        let summarizer = Arc::new(FakeSummarizer::default());
        let pipeline = ChangeDetectionPipeline::new(
            Arc::clone(&archive),
            Arc::new(classifier),
            Arc::clone(&fetcher) as Arc<dyn PageFetcher>,
            Arc::clone(&summarizer) as Arc<dyn Summarizer>,
            PipelineSettings {
                concurrency: 4,
                fetch_timeout,
                summary_timeout: Duration::from_secs(5),
            },
        );
        Harness {
            _tmp: tmp,
            archive,
            fetcher,
            summarizer,
            pipeline,
        }
    }

    fn harness_with(fetcher: FakeFetcher, fetch_timeout: Duration) -> Harness {
        build_harness(fetcher, fetch_timeout, default_classifier())
    }

    fn harness() -> Harness {
        harness_with(FakeFetcher::default(), Duration::from_secs(5))
    }

    fn source(name: &str) -> Source {
        Source::new(
            name,
            Some("Tech".to_string()),
            &format!("https://{}.test/tos", name.to_lowercase()),
        )
    }

    fn at(hour: u32) -> DateTime<Utc> {
        format!("2026-01-01T{hour:02}:00:00Z").parse().unwrap()
    }

    #[tokio::test]
    async fn test_first_run_uses_overview_summary() {
        let h = harness();
        let acme = source("Acme");
        h.fetcher.set(&acme.url, "ToS text v1");

        let report = h.pipeline.run(&[acme.clone()], None, at(9)).await;
        let record = &report.document.companies[0];

        assert_eq!(report.statuses, vec![SourceStatus::FirstSnapshot]);
        assert_eq!(record.changed, Some(false));
        assert_eq!(record.change_reason, None);
        assert_eq!(record.summary.as_deref(), Some("overview summary"));
        assert_eq!(record.last_checked, Some(at(9)));
        assert_eq!(record.category.as_deref(), Some("Tech"));
        assert_eq!(h.summarizer.overview_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            h.archive.read_summary(&acme.slug).unwrap().as_deref(),
            Some("overview summary")
        );
        assert_eq!(report.document.updated_at, at(9));
    }

    #[tokio::test]
    async fn test_identical_rerun_is_a_no_op() {
        let h = harness();
        let acme = source("Acme");
        h.fetcher.set(&acme.url, "ToS text v1");

        let first = h.pipeline.run(&[acme.clone()], None, at(9)).await;
        let second = h
            .pipeline
            .run(&[acme.clone()], Some(&first.document), at(10))
            .await;

        assert_eq!(second.statuses, vec![SourceStatus::Unchanged]);
        assert_eq!(h.archive.snapshots(&acme.slug).unwrap().len(), 1);
        assert_eq!(h.summarizer.total_calls(), 1);
        let record = &second.document.companies[0];
        assert_eq!(record.changed, Some(false));
        assert_eq!(record.summary.as_deref(), Some("overview summary"));
    }

    #[tokio::test]
    async fn test_unchanged_without_summary_file_uses_placeholder_and_no_ai() {
        let h = harness();
        let acme = source("Acme");
        h.archive
            .archive_if_changed(&acme.slug, "ToS text v1", at(8).date_naive())
            .unwrap();
        h.fetcher.set(&acme.url, "ToS text v1");

        let report = h.pipeline.run(&[acme], None, at(9)).await;
        assert_eq!(h.summarizer.total_calls(), 0);
        assert_eq!(
            report.document.companies[0].summary.as_deref(),
            Some(PLACEHOLDER_SUMMARY)
        );
    }

    #[tokio::test]
    async fn test_whitespace_only_change_is_archived_but_not_summarized() {
        let h = harness();
        let acme = source("Acme");
        h.fetcher.set(&acme.url, "Hello Terms\n\nWe respect your privacy.");
        let first = h.pipeline.run(&[acme.clone()], None, at(9)).await;

        h.fetcher
            .set(&acme.url, "HELLO   terms\nwe respect your privacy.\n");
        let second = h
            .pipeline
            .run(&[acme.clone()], Some(&first.document), at(10))
            .await;

        assert_eq!(second.statuses, vec![SourceStatus::Cosmetic]);
        assert_eq!(h.archive.snapshots(&acme.slug).unwrap().len(), 2);
        assert_eq!(h.summarizer.diff_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.summarizer.total_calls(), 1);
        let record = &second.document.companies[0];
        assert_eq!(record.changed, Some(false));
        assert_eq!(record.change_reason, None);
        assert_eq!(record.summary.as_deref(), Some("overview summary"));
    }

    #[tokio::test]
    async fn test_substantive_change_regenerates_summary() {
        let h = harness();
        let acme = source("Acme");
        h.fetcher.set(&acme.url, "ToS text v1");
        let first = h.pipeline.run(&[acme.clone()], None, at(9)).await;

        h.fetcher.set(&acme.url, "ToS text v2 - something changed");
        let second = h
            .pipeline
            .run(&[acme.clone()], Some(&first.document), at(10))
            .await;

        assert_eq!(second.statuses, vec![SourceStatus::Changed]);
        let record = &second.document.companies[0];
        assert_eq!(record.changed, Some(true));
        let reason = record.change_reason.clone().unwrap();
        assert!(reason.starts_with("document changed by"), "{reason}");
        let expected = format!("diff summary: {reason}");
        assert_eq!(record.summary.as_deref(), Some(expected.as_str()));
        assert_eq!(
            h.archive.read_summary(&acme.slug).unwrap().as_deref(),
            Some(expected.as_str())
        );
        assert_eq!(h.summarizer.diff_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_same_day_versions_get_suffixes() {
        let h = harness();
        let acme = source("Acme");
        let mut prior = None;
        for (hour, text) in [(9, "Version A"), (10, "Version B"), (11, "Version C")] {
            h.fetcher.set(&acme.url, text);
            let report = h.pipeline.run(&[acme.clone()], prior.as_ref(), at(hour)).await;
            prior = Some(report.document);
        }
        let names: Vec<String> = h
            .archive
            .snapshots(&acme.slug)
            .unwrap()
            .iter()
            .map(|s| s.file_name())
            .collect();
        assert_eq!(
            names,
            vec!["2026-01-01.txt", "2026-01-01_1.txt", "2026-01-01_2.txt"]
        );
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_prior_record() {
        let h = harness();
        let acme = source("Acme");
        h.fetcher.set(&acme.url, "ToS text v1");
        let first = h.pipeline.run(&[acme.clone()], None, at(9)).await;

        h.fetcher.remove(&acme.url);
        let second = h
            .pipeline
            .run(&[acme.clone()], Some(&first.document), at(10))
            .await;

        assert_eq!(second.statuses, vec![SourceStatus::Failed]);
        assert_eq!(second.document.companies[0], first.document.companies[0]);
        assert_eq!(h.summarizer.total_calls(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_without_prior_record_uses_summary_file() {
        let h = harness();
        let acme = source("Acme");
        h.archive
            .write_summary(&acme.slug, "Cached summary from before.")
            .unwrap();

        let report = h.pipeline.run(&[acme.clone()], None, at(9)).await;
        let record = &report.document.companies[0];
        assert_eq!(record.summary.as_deref(), Some("Cached summary from before."));
        assert_eq!(record.tos_url, acme.url);
        assert_eq!(record.last_checked, None);
        assert_eq!(record.changed, None);
    }

    #[tokio::test]
    async fn test_fetch_timeout_is_a_fetch_failure() {
        let fetcher = FakeFetcher {
            delay: Some(Duration::from_secs(30)),
            ..Default::default()
        };
        let h = harness_with(fetcher, Duration::from_millis(20));
        let acme = source("Acme");
        h.fetcher.set(&acme.url, "ToS text v1");

        let err = h.pipeline.process_source(&acme, at(9)).await.unwrap_err();
        assert_eq!(err.stage(), Stage::Fetch);
        assert!(matches!(err, SourceError::Fetch(FetchError::Timeout(_))));
        assert!(h.archive.latest(&acme.slug).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_summary_failure_keeps_change_flag_and_prior_summary() {
        let h = harness();
        let acme = source("Acme");
        h.fetcher.set(&acme.url, "ToS text v1");
        let first = h.pipeline.run(&[acme.clone()], None, at(9)).await;

        h.summarizer.fail.store(true, Ordering::SeqCst);
        h.fetcher.set(&acme.url, "ToS text v2 - something changed");
        let second = h
            .pipeline
            .run(&[acme.clone()], Some(&first.document), at(10))
            .await;

        let record = &second.document.companies[0];
        assert_eq!(record.changed, Some(true));
        assert!(record.change_reason.is_some());
        assert_eq!(record.summary.as_deref(), Some("overview summary"));
        assert_eq!(h.archive.snapshots(&acme.slug).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_first_snapshot_summary_failure_uses_placeholder() {
        let h = harness();
        let acme = source("Acme");
        h.summarizer.fail.store(true, Ordering::SeqCst);
        h.fetcher.set(&acme.url, "ToS text v1");

        let report = h.pipeline.run(&[acme.clone()], None, at(9)).await;
        assert_eq!(
            report.document.companies[0].summary.as_deref(),
            Some(PLACEHOLDER_SUMMARY)
        );
        assert_eq!(h.archive.read_summary(&acme.slug).unwrap(), None);
        assert_eq!(h.archive.snapshots(&acme.slug).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_one_failing_source_does_not_affect_others() {
        let h = harness();
        let sources = vec![source("Broken"), source("Acme"), source("Beta")];
        h.fetcher.set(&sources[1].url, "Acme terms");
        h.fetcher.set(&sources[2].url, "Beta terms");

        let report = h.pipeline.run(&sources, None, at(9)).await;

        let names: Vec<&str> = report
            .document
            .companies
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(names, vec!["Broken", "Acme", "Beta"]);
        assert_eq!(
            report.statuses,
            vec![
                SourceStatus::Failed,
                SourceStatus::FirstSnapshot,
                SourceStatus::FirstSnapshot
            ]
        );
        assert_eq!(report.count(SourceStatus::Failed), 1);
        assert_eq!(report.archived(), 2);
        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_archive_failure_aborts_source_and_keeps_prior_record() {
        let h = harness();
        let acme = source("Acme");
        h.fetcher.set(&acme.url, "ToS text v2");
        std::fs::write(h.archive.root().join(&acme.slug), "not a directory").unwrap();

        let prior_record = ResultRecord {
            last_checked: Some(at(8)),
            changed: Some(true),
            change_reason: Some("document changed by 12.0%".to_string()),
            summary: Some("Earlier summary.".to_string()),
            ..ResultRecord::bare(&acme)
        };
        let prior = ResultsDocument {
            updated_at: at(8),
            companies: vec![prior_record.clone()],
        };

        let err = h.pipeline.process_source(&acme, at(9)).await.unwrap_err();
        assert_eq!(err.stage(), Stage::Archive);

        let report = h.pipeline.run(&[acme], Some(&prior), at(9)).await;
        assert_eq!(report.statuses, vec![SourceStatus::Failed]);
        assert_eq!(report.document.companies, vec![prior_record]);
        assert_eq!(h.summarizer.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_identical_rerun_never_consults_classifier() {
        let calls = Arc::new(AtomicUsize::new(0));
        let classifier = ChangeClassifier::with_rules(vec![Box::new(CountingRule {
            calls: Arc::clone(&calls),
        })]);
        let h = build_harness(FakeFetcher::default(), Duration::from_secs(5), classifier);
        let acme = source("Acme");

        h.fetcher.set(&acme.url, "ToS text v1");
        let first = h.pipeline.run(&[acme.clone()], None, at(9)).await;
        let second = h
            .pipeline
            .run(&[acme.clone()], Some(&first.document), at(10))
            .await;
        assert_eq!(second.statuses, vec![SourceStatus::Unchanged]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        h.fetcher.set(&acme.url, "ToS text v1, amended");
        let third = h
            .pipeline
            .run(&[acme], Some(&second.document), at(11))
            .await;
        assert_eq!(third.statuses, vec![SourceStatus::Cosmetic]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    async fn run_once(h: &Harness, source: &Source, text: &str, hour: u32) -> ResultsDocument {
        h.fetcher.set(&source.url, text);
        h.pipeline.run(&[source.clone()], None, at(hour)).await.document
    }

    #[tokio::test]
    async fn test_summarizer_called_only_when_content_changes() {
        let h = harness();
        let acme = source("Acme");

        run_once(&h, &acme, "ToS content A", 9).await;
        assert_eq!(h.summarizer.total_calls(), 1);

        std::fs::remove_file(h.archive.root().join(&acme.slug).join("summary.txt")).unwrap();
        run_once(&h, &acme, "ToS content A", 10).await;
        assert_eq!(h.summarizer.total_calls(), 1);

        h.archive.write_summary(&acme.slug, "Existing summary.").unwrap();
        let doc = run_once(&h, &acme, "ToS content A", 11).await;
        assert_eq!(h.summarizer.total_calls(), 1);
        assert_eq!(doc.companies[0].summary.as_deref(), Some("Existing summary."));

        run_once(&h, &acme, "ToS content B - something changed", 12).await;
        assert_eq!(h.summarizer.total_calls(), 2);
    }
}
