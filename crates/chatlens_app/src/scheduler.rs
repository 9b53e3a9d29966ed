use std::sync::Arc;
use std::time::{Duration, Instant};

use chatlens_config::AppConfig;
use chatlens_domain::{
    Analysis, AnnotationClient, AnnotationFailure, Checkpoint, Conversation, ProblemKeywordDetector,
    RunMetadata,
};
use derive_setters::Setters;
use futures::{StreamExt, stream};
use strum_macros::Display;
use tracing::{debug, info, warn};

use crate::{
    BatchReport, CheckpointStore, Error, Result, ResultStore, RetryExecutor, RetryPolicy,
    RunSummary, Sleeper, TokioSleeper,
};

/// How a run treats state left by an earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum StartMode {
    /// Discard the checkpoint and the result store.
    Fresh,
    /// Continue after the checkpoint, or start fresh when there is none.
    Resume,
}

#[derive(Debug, Clone, PartialEq, Setters)]
#[setters(into)]
pub struct SchedulerConfig {
    pub batch_size: usize,
    pub max_concurrency: usize,
    pub task_timeout: Duration,
    pub inter_batch_delay: Duration,
    /// Recorded in the run metadata.
    pub gap_threshold_minutes: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: 25,
            max_concurrency: 3,
            task_timeout: Duration::from_secs(120),
            inter_batch_delay: Duration::from_secs(1),
            gap_threshold_minutes: 30,
        }
    }
}

impl From<&AppConfig> for SchedulerConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            batch_size: config.pipeline.batch_size,
            max_concurrency: config.pipeline.max_concurrency,
            task_timeout: config.pipeline.task_timeout(),
            inter_batch_delay: config.pipeline.inter_batch_delay(),
            gap_threshold_minutes: config.segmentation.gap_threshold_minutes,
        }
    }
}

enum TaskOutcome {
    Success { conversation: Conversation, retries: usize },
    Failure { conversation: Conversation, failure: AnnotationFailure, retries: usize },
}

/// Annotates conversations batch by batch.
///
/// Inside a batch up to `max_concurrency` conversations are in flight at once.
/// A batch is appended to the result store as a whole and the checkpoint only
/// moves after that append succeeded, so an interrupted batch is redone in full
/// on the next resume.
pub struct BatchScheduler<C: ?Sized, R: ?Sized, K: ?Sized> {
    client: Arc<C>,
    results: Arc<R>,
    checkpoints: Arc<K>,
    detector: ProblemKeywordDetector,
    retry: RetryExecutor,
    sleeper: Arc<dyn Sleeper>,
    config: SchedulerConfig,
}

impl<C, R, K> BatchScheduler<C, R, K>
where
    C: AnnotationClient + ?Sized,
    R: ResultStore + ?Sized,
    K: CheckpointStore + ?Sized,
{
    pub fn new(client: Arc<C>, results: Arc<R>, checkpoints: Arc<K>) -> Self {
        Self {
            client,
            results,
            checkpoints,
            detector: ProblemKeywordDetector::default(),
            retry: RetryExecutor::new(RetryPolicy::default()),
            sleeper: Arc::new(TokioSleeper),
            config: SchedulerConfig::default(),
        }
    }

    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn detector(mut self, detector: ProblemKeywordDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn retry(mut self, retry: RetryExecutor) -> Self {
        self.retry = retry;
        self
    }

    /// Sleeper used for the pause between batches.
    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Annotates `conversations`, which must be in segmentation order.
    ///
    /// # Errors
    /// Only persistence problems and an unusable checkpoint end the run.
    /// Oracle failures are recorded per conversation.
    pub async fn run(&self, conversations: Vec<Conversation>, mode: StartMode) -> Result<RunSummary> {
        let started = Instant::now();
        let total = conversations.len();
        let start = self.prepare(total, mode).await?;
        let mut summary = RunSummary { total, skipped: start, ..Default::default() };

        if start >= total {
            info!(total, "All conversations already processed");
            return Ok(summary);
        }

        let batch_size = self.config.batch_size.max(1);
        info!(
            total,
            start,
            batch_size,
            max_concurrency = self.config.max_concurrency,
            provider = self.client.provider(),
            model = self.client.model(),
            "Starting analysis"
        );

        for (offset, batch) in conversations[start..].chunks(batch_size).enumerate() {
            if offset > 0 && !self.config.inter_batch_delay.is_zero() {
                self.sleeper.sleep(self.config.inter_batch_delay).await;
            }

            let begin = start + offset * batch_size;
            let (annotated, report) = self.process_batch(offset, begin, batch).await;

            self.results.append(&annotated).await?;
            self.checkpoints.save(&Checkpoint::new(report.end, total)).await?;

            info!(
                batch = report.index + 1,
                succeeded = report.succeeded,
                failed = report.failed,
                retries = report.retries,
                progress = report.end,
                total,
                "Batch persisted"
            );
            summary.batches.push(report);
        }

        summary.elapsed = started.elapsed();
        info!(
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            elapsed_secs = summary.elapsed.as_secs_f64(),
            "Analysis complete"
        );
        Ok(summary)
    }

    /// Brings both stores in line with `mode` and returns the index to
    /// continue from.
    async fn prepare(&self, total: usize, mode: StartMode) -> Result<usize> {
        let checkpoint = match mode {
            StartMode::Fresh => None,
            StartMode::Resume => self.checkpoints.load().await?,
        };

        let Some(checkpoint) = checkpoint else {
            if mode == StartMode::Resume {
                info!("No checkpoint found, starting fresh");
            }
            self.checkpoints.clear().await?;
            self.results.reset(self.metadata(total)).await?;
            return Ok(0);
        };

        if checkpoint.total_count != total {
            return Err(Error::CheckpointMismatch { expected: total, found: checkpoint.total_count });
        }

        let done = checkpoint.last_completed_index.min(total);
        let document = self.results.load().await?;
        let stored = document.as_ref().map(|doc| doc.conversations.len()).unwrap_or_default();

        if stored < done {
            return Err(Error::StoreBehindCheckpoint { stored, checkpoint: done });
        }
        if document.is_none() {
            self.results.reset(self.metadata(total)).await?;
        } else if stored > done {
            warn!(stored, checkpoint = done, "Dropping results of an unfinished batch");
            self.results.truncate(done).await?;
        }

        info!(resume_from = done, total, "Resuming from checkpoint");
        Ok(done)
    }

    fn metadata(&self, total: usize) -> RunMetadata {
        RunMetadata::new(total, self.client.provider(), self.client.model())
            .gap_threshold_minutes(self.config.gap_threshold_minutes)
    }

    async fn process_batch(
        &self,
        index: usize,
        start: usize,
        batch: &[Conversation],
    ) -> (Vec<Conversation>, BatchReport) {
        let mut report = BatchReport::new(index, start, start + batch.len());
        debug!(batch = index + 1, start, size = batch.len(), "Processing batch");

        let outcomes: Vec<TaskOutcome> = stream::iter(batch.iter().cloned())
            .map(|conversation| self.annotate(conversation))
            .buffered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        let annotated = outcomes
            .into_iter()
            .map(|outcome| match outcome {
                TaskOutcome::Success { conversation, retries } => {
                    report.succeeded += 1;
                    report.retries += retries;
                    conversation
                }
                TaskOutcome::Failure { conversation, failure, retries } => {
                    report.record_failure(failure.kind);
                    report.retries += retries;
                    conversation
                }
            })
            .collect();

        (annotated, report)
    }

    /// Runs the oracle under the task timeout, then merges keyword problems
    /// into whatever analysis came out.
    async fn annotate(&self, mut conversation: Conversation) -> TaskOutcome {
        let keywords = self.detector.detect(&conversation);
        let timeout = self.config.task_timeout;

        let (result, retries) =
            match tokio::time::timeout(timeout, self.retry.run(self.client.as_ref(), &conversation))
                .await
            {
                Ok(outcome) => (outcome.result, outcome.backoffs.len()),
                Err(_) => (
                    Err(AnnotationFailure::timeout(format!(
                        "Task exceeded {}s",
                        timeout.as_secs_f64()
                    ))),
                    0,
                ),
            };

        match result {
            Ok(mut analysis) => {
                analysis.problems.merge(keywords);
                conversation.analysis = Some(analysis);
                TaskOutcome::Success { conversation, retries }
            }
            Err(failure) => {
                warn!(
                    dialogue_id = %conversation.dialogue_id,
                    kind = %failure.kind,
                    error = %failure.message,
                    "Conversation left unanalyzed"
                );
                let mut analysis = Analysis::unanalyzed(failure.to_string());
                analysis.problems.merge(keywords);
                conversation.analysis = Some(analysis);
                TaskOutcome::Failure { conversation, failure, retries }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chatlens_domain::{
        AnalysisStatus, DialogueId, FailureKind, Intent, ProblemDetection, ProblemKind,
        RequestClassification, UxAnalysis,
    };
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::retry::tests::RecordingSleeper;
    use crate::{MemoryCheckpointStore, MemoryResultStore, ResultDocument};

    #[derive(Default)]
    struct FakeClient {
        failing: BTreeSet<u64>,
        hanging: BTreeSet<u64>,
        latency: Duration,
        calls: Mutex<Vec<u64>>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl FakeClient {
        fn failing(ids: impl IntoIterator<Item = u64>) -> Self {
            Self { failing: ids.into_iter().collect(), ..Default::default() }
        }

        fn hanging(ids: impl IntoIterator<Item = u64>) -> Self {
            Self { hanging: ids.into_iter().collect(), ..Default::default() }
        }

        fn slow(latency: Duration) -> Self {
            Self { latency, ..Default::default() }
        }

        fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }

        fn calls(&self) -> Vec<u64> {
            let mut calls = self.calls.lock().unwrap().clone();
            calls.sort();
            calls
        }
    }

    #[async_trait]
    impl AnnotationClient for FakeClient {
        async fn analyze(&self, conversation: &Conversation) -> std::result::Result<Analysis, AnnotationFailure> {
            let id = conversation.dialogue_id.value();
            self.calls.lock().unwrap().push(id);
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(running, Ordering::SeqCst);
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.hanging.contains(&id) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if self.failing.contains(&id) {
                return Err(AnnotationFailure::other("HTTP 500: boom"));
            }
            Ok(Analysis::new(
                RequestClassification::new([Intent::TechnicalHelp]),
                ProblemDetection::default(),
                UxAnalysis::default(),
            ))
        }

        fn provider(&self) -> &str {
            "fake"
        }

        fn model(&self) -> &str {
            "fake-model"
        }
    }

    fn conversations(count: u64) -> Vec<Conversation> {
        (1..=count)
            .map(|id| {
                Conversation::new(
                    DialogueId::new(id),
                    1_i64,
                    Utc.with_ymd_and_hms(2025, 7, 1, 10, 0, 0).unwrap(),
                )
                .full_text(format!("request {id}"))
            })
            .collect()
    }

    struct Fixture {
        client: Arc<FakeClient>,
        results: Arc<MemoryResultStore>,
        checkpoints: Arc<MemoryCheckpointStore>,
        pauses: Arc<RecordingSleeper>,
    }

    impl Fixture {
        fn new(client: FakeClient) -> Self {
            Self::with_stores(client, MemoryResultStore::new(), MemoryCheckpointStore::new())
        }

        fn with_stores(
            client: FakeClient,
            results: MemoryResultStore,
            checkpoints: MemoryCheckpointStore,
        ) -> Self {
            Self {
                client: Arc::new(client),
                results: Arc::new(results),
                checkpoints: Arc::new(checkpoints),
                pauses: Arc::new(RecordingSleeper::default()),
            }
        }

        fn scheduler(&self) -> BatchScheduler<FakeClient, MemoryResultStore, MemoryCheckpointStore> {
            BatchScheduler::new(self.client.clone(), self.results.clone(), self.checkpoints.clone())
                .config(SchedulerConfig::default().batch_size(2usize).task_timeout(Duration::from_secs(5)))
                .retry(RetryExecutor::with_sleeper(
                    RetryPolicy::default().jitter(false),
                    Arc::new(RecordingSleeper::default()),
                ))
                .sleeper(self.pauses.clone())
        }

        async fn stored_ids(&self) -> Vec<u64> {
            self.results
                .load()
                .await
                .unwrap()
                .map(|doc| doc.conversations.iter().map(|c| c.dialogue_id.value()).collect())
                .unwrap_or_default()
        }
    }

    #[tokio::test]
    async fn test_fresh_run_processes_everything_in_order() {
        let fixture = Fixture::new(FakeClient::default());

        let actual = fixture.scheduler().run(conversations(5), StartMode::Fresh).await.unwrap();

        assert_eq!(actual.batches.len(), 3);
        assert_eq!(actual.succeeded(), 5);
        assert_eq!(fixture.stored_ids().await, vec![1, 2, 3, 4, 5]);
        let checkpoint = fixture.checkpoints.load().await.unwrap().unwrap();
        assert_eq!((checkpoint.last_completed_index, checkpoint.total_count), (5, 5));
        assert_eq!(*fixture.pauses.0.lock().unwrap(), vec![Duration::from_secs(1); 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_calls_never_exceed_max_concurrency() {
        let fixture = Fixture::new(FakeClient::slow(Duration::from_millis(50)));
        let scheduler = fixture.scheduler().config(
            SchedulerConfig::default()
                .batch_size(10usize)
                .max_concurrency(3usize)
                .task_timeout(Duration::from_secs(5)),
        );

        let actual = scheduler.run(conversations(10), StartMode::Fresh).await.unwrap();

        assert_eq!(actual.succeeded(), 10);
        assert_eq!(fixture.client.peak(), 3);
    }

    #[tokio::test]
    async fn test_failures_are_kept_as_unanalyzed() {
        let fixture = Fixture::new(FakeClient::failing([2]));
        let mut input = conversations(3);
        input[1].full_text = "Server error again".to_string();

        let actual = fixture.scheduler().run(input, StartMode::Fresh).await.unwrap();

        assert_eq!((actual.succeeded(), actual.failed()), (2, 1));
        let document = fixture.results.load().await.unwrap().unwrap();
        let failed = document.conversations[1].analysis.as_ref().unwrap();
        assert_eq!(failed.status, AnalysisStatus::Unanalyzed);
        assert_eq!(failed.problems.problems, BTreeSet::from([ProblemKind::TechnicalIssues]));
        assert!(document.conversations[0].is_analyzed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_task_times_out() {
        let fixture = Fixture::new(FakeClient::hanging([1]));

        let actual = fixture.scheduler().run(conversations(2), StartMode::Fresh).await.unwrap();

        assert_eq!(actual.timed_out(), 1);
        let document = fixture.results.load().await.unwrap().unwrap();
        let analysis = document.conversations[0].analysis.as_ref().unwrap();
        assert!(!analysis.is_analyzed());
        assert!(analysis.failure.as_deref().unwrap_or_default().starts_with(&FailureKind::Timeout.to_string()));
        assert!(document.conversations[1].is_analyzed());
    }

    #[tokio::test]
    async fn test_resume_skips_completed_conversations() {
        let done = conversations(2);
        let fixture = Fixture::with_stores(
            FakeClient::default(),
            MemoryResultStore::with_document(ResultDocument {
                metadata: RunMetadata::new(5, "fake", "fake-model"),
                conversations: done,
            }),
            MemoryCheckpointStore::with_checkpoint(Checkpoint::new(2, 5)),
        );

        let actual = fixture.scheduler().run(conversations(5), StartMode::Resume).await.unwrap();

        assert_eq!(actual.skipped, 2);
        assert_eq!(fixture.client.calls(), vec![3, 4, 5]);
        assert_eq!(fixture.stored_ids().await, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_resume_truncates_unfinished_batch() {
        let fixture = Fixture::with_stores(
            FakeClient::default(),
            MemoryResultStore::with_document(ResultDocument {
                metadata: RunMetadata::new(4, "fake", "fake-model"),
                conversations: conversations(3),
            }),
            MemoryCheckpointStore::with_checkpoint(Checkpoint::new(2, 4)),
        );

        fixture.scheduler().run(conversations(4), StartMode::Resume).await.unwrap();

        assert_eq!(fixture.client.calls(), vec![3, 4]);
        assert_eq!(fixture.stored_ids().await, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_resume_rejects_different_input() {
        let fixture = Fixture::with_stores(
            FakeClient::default(),
            MemoryResultStore::new(),
            MemoryCheckpointStore::with_checkpoint(Checkpoint::new(2, 10)),
        );

        let actual = fixture.scheduler().run(conversations(4), StartMode::Resume).await;

        assert!(matches!(actual, Err(Error::CheckpointMismatch { expected: 4, found: 10 })));
        assert!(fixture.client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_resume_rejects_store_behind_checkpoint() {
        let fixture = Fixture::with_stores(
            FakeClient::default(),
            MemoryResultStore::with_document(ResultDocument {
                metadata: RunMetadata::new(4, "fake", "fake-model"),
                conversations: conversations(1),
            }),
            MemoryCheckpointStore::with_checkpoint(Checkpoint::new(2, 4)),
        );

        let actual = fixture.scheduler().run(conversations(4), StartMode::Resume).await;

        assert!(matches!(actual, Err(Error::StoreBehindCheckpoint { stored: 1, checkpoint: 2 })));
    }

    #[tokio::test]
    async fn test_fresh_discards_previous_state() {
        let fixture = Fixture::with_stores(
            FakeClient::default(),
            MemoryResultStore::with_document(ResultDocument {
                metadata: RunMetadata::new(9, "old", "old"),
                conversations: conversations(9),
            }),
            MemoryCheckpointStore::with_checkpoint(Checkpoint::new(9, 9)),
        );

        fixture.scheduler().run(conversations(3), StartMode::Fresh).await.unwrap();

        assert_eq!(fixture.stored_ids().await, vec![1, 2, 3]);
        let document = fixture.results.load().await.unwrap().unwrap();
        assert_eq!(document.metadata.provider, "fake");
        assert_eq!(document.metadata.total_conversations, 3);
    }

    #[tokio::test]
    async fn test_completed_checkpoint_makes_resume_a_no_op() {
        let fixture = Fixture::with_stores(
            FakeClient::default(),
            MemoryResultStore::with_document(ResultDocument {
                metadata: RunMetadata::new(3, "fake", "fake-model"),
                conversations: conversations(3),
            }),
            MemoryCheckpointStore::with_checkpoint(Checkpoint::new(3, 3)),
        );

        let actual = fixture.scheduler().run(conversations(3), StartMode::Resume).await.unwrap();

        assert!(actual.batches.is_empty());
        assert!(actual.is_complete());
        assert!(fixture.client.calls().is_empty());
    }
}
