use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chatlens_app::{
    BatchScheduler, CheckpointStore, JsonCheckpointStore, JsonResultStore, ResultDocument,
    ResultStore, RetryExecutor, RetryPolicy, SchedulerConfig, StartMode,
};
use chatlens_config::AppConfig;
use chatlens_domain::{
    Checkpoint, Conversation, ConversationStats, EventSegmenter, ProblemKeywordDetector,
    ProblemSummary, parse_events,
};
use chatlens_provider::Client;
use tracing::{info, warn};

use crate::Command;

/// Executes CLI commands against a loaded configuration.
pub struct Runner {
    config: AppConfig,
}

impl Runner {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub async fn run(&self, command: Command) -> Result<()> {
        let mode = command.start_mode();
        match command {
            Command::Segment { events, out } => self.segment(&events, out.as_deref()).await,
            Command::Problems { events, top } => self.problems(&events, top).await,
            Command::Analyze { events, .. } => {
                self.analyze(&events, mode.unwrap_or(StartMode::Resume)).await
            }
            Command::Status => self.status().await,
            Command::Reset => self.reset().await,
        }
    }

    fn segmenter(&self) -> EventSegmenter {
        EventSegmenter::from_minutes(self.config.segmentation.gap_threshold_minutes)
    }

    fn detector(&self) -> ProblemKeywordDetector {
        ProblemKeywordDetector::new(self.config.detector.latency_threshold())
    }

    async fn segment(&self, events: &Path, out: Option<&Path>) -> Result<()> {
        let conversations = load_conversations(events, &self.segmenter()).await?;
        println!("{}", render_stats(&ConversationStats::from_conversations(&conversations)));

        if let Some(out) = out {
            let content = serde_json::to_string_pretty(&conversations)
                .context("Failed to serialize conversations")?;
            tokio::fs::write(out, content)
                .await
                .with_context(|| format!("Failed to write {}", out.display()))?;
            println!("Conversations written to {}", out.display());
        }
        Ok(())
    }

    async fn problems(&self, events: &Path, top: usize) -> Result<()> {
        let conversations = load_conversations(events, &self.segmenter()).await?;
        let summary = ProblemSummary::with_top(&self.detector(), &conversations, top);
        println!("{}", render_problems(&summary));
        Ok(())
    }

    async fn analyze(&self, events: &Path, mode: StartMode) -> Result<()> {
        self.config.validate().context("Invalid configuration")?;
        let conversations = load_conversations(events, &self.segmenter()).await?;

        let client = Client::new(&self.config.provider, self.config.pipeline.prompt_char_budget)
            .context("Failed to set up the provider client")?;
        let storage = &self.config.storage;
        let scheduler = BatchScheduler::new(
            Arc::new(client),
            Arc::new(JsonResultStore::new(storage.results_path())),
            Arc::new(JsonCheckpointStore::new(storage.checkpoint_path())),
        )
        .config(SchedulerConfig::from(&self.config))
        .detector(self.detector())
        .retry(RetryExecutor::new(RetryPolicy::from(&self.config.retry)));

        info!(%mode, events = %events.display(), "Starting analysis run");
        tokio::select! {
            summary = scheduler.run(conversations, mode) => {
                let summary = summary.context("Analysis run failed")?;
                println!("{summary}");
                println!("Results: {}", storage.results_path().display());
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, the last persisted batch is kept");
                println!("Interrupted. Run `chatlens analyze` again to resume.");
            }
        }
        Ok(())
    }

    async fn status(&self) -> Result<()> {
        let storage = &self.config.storage;
        let checkpoint = JsonCheckpointStore::new(storage.checkpoint_path())
            .load()
            .await
            .context("Failed to read the checkpoint")?;
        let document = JsonResultStore::new(storage.results_path())
            .load()
            .await
            .context("Failed to read the result store")?;
        println!("{}", render_status(checkpoint.as_ref(), document.as_ref()));
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        let storage = &self.config.storage;
        JsonCheckpointStore::new(storage.checkpoint_path())
            .clear()
            .await
            .context("Failed to delete the checkpoint")?;
        JsonResultStore::new(storage.results_path())
            .clear()
            .await
            .context("Failed to delete the result store")?;
        info!(dir = %storage.output_dir.display(), "Run state removed");
        println!("Checkpoint and results removed");
        Ok(())
    }
}

/// Reads and segments an event log.
pub async fn load_conversations(path: &Path, segmenter: &EventSegmenter) -> Result<Vec<Conversation>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let events = parse_events(&content)
        .with_context(|| format!("Failed to parse events in {}", path.display()))?;

    let count = events.len();
    let conversations = segmenter.segment(events);
    info!(events = count, conversations = conversations.len(), "Segmented event log");
    Ok(conversations)
}

fn render_stats(stats: &ConversationStats) -> String {
    format!(
        "Conversations:      {}\nMessages:           {}\nUnique users:       {}\nAvg duration (min): {:.2}\nAvg messages:       {:.2}",
        stats.total_conversations,
        stats.total_messages,
        stats.unique_users,
        stats.avg_duration_minutes,
        stats.avg_message_count
    )
}

fn render_problems(summary: &ProblemSummary) -> String {
    let mut out = format!(
        "Problematic conversations: {}/{} ({:.1}%)",
        summary.problematic_conversations,
        summary.total_conversations,
        summary.problem_rate * 100.0
    );
    for (kind, count) in summary.counts.iter().filter(|(_, count)| **count > 0) {
        let percentage = summary.percentages.get(kind).copied().unwrap_or_default();
        out.push_str(&format!("\n  {kind}: {count} ({percentage:.1}%)"));
    }
    let top: Vec<String> = summary
        .top
        .iter()
        .filter(|(_, count)| *count > 0)
        .map(|(kind, count)| format!("{kind} ({count})"))
        .collect();
    if !top.is_empty() {
        out.push_str(&format!("\nMost frequent: {}", top.join(", ")));
    }
    out
}

fn render_status(checkpoint: Option<&Checkpoint>, document: Option<&ResultDocument>) -> String {
    let Some(checkpoint) = checkpoint else {
        return "No checkpoint, the next run starts fresh".to_string();
    };

    let percentage = if checkpoint.total_count == 0 {
        100.0
    } else {
        checkpoint.last_completed_index as f64 / checkpoint.total_count as f64 * 100.0
    };
    let mut out = format!(
        "Progress:  {}/{} ({percentage:.1}%)\nRemaining: {}\nUpdated:   {}",
        checkpoint.last_completed_index,
        checkpoint.total_count,
        checkpoint.remaining(),
        checkpoint.timestamp.to_rfc3339()
    );
    if let Some(document) = document {
        let analyzed = document.conversations.iter().filter(|c| c.is_analyzed()).count();
        out.push_str(&format!(
            "\nStored:    {} ({analyzed} analyzed)\nProvider:  {} / {}",
            document.conversations.len(),
            document.metadata.provider,
            document.metadata.model
        ));
    }
    if checkpoint.is_complete() {
        out.push_str("\nRun complete");
    }
    out
}
