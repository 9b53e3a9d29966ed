use std::path::{Path, PathBuf};
use std::time::Duration;

use derive_setters::Setters;
use serde::{Deserialize, Serialize};

use crate::{Error, ProviderConfig, Result};

const DEFAULT_CONFIG: &str = include_str!("../defaults.json");
const USER_CONFIG: &str = "chatlens.toml";
const ENV_PREFIX: &str = "CHATLENS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Setters)]
#[setters(into)]
pub struct PipelineConfig {
    pub batch_size: usize,
    pub max_concurrency: usize,
    pub task_timeout_secs: u64,
    pub inter_batch_delay_ms: u64,
    /// Characters of conversation text sent to the oracle.
    pub prompt_char_budget: usize,
}

impl PipelineConfig {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_millis(self.inter_batch_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Setters)]
#[setters(into)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub backoff_base_ms: u64,
    /// Upper bound for a single backoff sleep, hints included.
    pub max_delay_secs: u64,
}

impl RetryConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Setters)]
#[setters(into)]
pub struct SegmentationConfig {
    pub gap_threshold_minutes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Setters)]
#[setters(into)]
pub struct DetectorConfig {
    pub latency_threshold_secs: u64,
}

impl DetectorConfig {
    pub fn latency_threshold(&self) -> Duration {
        Duration::from_secs(self.latency_threshold_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Setters)]
#[setters(into)]
pub struct StorageConfig {
    pub output_dir: PathBuf,
    pub results_file: String,
    pub checkpoint_file: String,
}

impl StorageConfig {
    pub fn results_path(&self) -> PathBuf {
        self.output_dir.join(&self.results_file)
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.output_dir.join(&self.checkpoint_file)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.output_dir.join("logs")
    }
}

/// Complete runtime configuration of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Setters)]
#[setters(into)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub pipeline: PipelineConfig,
    pub retry: RetryConfig,
    pub segmentation: SegmentationConfig,
    pub detector: DetectorConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Loads the configuration from its layered sources, lowest priority
    /// first:
    /// 1. Embedded defaults (`defaults.json` in the crate root)
    /// 2. The user file: `path` when given, otherwise `chatlens.toml` in the
    ///    working directory if present
    /// 3. Environment variables prefixed with `CHATLENS_`, using `__` for
    ///    nesting, e.g. `CHATLENS_PIPELINE__BATCH_SIZE=50`
    ///
    /// # Errors
    /// Fails when a source cannot be read or parsed, or when the merged
    /// values do not pass validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Same as [`AppConfig::load`] with an explicit environment in place of
    /// the process environment.
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self> {
        let user_file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::from(Path::new(USER_CONFIG)).required(false),
        };

        let config: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Json))
            .add_source(user_file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        tracing::debug!(provider = %config.provider.id, model = %config.provider.model, "Configuration loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("pipeline.batch_size", self.pipeline.batch_size),
            ("pipeline.max_concurrency", self.pipeline.max_concurrency),
            ("retry.max_attempts", self.retry.max_attempts),
        ];
        if let Some((field, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(Error::Invalid { field: *field, reason: "must be greater than zero".into() });
        }
        if self.pipeline.task_timeout_secs == 0 {
            return Err(Error::Invalid {
                field: "pipeline.task_timeout_secs",
                reason: "must be greater than zero".into(),
            });
        }
        if self.provider.model.trim().is_empty() {
            return Err(Error::Invalid { field: "provider.model", reason: "must not be empty".into() });
        }
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(Error::Invalid {
                field: "provider.temperature",
                reason: format!("{} is outside 0.0..=2.0", self.provider.temperature),
            });
        }
        self.provider.endpoint()?;
        Ok(())
    }
}
