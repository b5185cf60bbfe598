use crate::domain::error::PipelineError;
use crate::domain::ports::ExampleBank;
use crate::domain::text2sql_entities::ExampleStats;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// `(rate * count + outcome) / (count + 1)`, clamped to `[0, 1]`.
pub fn incremental_mean(success_rate: f64, usage_count: i64, success: bool) -> f64 {
    let count = usage_count.max(0) as f64;
    let observation = if success { 1.0 } else { 0.0 };
    ((success_rate * count + observation) / (count + 1.0)).clamp(0.0, 1.0)
}

/// Folds execution outcomes into example statistics. The read-modify-write
/// happens inside the store as one atomic operation.
#[derive(Clone)]
pub struct FeedbackUpdater {
    bank: Arc<dyn ExampleBank>,
}

impl FeedbackUpdater {
    pub fn new(bank: Arc<dyn ExampleBank>) -> Self {
        Self { bank }
    }

    pub async fn record(
        &self,
        example_id: i64,
        success: bool,
    ) -> Result<ExampleStats, PipelineError> {
        let stats = self
            .bank
            .record_outcome(example_id, success)
            .await
            .map_err(|e| PipelineError::FeedbackUpdate(e.to_string()))?;
        debug!(
            "Example {} now at success_rate={:.3} usage_count={}",
            stats.example_id, stats.success_rate, stats.usage_count
        );
        Ok(stats)
    }

    /// Fire-and-forget update. Failures are logged as `FeedbackUpdateError`
    /// and never reach the caller. `None` means no example was used and
    /// nothing is recorded.
    pub fn spawn_record(
        &self,
        example_id: Option<i64>,
        success: bool,
    ) -> Option<JoinHandle<Option<ExampleStats>>> {
        let example_id = example_id?;
        let updater = self.clone();
        Some(tokio::spawn(async move {
            match updater.record(example_id, success).await {
                Ok(stats) => Some(stats),
                Err(e) => {
                    warn!("[{}] example {}: {}", e.kind(), example_id, e);
                    None
                }
            }
        }))
    }
}
