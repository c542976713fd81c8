use tracing::debug;

use crate::error::CdcResult;
use crate::notification::{Notifier, RunCompletion};

/// Notifier used when no notification channel is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    async fn notify_success(&self, completion: &RunCompletion) -> CdcResult<()> {
        debug!(
            pipeline = %completion.pipeline_name,
            "no notification channel configured, skipping success notification"
        );

        Ok(())
    }
}
