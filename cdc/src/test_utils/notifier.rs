use std::sync::Arc;

use tokio::sync::Mutex;

use crate::bail;
use crate::error::{CdcResult, ErrorKind};
use crate::notification::{Notifier, RunCompletion};

/// Notifier that records every completion, optionally failing after recording it.
#[derive(Debug, Clone, Default)]
pub struct MemoryNotifier {
    completions: Arc<Mutex<Vec<RunCompletion>>>,
    fail: bool,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose deliveries always fail.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub async fn completions(&self) -> Vec<RunCompletion> {
        self.completions.lock().await.clone()
    }
}

impl Notifier for MemoryNotifier {
    async fn notify_success(&self, completion: &RunCompletion) -> CdcResult<()> {
        self.completions.lock().await.push(completion.clone());

        if self.fail {
            bail!(
                ErrorKind::NotificationFailed,
                "Notification channel unavailable"
            );
        }

        Ok(())
    }
}
