use std::future::Future;

use chrono::{DateTime, Utc};

use crate::error::CdcResult;

/// What a notifier learns about a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunCompletion {
    pub pipeline_name: String,
    pub finished_at: DateTime<Utc>,
}

/// Downstream collaborator told about successful runs.
///
/// Notifiers are only invoked after the reconciliation committed, so they never see failures.
pub trait Notifier {
    fn notify_success(
        &self,
        completion: &RunCompletion,
    ) -> impl Future<Output = CdcResult<()>> + Send;
}
