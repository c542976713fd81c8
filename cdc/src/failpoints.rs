//! Named fault injection points, active only with the `failpoints` feature.

use fail::fail_point;

use crate::error::CdcResult;

/// Between applying a change set and committing the transaction.
pub const RECONCILE_BEFORE_COMMIT: &str = "reconcile.before_commit";

/// After staging was loaded and verified, before reconciliation starts.
pub const PIPELINE_AFTER_LOAD: &str = "pipeline.after_load";

/// Returns an error when the failpoint `name` is configured with `return`.
#[cfg_attr(not(feature = "failpoints"), allow(unused_variables))]
pub fn cdc_fail_point(name: &str) -> CdcResult<()> {
    fail_point!(name, |_| {
        crate::bail!(
            crate::error::ErrorKind::FailpointTriggered,
            "An error occurred in a fail point",
            format!("The failpoint '{name}' returned an error")
        );
    });

    Ok(())
}
