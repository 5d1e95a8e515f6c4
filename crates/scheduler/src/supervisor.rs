//! Supervision of long-running internal jobs.

use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

use crate::metrics::Metrics;
use crate::state::TerminalError;

/// Runs `job` forever, restarting it after `restart_delay` whenever it
/// exits, and counting every start. A [`TerminalError`] is the one way out:
/// it is returned to the caller instead of being retried.
pub async fn forever<F, Fut>(
    name: &'static str,
    restart_delay: Duration,
    metrics: Metrics,
    mut job: F,
) -> anyhow::Error
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    loop {
        metrics.job_started(name);
        match job().await {
            Ok(()) => info!(job = name, "job finished; restarting"),
            Err(err) => {
                if err.downcast_ref::<TerminalError>().is_some() {
                    return err;
                }
                warn!(job = name, error = %err, "job failed; restarting");
            }
        }
        tokio::time::sleep(restart_delay).await;
    }
}
