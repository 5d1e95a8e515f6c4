//! The connection loop.
//!
//! Keeps one live subscription to the master at a time. Registration
//! attempts are paced by exponential backoff bounded by `[1s, 15s]`; a
//! successful subscription resets the backoff. The loop runs until the task
//! is dropped or a terminal error has been posted to the state store.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::backoff::ExponentialBackoffStrategy;
use crate::calls;
use crate::client::{EventStream, Response};
use crate::events;
use crate::state::{build_framework_info, FrameworkIdStore, StateStore, TerminalError};

pub const REGISTRATION_MIN_BACKOFF: Duration = Duration::from_secs(1);
pub const REGISTRATION_MAX_BACKOFF: Duration = Duration::from_secs(15);

/// Runs the subscribe/reconnect loop. Returns only with a terminal error;
/// cancellation happens by dropping the future.
pub async fn run(state: Arc<StateStore>, fid: Arc<FrameworkIdStore>) -> anyhow::Result<()> {
    let mut backoff = ExponentialBackoffStrategy::new(
        REGISTRATION_MIN_BACKOFF,
        REGISTRATION_MAX_BACKOFF,
    );
    let mut disconnected_at: Option<Instant> = None;

    loop {
        if let Some(error) = state.terminal_error() {
            return Err(error.into());
        }

        // Once subscribed, the master only retains our framework state
        // within the failover window; reconnecting after that cannot
        // resume the prior identity.
        if let (Some(at), Some(_)) = (disconnected_at, fid.get()) {
            let failover = state.config.failover_timeout;
            if !failover.is_zero() && at.elapsed() > failover {
                return Err(TerminalError(format!(
                    "disconnected longer than the failover timeout of {:?}",
                    failover
                ))
                .into());
            }
        }

        // After the first successful subscription every new Subscribe must
        // carry the assigned framework id, in the call envelope and in the
        // framework info.
        let mut subscribe = calls::subscribe(build_framework_info(&state.config));
        if let Some(id) = fid.get() {
            if let Some(body) = subscribe.subscribe.as_mut() {
                body.framework_info.id = Some(id.clone());
            }
            subscribe.framework_id = Some(id);
        }

        match state.caller.call(subscribe).await {
            Ok(Response::Events(stream)) => {
                backoff.reset();
                match process_events(&state, &fid, stream).await {
                    Ok(()) => info!("disconnected"),
                    Err(err) => warn!(error = %err, "subscription terminated"),
                }
                disconnected_at = Some(Instant::now());
            }
            Ok(Response::Accepted) => {
                warn!("subscribe call did not open an event stream");
            }
            Err(err) => {
                warn!(error = %err, "subscription attempt failed");
            }
        }

        if let Some(error) = state.terminal_error() {
            return Err(error.into());
        }
        backoff.wait().await;
    }
}

/// Drains one subscription. Returns `Ok(())` on an orderly end of stream or
/// once a terminal error has been posted; any other failure ends the cycle
/// with its error.
async fn process_events(
    state: &Arc<StateStore>,
    fid: &Arc<FrameworkIdStore>,
    mut stream: EventStream,
) -> anyhow::Result<()> {
    while let Some(next) = stream.next().await {
        let event = next?;
        events::handle_event(state, fid, event).await?;
        if state.terminal_error().is_some() {
            return Ok(());
        }
    }
    Ok(())
}
