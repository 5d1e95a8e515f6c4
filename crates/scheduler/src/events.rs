//! The event pipeline for one subscription.
//!
//! Every record read off the stream passes through the same ordered chain:
//! a verbose-gated dump, the metrics harness, lifting of master errors, and
//! finally dispatch by event type. Within one subscription events are
//! handled strictly in arrival order.

use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use tracing::{debug, info, warn};

use crate::messages::{Event, FailureEvent};
use crate::state::{FrameworkIdStore, StateStore};
use crate::{offers, update};

/// Runs one event through the handler chain. An error from the chain ends
/// the current subscription cycle; the connection loop decides whether to
/// resubscribe.
pub async fn handle_event(
    state: &Arc<StateStore>,
    fid: &Arc<FrameworkIdStore>,
    event: Event,
) -> anyhow::Result<()> {
    if state.config.verbose {
        debug!(event = ?event, "event received");
    }

    let kind = event.kind();
    let started = Instant::now();
    let result = dispatch(state, fid, event).await;
    state
        .metrics
        .observe_event(kind, started.elapsed(), result.is_ok());
    result
}

async fn dispatch(
    state: &Arc<StateStore>,
    fid: &Arc<FrameworkIdStore>,
    event: Event,
) -> anyhow::Result<()> {
    match event {
        // A master-reported error ends this subscription before any
        // dispatch happens.
        Event::Error { error } => Err(anyhow!("master error: {}", error.message)),
        Event::Subscribed { subscribed } => {
            fid.set(subscribed.framework_id);
            if let Some(interval) = subscribed.heartbeat_interval_seconds {
                debug!(heartbeat_interval_seconds = interval, "subscribed");
            }
            Ok(())
        }
        Event::Offers { offers } => {
            state.metrics.offers_received(offers.offers.len());
            offers::handle_offers(state, offers.offers).await;
            Ok(())
        }
        Event::Update { update } => {
            update::handle_update(state, update.status).await;
            Ok(())
        }
        Event::Failure { failure } => {
            log_failure(&failure);
            Ok(())
        }
        Event::Heartbeat => Ok(()),
        Event::Unknown => {
            if !state.config.verbose {
                info!("unhandled event");
            }
            Ok(())
        }
    }
}

fn log_failure(failure: &FailureEvent) {
    match (&failure.executor_id, &failure.agent_id) {
        (Some(executor_id), agent_id) => {
            let mut message = format!("executor '{}' terminated", executor_id);
            if let Some(agent_id) = agent_id {
                message.push_str(&format!(" on agent '{}'", agent_id));
            }
            if let Some(status) = failure.status {
                message.push_str(&format!(" with status={}", status));
            }
            warn!("{}", message);
        }
        (None, Some(agent_id)) => warn!("agent '{}' terminated", agent_id),
        (None, None) => {}
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Config;
    use crate::messages::{ErrorEvent, FrameworkId, Subscribed};
    use crate::test_util::{make_state, RecordingCaller};

    #[tokio::test]
    async fn subscribed_populates_the_framework_id_store() {
        let state = make_state(Config::default(), RecordingCaller::new());
        let fid = Arc::new(FrameworkIdStore::new());
        handle_event(
            &state,
            &fid,
            Event::Subscribed {
                subscribed: Subscribed {
                    framework_id: FrameworkId::new("F1"),
                    heartbeat_interval_seconds: Some(15.0),
                },
            },
        )
        .await
        .unwrap();
        assert_eq!(fid.get().unwrap().value, "F1");
    }

    #[tokio::test]
    async fn master_errors_are_lifted() {
        let state = make_state(Config::default(), RecordingCaller::new());
        let fid = Arc::new(FrameworkIdStore::new());
        let err = handle_event(
            &state,
            &fid,
            Event::Error {
                error: ErrorEvent {
                    message: "framework failed over".to_string(),
                },
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("framework failed over"));
    }

    #[tokio::test]
    async fn heartbeats_and_failures_are_absorbed() {
        let state = make_state(Config::default(), RecordingCaller::new());
        let fid = Arc::new(FrameworkIdStore::new());
        handle_event(&state, &fid, Event::Heartbeat).await.unwrap();
        handle_event(
            &state,
            &fid,
            Event::Failure {
                failure: FailureEvent {
                    agent_id: Some(crate::messages::AgentId::new("A1")),
                    executor_id: None,
                    status: None,
                },
            },
        )
        .await
        .unwrap();
    }
}
