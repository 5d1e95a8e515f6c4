//! Shared scheduler state: configuration, the call plane, the pod maps, the
//! revive-token channel and the terminal-error slot.

use std::sync::{Arc, Mutex, RwLock};

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::info;

use crate::client::Caller;
use crate::config::Config;
use crate::messages::{Capability, CapabilityType, FrameworkId, FrameworkInfo};
use crate::metrics::Metrics;
use crate::pod_map::PodMap;

/// An error that must end the scheduler instead of being retried.
#[derive(Clone, Debug, Error)]
#[error("{0}")]
pub struct TerminalError(pub String);

/// Holds the master-assigned framework identifier.
///
/// Written by the SUBSCRIBED handler, read by the framework-id decorator on
/// every outbound call. The value persists across reconnects within one
/// process lifetime.
#[derive(Debug, Default)]
pub struct FrameworkIdStore(RwLock<Option<FrameworkId>>);

impl FrameworkIdStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<FrameworkId> {
        self.0
            .read()
            .expect("framework id lock poisoned")
            .clone()
    }

    pub fn set(&self, id: FrameworkId) {
        let mut slot = self.0.write().expect("framework id lock poisoned");
        if slot.as_ref() != Some(&id) {
            info!(framework_id = %id, "framework id assigned");
        }
        *slot = Some(id);
    }
}

/// Binds everything the event and offer handlers need.
pub struct StateStore {
    pub config: Config,
    pub caller: Arc<dyn Caller>,
    pub metrics: Metrics,
    pub pending: PodMap,
    pub running: PodMap,
    pub deleted: PodMap,
    revive_tokens: Mutex<mpsc::Receiver<()>>,
    error: Mutex<Option<String>>,
}

impl StateStore {
    pub fn new(
        config: Config,
        caller: Arc<dyn Caller>,
        metrics: Metrics,
        revive_tokens: mpsc::Receiver<()>,
    ) -> Self {
        StateStore {
            config,
            caller,
            metrics,
            pending: PodMap::new(),
            running: PodMap::new(),
            deleted: PodMap::new(),
            revive_tokens: Mutex::new(revive_tokens),
            error: Mutex::new(None),
        }
    }

    /// Posts a terminal error. Only the first posted error is kept; the
    /// connection loop surfaces it and exits.
    pub fn post_terminal_error(&self, message: impl Into<String>) {
        let mut slot = self.error.lock().expect("error slot lock poisoned");
        if slot.is_none() {
            *slot = Some(message.into());
        }
    }

    pub fn terminal_error(&self) -> Option<TerminalError> {
        self.error
            .lock()
            .expect("error slot lock poisoned")
            .clone()
            .map(TerminalError)
    }

    /// Non-blocking read of the revive-token channel; `false` means the
    /// burst quota is spent and the caller should drop the revive.
    pub fn try_revive_token(&self) -> bool {
        self.revive_tokens
            .lock()
            .expect("revive token lock poisoned")
            .try_recv()
            .is_ok()
    }
}

/// Builds the framework registration info from configuration. Optional
/// fields are attached only when meaningful: a positive failover timeout, a
/// non-empty role and principal.
pub fn build_framework_info(config: &Config) -> FrameworkInfo {
    let mut info = FrameworkInfo {
        user: config.user.clone(),
        name: config.name.clone(),
        checkpoint: Some(config.checkpoint),
        capabilities: vec![Capability {
            kind: CapabilityType::ReservationRefinement,
        }],
        ..FrameworkInfo::default()
    };
    if !config.failover_timeout.is_zero() {
        info.failover_timeout = Some(config.failover_timeout.as_secs_f64());
    }
    if !config.role.is_empty() {
        info.role = Some(config.role.clone());
    }
    if !config.principal.is_empty() {
        info.principal = Some(config.principal.clone());
    }
    info
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;

    #[test]
    fn framework_info_attaches_optional_fields() {
        let mut config = Config::default();
        config.principal = "principal".to_string();
        let info = build_framework_info(&config);
        assert_eq!(info.user, "root");
        assert_eq!(info.name, "vk_mesos");
        assert_eq!(info.checkpoint, Some(true));
        assert_eq!(info.role.as_deref(), Some("*"));
        assert_eq!(info.principal.as_deref(), Some("principal"));
        assert_eq!(info.failover_timeout, Some(3_600_000.0));
        assert_eq!(info.capabilities.len(), 1);
    }

    #[test]
    fn framework_info_omits_empty_fields() {
        let mut config = Config::default();
        config.role = String::new();
        config.failover_timeout = Duration::from_secs(0);
        let info = build_framework_info(&config);
        assert!(info.role.is_none());
        assert!(info.principal.is_none());
        assert!(info.failover_timeout.is_none());
    }

    #[test]
    fn terminal_error_slot_is_write_once() {
        let (_tx, rx) = mpsc::channel(1);
        let store = StateStore::new(
            Config::default(),
            crate::test_util::RecordingCaller::new(),
            Metrics::new().unwrap(),
            rx,
        );
        assert!(store.terminal_error().is_none());
        store.post_terminal_error("first");
        store.post_terminal_error("second");
        assert_eq!(store.terminal_error().unwrap().0, "first");
    }

    #[test]
    fn framework_id_store_is_sticky() {
        let store = FrameworkIdStore::new();
        assert!(store.get().is_none());
        store.set(FrameworkId::new("F1"));
        assert_eq!(store.get().unwrap().value, "F1");
        store.set(FrameworkId::new("F1"));
        assert_eq!(store.get().unwrap().value, "F1");
    }
}
