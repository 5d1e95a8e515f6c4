//! The scheduler shell: wires configuration, the call pipeline, the pod
//! maps and the metrics endpoint together, and exposes the admission API
//! the provider forwards to.

use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod as KubePod;
use thiserror::Error;
use tracing::{info, warn};

use crate::calls;
use crate::client::{build_caller, CallError};
use crate::config::Config;
use crate::controller;
use crate::metrics::{self, Metrics};
use crate::pod::{build_pod_tasks, key_from_pod, pod_key, Pod, PodError};
use crate::pod_map::PodRecord;
use crate::revive;
use crate::state::{FrameworkIdStore, StateStore};
use crate::supervisor;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Pod(#[from] PodError),
    #[error("in-place pod updates are not supported; delete and recreate the pod")]
    UnsupportedPodUpdate,
    #[error(transparent)]
    Call(#[from] CallError),
}

/// The framework scheduler.
///
/// Construction builds the call pipeline once from configuration and starts
/// the revive-token generator and the metrics endpoint; [`Scheduler::run`]
/// drives the connection loop until a terminal error. Admission calls can be
/// made from any task at any point in the scheduler's life.
#[derive(Clone)]
pub struct Scheduler {
    state: Arc<StateStore>,
    fid: Arc<FrameworkIdStore>,
}

impl Scheduler {
    /// Builds a scheduler from configuration. Must be called within a Tokio
    /// runtime: the metrics server and the revive-token generator are
    /// spawned here.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let metrics = Metrics::new()?;
        let fid = Arc::new(FrameworkIdStore::new());
        let caller = build_caller(&config, fid.clone(), metrics.clone())?;
        let revive_tokens = revive::tokens(config.revive_burst, config.revive_wait);

        let metrics_config = config.metrics.clone();
        let restart_delay = config.job_restart_delay;
        let server_metrics = metrics.clone();
        tokio::spawn(async move {
            supervisor::forever("api-server", restart_delay, server_metrics.clone(), move || {
                metrics::serve(server_metrics.clone(), metrics_config.clone())
            })
            .await
        });

        let state = Arc::new(StateStore::new(config, caller, metrics, revive_tokens));
        Ok(Scheduler { state, fid })
    }

    /// Runs the connection loop until a terminal error is posted. Dropping
    /// the returned future cancels the subscription and any outstanding
    /// calls.
    pub async fn run(&self) -> anyhow::Result<()> {
        info!(config = ?self.state.config, "scheduler running");
        let state = self.state.clone();
        let fid = self.fid.clone();
        Err(supervisor::forever(
            "scheduler",
            self.state.config.job_restart_delay,
            self.state.metrics.clone(),
            move || controller::run(state.clone(), fid.clone()),
        )
        .await
        .into())
    }

    /// Admits a pod: its launch-group template is built container for
    /// container and the record is queued for the next fitting offer.
    /// Re-admitting a pending key overwrites the previous record.
    pub fn add_pod(&self, pod: KubePod) -> Result<(), SchedulerError> {
        let pod = Pod::new(pod);
        let key = key_from_pod(&pod)?;
        let tasks = build_pod_tasks(&pod);
        self.state.pending.set(key, PodRecord { pod, tasks });
        Ok(())
    }

    /// In-place updates are rejected; callers delete and recreate instead.
    pub fn update_pod(&self, _pod: KubePod) -> Result<(), SchedulerError> {
        Err(SchedulerError::UnsupportedPodUpdate)
    }

    /// Removes a pod. A pending record is moved straight to the deleted
    /// map; a running record gets a Kill call per task first. Unknown keys
    /// are a no-op.
    pub async fn delete_pod(&self, pod: KubePod) -> Result<(), SchedulerError> {
        let pod = Pod::new(pod);
        let key = key_from_pod(&pod)?;

        if let Some(record) = self.state.pending.get_and_remove(&key) {
            self.state.deleted.set(key, record);
            return Ok(());
        }

        if let Some(record) = self.state.running.get_and_remove(&key) {
            for task in &record.tasks {
                let call = calls::kill(task.task_id.clone(), task.agent_id.clone());
                if let Err(err) = self.state.caller.call(call).await {
                    warn!(task = %task.task_id, error = %err, "failed to kill task");
                }
            }
            self.state.deleted.set(key, record);
        }
        Ok(())
    }

    /// Looks a pod up by namespace and name, preferring the pending copy.
    pub fn get_pod(&self, namespace: &str, name: &str) -> Option<KubePod> {
        let key = pod_key(namespace, name).ok()?;
        self.state
            .pending
            .get(&key)
            .or_else(|| self.state.running.get(&key))
            .map(|record| record.pod.into_kube_pod())
    }

    /// Snapshot of all running pods.
    pub fn list_pods(&self) -> Vec<KubePod> {
        self.state
            .running
            .values()
            .into_iter()
            .map(|record| record.pod.into_kube_pod())
            .collect()
    }

    pub fn config(&self) -> &Config {
        &self.state.config
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_util::make_pod;

    fn scheduler() -> Scheduler {
        Scheduler::new(Config::default()).unwrap()
    }

    #[tokio::test]
    async fn add_pod_queues_a_pending_record() {
        let scheduler = scheduler();
        let pod = make_pod("default", "a", &[("c1", "img", None, None)]);
        scheduler.add_pod(pod.into_kube_pod()).unwrap();
        assert!(scheduler.state.pending.has("default-a"));
        assert!(scheduler.get_pod("default", "a").is_some());
        assert!(scheduler.list_pods().is_empty());
    }

    #[tokio::test]
    async fn add_pod_rejects_unkeyable_pods() {
        let scheduler = scheduler();
        let pod = make_pod("", "a", &[("c1", "img", None, None)]);
        let err = scheduler.add_pod(pod.into_kube_pod()).unwrap_err();
        assert!(matches!(err, SchedulerError::Pod(_)));
    }

    #[tokio::test]
    async fn update_pod_is_rejected_explicitly() {
        let scheduler = scheduler();
        let pod = make_pod("default", "a", &[("c1", "img", None, None)]);
        let err = scheduler.update_pod(pod.into_kube_pod()).unwrap_err();
        assert!(matches!(err, SchedulerError::UnsupportedPodUpdate));
    }

    #[tokio::test]
    async fn delete_pending_pod_moves_it_to_deleted() {
        let scheduler = scheduler();
        let pod = make_pod("default", "a", &[("c1", "img", None, None)]);
        scheduler.add_pod(pod.as_kube_pod().clone()).unwrap();
        scheduler.delete_pod(pod.into_kube_pod()).await.unwrap();
        assert!(!scheduler.state.pending.has("default-a"));
        assert!(scheduler.state.deleted.has("default-a"));
        assert!(scheduler.get_pod("default", "a").is_none());
    }

    #[tokio::test]
    async fn delete_running_pod_kills_its_tasks() {
        use crate::messages::{AgentId, CallType};
        use crate::test_util::{make_state, RecordingCaller};

        let caller = RecordingCaller::new();
        let state = make_state(Config::default(), caller.clone());
        let scheduler = Scheduler {
            state: state.clone(),
            fid: Arc::new(FrameworkIdStore::new()),
        };

        let pod = make_pod(
            "default",
            "a",
            &[("c1", "img", None, None), ("c2", "img", None, None)],
        );
        let mut tasks = build_pod_tasks(&pod);
        for task in &mut tasks {
            task.agent_id = Some(AgentId::new("A1"));
        }
        state.running.set(
            "default-a",
            PodRecord {
                pod: pod.clone(),
                tasks,
            },
        );

        scheduler.delete_pod(pod.into_kube_pod()).await.unwrap();

        assert_eq!(
            caller.recorded_kinds(),
            vec![CallType::Kill, CallType::Kill]
        );
        let kill = caller.recorded()[0].kill.clone().unwrap();
        assert_eq!(kill.task_id.value, "default-a-c1");
        assert_eq!(kill.agent_id.unwrap().value, "A1");
        assert!(!state.running.has("default-a"));
        assert!(state.deleted.has("default-a"));
    }

    #[tokio::test]
    async fn get_pod_prefers_the_pending_copy() {
        let scheduler = scheduler();
        let pending = make_pod("default", "a", &[("c1", "img", None, None)]);
        let running = make_pod("default", "a", &[("c2", "other", None, None)]);
        scheduler.state.running.set(
            "default-a",
            PodRecord {
                tasks: build_pod_tasks(&running),
                pod: running,
            },
        );
        scheduler.add_pod(pending.into_kube_pod()).unwrap();

        let found = Pod::new(scheduler.get_pod("default", "a").unwrap());
        assert_eq!(found.containers()[0].name, "c1");
    }
}
