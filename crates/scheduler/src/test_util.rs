//! Shared helpers for the scheduler's tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Container, Pod as KubePod, PodSpec, ResourceRequirements};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use tokio::sync::mpsc;

use crate::client::{CallError, Caller, Response};
use crate::config::Config;
use crate::messages::{AgentId, Call, FrameworkId, Offer, OfferId};
use crate::metrics::Metrics;
use crate::pod::Pod;
use crate::resources::Resources;
use crate::state::StateStore;

/// A caller that records every call and answers from a scripted queue;
/// anything beyond the script is simply accepted.
#[derive(Default)]
pub struct RecordingCaller {
    calls: Mutex<Vec<Call>>,
    responses: Mutex<VecDeque<Result<Response, CallError>>>,
}

impl RecordingCaller {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues a response for the next unanswered call.
    pub fn push_response(&self, response: Result<Response, CallError>) {
        self.responses
            .lock()
            .unwrap()
            .push_back(response);
    }

    /// Makes the next call fail with a transport-style error.
    pub fn fail_next(&self, message: &str) {
        self.push_response(Err(CallError::Framing(message.to_string())));
    }

    pub fn recorded(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// The call types recorded so far, in order.
    pub fn recorded_kinds(&self) -> Vec<crate::messages::CallType> {
        self.recorded().iter().map(|c| c.kind).collect()
    }
}

#[async_trait]
impl Caller for RecordingCaller {
    async fn call(&self, call: Call) -> Result<Response, CallError> {
        self.calls.lock().unwrap().push(call);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(Response::Accepted))
    }
}

/// Builds a state store around a recording caller. The revive channel is
/// driven by the real token generator so rate-limit behavior is observable.
pub fn make_state(config: Config, caller: Arc<RecordingCaller>) -> Arc<StateStore> {
    let revive_tokens = crate::revive::tokens(config.revive_burst, config.revive_wait);
    Arc::new(StateStore::new(
        config,
        caller,
        Metrics::new().unwrap(),
        revive_tokens,
    ))
}

/// Builds a state store whose revive channel is empty and never refills.
pub fn make_state_without_tokens(config: Config, caller: Arc<RecordingCaller>) -> Arc<StateStore> {
    let (_tx, rx) = mpsc::channel(1);
    Arc::new(StateStore::new(
        config,
        caller,
        Metrics::new().unwrap(),
        rx,
    ))
}

/// Builds a pod with the given containers as `(name, image, cpu, memory)`;
/// `cpu` and `memory` are request quantities when present.
pub fn make_pod(
    namespace: &str,
    name: &str,
    containers: &[(&str, &str, Option<&str>, Option<&str>)],
) -> Pod {
    let containers = containers
        .iter()
        .map(|(container_name, image, cpu, memory)| {
            let mut requests = BTreeMap::new();
            if let Some(cpu) = cpu {
                requests.insert("cpu".to_string(), Quantity(cpu.to_string()));
            }
            if let Some(memory) = memory {
                requests.insert("memory".to_string(), Quantity(memory.to_string()));
            }
            Container {
                name: container_name.to_string(),
                image: Some(image.to_string()),
                resources: if requests.is_empty() {
                    None
                } else {
                    Some(ResourceRequirements {
                        requests: Some(requests),
                        ..Default::default()
                    })
                },
                ..Default::default()
            }
        })
        .collect();

    let mut kube_pod = KubePod::default();
    kube_pod.metadata.namespace = Some(namespace.to_string());
    kube_pod.metadata.name = Some(name.to_string());
    kube_pod.spec = Some(PodSpec {
        containers,
        ..Default::default()
    });
    Pod::new(kube_pod)
}

/// Builds an unreserved scalar offer.
pub fn make_offer(id: &str, agent_id: &str, cpus: f64, mem: f64, disk: f64) -> Offer {
    Offer {
        id: OfferId::new(id),
        agent_id: AgentId::new(agent_id),
        framework_id: FrameworkId::new("F1"),
        hostname: None,
        resources: Resources(vec![
            Resources::cpus(cpus),
            Resources::mem(mem),
            Resources::disk(disk),
        ]),
    }
}
