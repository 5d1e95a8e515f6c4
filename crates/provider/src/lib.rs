//! A virtual-kubelet provider backed by the Mesos framework scheduler.
//!
//! The provider is a thin adapter: admission calls are forwarded to the
//! scheduler's pod store, and the node surface (capacity, conditions,
//! addresses) is answered statically from configuration. Kubernetes sees the
//! whole thing as one worker node; Mesos does the actual placement.

pub mod config;

use std::collections::BTreeMap;

use chrono::Utc;
use k8s_openapi::api::core::v1::{
    ContainerState, ContainerStateRunning, ContainerStatus, DaemonEndpoint, NodeAddress,
    NodeCondition, NodeDaemonEndpoints, Pod as KubePod, PodCondition, PodStatus,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use mesos_scheduler::Scheduler;
use tracing::{debug, info};

pub use crate::config::{ConfigError, ProviderConfig};

pub const OPERATING_SYSTEM: &str = "linux";

/// The set of resource names advertised as node capacity.
pub type ResourceList = BTreeMap<String, Quantity>;

/// The Mesos provider.
pub struct MesosProvider {
    config: ProviderConfig,
    node_name: String,
    internal_ip: String,
    daemon_endpoint_port: i32,
    scheduler: Scheduler,
}

impl MesosProvider {
    /// Builds the provider and its scheduler. The caller drives
    /// [`Scheduler::run`] (usually raced against a shutdown signal); see
    /// [`MesosProvider::scheduler`].
    pub fn new(
        config: ProviderConfig,
        node_name: impl Into<String>,
        internal_ip: impl Into<String>,
        daemon_endpoint_port: i32,
    ) -> anyhow::Result<Self> {
        info!("initializing the Mesos provider");
        let scheduler = Scheduler::new(config.scheduler.clone())?;
        Ok(MesosProvider {
            config,
            node_name: node_name.into(),
            internal_ip: internal_ip.into(),
            daemon_endpoint_port,
            scheduler,
        })
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// Accepts a pod definition and queues it for scheduling.
    pub async fn create_pod(&self, pod: KubePod) -> anyhow::Result<()> {
        debug!(name = pod.metadata.name.as_deref().unwrap_or_default(), "received CreatePod");
        self.scheduler.add_pod(pod)?;
        Ok(())
    }

    /// In-place updates are not supported by the scheduler; this surfaces
    /// its rejection unchanged.
    pub async fn update_pod(&self, pod: KubePod) -> anyhow::Result<()> {
        debug!(name = pod.metadata.name.as_deref().unwrap_or_default(), "received UpdatePod");
        self.scheduler.update_pod(pod)?;
        Ok(())
    }

    /// Deletes the pod, killing its tasks if it is already running.
    pub async fn delete_pod(&self, pod: KubePod) -> anyhow::Result<()> {
        debug!(name = pod.metadata.name.as_deref().unwrap_or_default(), "received DeletePod");
        self.scheduler.delete_pod(pod).await?;
        Ok(())
    }

    pub async fn get_pod(&self, namespace: &str, name: &str) -> Option<KubePod> {
        debug!(namespace, name, "received GetPod");
        self.scheduler.get_pod(namespace, name)
    }

    /// All pods known to be running.
    pub async fn get_pods(&self) -> Vec<KubePod> {
        debug!("received GetPods");
        self.scheduler.list_pods()
    }

    /// Synthesizes a running status for a known pod.
    pub async fn get_pod_status(&self, namespace: &str, name: &str) -> anyhow::Result<PodStatus> {
        let pod = self.get_pod(namespace, name).await.ok_or_else(|| {
            anyhow::anyhow!(
                "failed to retrieve pod status. no pod {:?} found in namespace {:?}",
                name,
                namespace
            )
        })?;

        let now = Time(Utc::now());
        let container_statuses = pod
            .spec
            .as_ref()
            .map(|spec| spec.containers.as_slice())
            .unwrap_or_default()
            .iter()
            .map(|container| ContainerStatus {
                name: container.name.clone(),
                image: container.image.clone().unwrap_or_default(),
                ready: true,
                restart_count: 0,
                state: Some(ContainerState {
                    running: Some(ContainerStateRunning {
                        started_at: Some(now.clone()),
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            })
            .collect();

        let conditions = ["Initialized", "Ready", "PodScheduled"]
            .iter()
            .map(|kind| PodCondition {
                type_: kind.to_string(),
                status: "True".to_string(),
                ..Default::default()
            })
            .collect();

        Ok(PodStatus {
            phase: Some("Running".to_string()),
            start_time: Some(now),
            conditions: Some(conditions),
            container_statuses: Some(container_statuses),
            ..Default::default()
        })
    }

    /// The node capacity advertised to Kubernetes, straight from
    /// configuration.
    pub fn capacity(&self) -> ResourceList {
        let mut capacity = ResourceList::new();
        capacity.insert("cpu".to_string(), Quantity(self.config.cpu.clone()));
        capacity.insert("memory".to_string(), Quantity(self.config.memory.clone()));
        capacity.insert("storage".to_string(), Quantity(self.config.storage.clone()));
        capacity.insert("pods".to_string(), Quantity(self.config.pods.clone()));
        capacity
    }

    /// Static thumbs-up values for all node conditions.
    pub fn node_conditions(&self) -> Vec<NodeCondition> {
        let now = Time(Utc::now());
        let reason = "Mesos scheduler is ready";
        let conditions = [
            ("Ready", "True"),
            ("MemoryPressure", "False"),
            ("DiskPressure", "False"),
            ("PIDPressure", "False"),
            ("NetworkUnavailable", "False"),
        ];
        conditions
            .iter()
            .map(|(kind, status)| NodeCondition {
                type_: kind.to_string(),
                status: status.to_string(),
                last_heartbeat_time: Some(now.clone()),
                last_transition_time: Some(now.clone()),
                reason: Some(reason.to_string()),
                message: Some("ok".to_string()),
            })
            .collect()
    }

    pub fn node_addresses(&self) -> Vec<NodeAddress> {
        vec![NodeAddress {
            type_: "InternalIP".to_string(),
            address: self.internal_ip.clone(),
        }]
    }

    pub fn node_daemon_endpoints(&self) -> NodeDaemonEndpoints {
        NodeDaemonEndpoints {
            kubelet_endpoint: Some(DaemonEndpoint {
                port: self.daemon_endpoint_port,
            }),
        }
    }

    pub fn operating_system(&self) -> &'static str {
        OPERATING_SYSTEM
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use k8s_openapi::api::core::v1::{Container, PodSpec};

    fn make_pod(namespace: &str, name: &str) -> KubePod {
        let mut pod = KubePod::default();
        pod.metadata.namespace = Some(namespace.to_string());
        pod.metadata.name = Some(name.to_string());
        pod.spec = Some(PodSpec {
            containers: vec![Container {
                name: "c1".to_string(),
                image: Some("img".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        });
        pod
    }

    fn make_provider() -> MesosProvider {
        MesosProvider::new(ProviderConfig::default(), "vk-mesos-0", "10.0.0.7", 10250).unwrap()
    }

    #[tokio::test]
    async fn admission_round_trip() {
        let provider = make_provider();
        provider.create_pod(make_pod("default", "a")).await.unwrap();

        let found = provider.get_pod("default", "a").await.unwrap();
        assert_eq!(found.metadata.name.as_deref(), Some("a"));
        assert!(provider.get_pod("default", "missing").await.is_none());

        // Nothing is running until an offer has been matched.
        assert!(provider.get_pods().await.is_empty());

        provider.delete_pod(make_pod("default", "a")).await.unwrap();
        assert!(provider.get_pod("default", "a").await.is_none());
    }

    #[tokio::test]
    async fn update_pod_is_rejected() {
        let provider = make_provider();
        provider.update_pod(make_pod("default", "a")).await.unwrap_err();
    }

    #[tokio::test]
    async fn pod_status_reports_running_containers() {
        let provider = make_provider();
        provider.create_pod(make_pod("default", "a")).await.unwrap();

        let status = provider.get_pod_status("default", "a").await.unwrap();
        assert_eq!(status.phase.as_deref(), Some("Running"));
        let containers = status.container_statuses.unwrap();
        assert_eq!(containers.len(), 1);
        assert!(containers[0].ready);

        provider.get_pod_status("default", "missing").await.unwrap_err();
    }

    #[tokio::test]
    async fn capacity_reflects_configuration() {
        let provider = make_provider();
        let capacity = provider.capacity();
        assert_eq!(capacity["cpu"].0, "20");
        assert_eq!(capacity["memory"].0, "100Gi");
        assert_eq!(capacity["storage"].0, "40Gi");
        assert_eq!(capacity["pods"].0, "20");
    }

    #[tokio::test]
    async fn node_surface_is_static() {
        let provider = make_provider();
        let conditions = provider.node_conditions();
        let ready = conditions.iter().find(|c| c.type_ == "Ready").unwrap();
        assert_eq!(ready.status, "True");
        assert!(conditions
            .iter()
            .filter(|c| c.type_ != "Ready")
            .all(|c| c.status == "False"));

        let addresses = provider.node_addresses();
        assert_eq!(addresses[0].address, "10.0.0.7");
        assert_eq!(
            provider.node_daemon_endpoints().kubelet_endpoint.unwrap().port,
            10250
        );
        assert_eq!(provider.operating_system(), "linux");
    }
}
