//! Pod accessors and the translation from a pod spec into a Mesos launch
//! group template.

use k8s_openapi::api::core::v1::{Container, Pod as KubePod};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use thiserror::Error;

use crate::messages::{
    CommandInfo, ContainerInfo, ContainerType, DockerImage, Environment, EnvironmentVariable,
    ExecutorId, ExecutorInfo, ExecutorType, FrameworkId, Image, ImageType, IpAddress, MesosInfo,
    NetworkInfo, TaskId, TaskInfo,
};
use crate::quantity;
use crate::resources::Resources;

/// Floors applied to every container request.
pub const DEFAULT_TASK_CPUS: f64 = 0.1;
pub const DEFAULT_TASK_MEM: f64 = 32.0;
pub const DEFAULT_TASK_DISK: f64 = 128.0;

/// Fixed resource slice required by the default executor itself.
pub fn executor_resources() -> Resources {
    Resources(vec![
        Resources::cpus(0.1),
        Resources::mem(32.0),
        Resources::disk(256.0),
    ])
}

#[derive(Debug, Error)]
pub enum PodError {
    #[error("pod namespace not found")]
    MissingNamespace,
    #[error("pod name not found")]
    MissingName,
}

/// A Kubernetes pod.
///
/// This is a newtype around the upstream pod definition providing the
/// accessors the scheduler needs; the rest of the object rides along opaque.
#[derive(Clone, Debug, Default)]
pub struct Pod(KubePod);

impl Pod {
    pub fn new(inner: KubePod) -> Self {
        Self(inner)
    }

    /// Name of the pod, or the empty string when unset.
    pub fn name(&self) -> &str {
        self.0.metadata.name.as_deref().unwrap_or_default()
    }

    /// Namespace of the pod, or the empty string when unset.
    pub fn namespace(&self) -> &str {
        self.0.metadata.namespace.as_deref().unwrap_or_default()
    }

    pub fn containers(&self) -> &[Container] {
        self.0
            .spec
            .as_ref()
            .map(|spec| spec.containers.as_slice())
            .unwrap_or_default()
    }

    pub fn as_kube_pod(&self) -> &KubePod {
        &self.0
    }

    pub fn into_kube_pod(self) -> KubePod {
        self.0
    }
}

impl From<KubePod> for Pod {
    fn from(pod: KubePod) -> Self {
        Self(pod)
    }
}

/// Builds the store key for a pod. Both parts must be non-empty.
pub fn pod_key(namespace: &str, name: &str) -> Result<String, PodError> {
    if namespace.is_empty() {
        return Err(PodError::MissingNamespace);
    }
    if name.is_empty() {
        return Err(PodError::MissingName);
    }
    Ok(format!("{}-{}", namespace, name))
}

/// Builds the store key directly from a pod definition.
pub fn key_from_pod(pod: &Pod) -> Result<String, PodError> {
    pod_key(pod.namespace(), pod.name())
}

/// Splits a pod key back into (namespace, name). Only exact for keys whose
/// namespace contains no hyphen.
pub fn split_pod_key(key: &str) -> Option<(&str, &str)> {
    key.split_once('-')
}

/// Resources one container asks for, with the defaults applied to every
/// dimension that is missing or below the floor. Requests that fail to parse
/// count as absent.
pub fn task_resources(container: &Container) -> Resources {
    let requests = container
        .resources
        .as_ref()
        .and_then(|r| r.requests.as_ref());
    let request = |name: &str| -> Option<&Quantity> { requests.and_then(|r| r.get(name)) };

    let cpus = request("cpu")
        .and_then(|q| quantity::cpu_cores(q).ok())
        .unwrap_or(0.0)
        .max(DEFAULT_TASK_CPUS);
    let mem = request("memory")
        .and_then(|q| quantity::memory_bytes(q).ok())
        .map(|bytes| bytes / (1024.0 * 1024.0))
        .unwrap_or(0.0)
        .max(DEFAULT_TASK_MEM);
    // Ephemeral storage is taken at its raw scalar value (milli-units
    // divided back out), not converted to MiB.
    let disk = request("ephemeral-storage")
        .and_then(|q| quantity::memory_bytes(q).ok())
        .unwrap_or(0.0)
        .max(DEFAULT_TASK_DISK);

    Resources(vec![
        Resources::cpus(cpus),
        Resources::mem(mem),
        Resources::disk(disk),
    ])
}

/// Sum of all container requests of a pod.
pub fn pod_resources(pod: &Pod) -> Resources {
    pod.containers()
        .iter()
        .fold(Resources::new(), |sum, container| {
            sum.plus(&task_resources(container))
        })
}

/// Builds the launch-group template for a pod, one task per container. Agent
/// assignment and resources stay unset until an offer is matched.
pub fn build_pod_tasks(pod: &Pod) -> Vec<TaskInfo> {
    pod.containers()
        .iter()
        .map(|container| {
            let variables = container
                .env
                .as_deref()
                .unwrap_or_default()
                .iter()
                .map(|var| EnvironmentVariable {
                    name: var.name.clone(),
                    value: var.value.clone(),
                })
                .collect();

            TaskInfo {
                name: container.name.clone(),
                task_id: TaskId::new(format!(
                    "{}-{}-{}",
                    pod.namespace(),
                    pod.name(),
                    container.name
                )),
                agent_id: None,
                resources: Resources::new(),
                command: Some(CommandInfo {
                    shell: false,
                    environment: Some(Environment { variables }),
                }),
                container: Some(ContainerInfo {
                    kind: ContainerType::Mesos,
                    mesos: Some(MesosInfo {
                        image: Some(Image {
                            kind: ImageType::Docker,
                            docker: Some(DockerImage {
                                name: container.image.clone().unwrap_or_default(),
                            }),
                        }),
                    }),
                    network_infos: Vec::new(),
                }),
            }
        })
        .collect()
}

/// The default executor that will host a pod's task group. An empty address
/// entry asks the agent to hand out one from the container network.
pub fn build_executor_info(framework_id: FrameworkId, pod_key: &str) -> ExecutorInfo {
    ExecutorInfo {
        kind: ExecutorType::Default,
        executor_id: ExecutorId::new(format!("exec-{}", pod_key)),
        framework_id: Some(framework_id),
        resources: Resources::new(),
        container: Some(ContainerInfo {
            kind: ContainerType::Mesos,
            mesos: None,
            network_infos: vec![NetworkInfo {
                ip_addresses: vec![IpAddress::default()],
                name: None,
            }],
        }),
    }
}
