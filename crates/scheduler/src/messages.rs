//! Data model for the Mesos v1 scheduler API.
//!
//! These types mirror the master's published scheduler protocol: a `Call` is
//! posted to the master's scheduler endpoint, and a subscription answers with
//! a stream of `Event` records. Only the fields this framework uses are
//! modeled; unknown fields coming from the master are ignored during
//! deserialization.

use serde::{Deserialize, Serialize};

use crate::resources::Resources;

macro_rules! value_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name {
            pub value: String,
        }

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self {
                    value: value.into(),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.value)
            }
        }
    };
}

value_id!(
    /// Master-assigned identity of a subscribed framework.
    FrameworkId
);
value_id!(
    /// Identity of an agent contributing resources to the cluster.
    AgentId
);
value_id!(
    /// Identity of a resource offer; valid for the lifetime of the offer.
    OfferId
);
value_id!(
    /// Identity of a task, unique among live tasks of this framework.
    TaskId
);
value_id!(
    /// Identity of an executor on a particular agent.
    ExecutorId
);

/// Framework registration info sent with every Subscribe call.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FrameworkInfo {
    pub user: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<FrameworkId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failover_timeout: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<Capability>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    #[serde(rename = "type")]
    pub kind: CapabilityType,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CapabilityType {
    ReservationRefinement,
}

/// A bundle of agent resources the master has made available to this
/// framework for a limited time.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub agent_id: AgentId,
    pub framework_id: FrameworkId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default)]
    pub resources: Resources,
}

/// One task of a launch group. Agent assignment and resources stay unset
/// until an offer has been matched; they are frozen afterwards.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TaskInfo {
    pub name: String,
    pub task_id: TaskId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    #[serde(default, skip_serializing_if = "Resources::is_empty")]
    pub resources: Resources,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<CommandInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<ContainerInfo>,
}

/// The per-pod helper process that hosts a task group on one agent.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExecutorInfo {
    #[serde(rename = "type")]
    pub kind: ExecutorType,
    pub executor_id: ExecutorId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework_id: Option<FrameworkId>,
    #[serde(default, skip_serializing_if = "Resources::is_empty")]
    pub resources: Resources,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<ContainerInfo>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutorType {
    Default,
    Custom,
}

impl Default for ExecutorType {
    fn default() -> Self {
        ExecutorType::Default
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ContainerInfo {
    #[serde(rename = "type")]
    pub kind: ContainerType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mesos: Option<MesosInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub network_infos: Vec<NetworkInfo>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContainerType {
    Mesos,
    Docker,
}

impl Default for ContainerType {
    fn default() -> Self {
        ContainerType::Mesos
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MesosInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<Image>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NetworkInfo {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ip_addresses: Vec<IpAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// An empty address asks the agent to assign one from the container network.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IpAddress {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Image {
    #[serde(rename = "type")]
    pub kind: ImageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker: Option<DockerImage>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImageType {
    Appc,
    Docker,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DockerImage {
    pub name: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CommandInfo {
    pub shell: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Environment {
    #[serde(default)]
    pub variables: Vec<EnvironmentVariable>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnvironmentVariable {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Status of a task as reported by the agent or the master.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TaskStatus {
    pub task_id: TaskId,
    pub state: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor_id: Option<ExecutorId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Base64 identity of this status; present iff the update must be
    /// acknowledged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    TaskStaging,
    TaskStarting,
    TaskRunning,
    TaskKilling,
    TaskFinished,
    TaskFailed,
    TaskKilled,
    TaskError,
    TaskLost,
    TaskDropped,
    TaskUnreachable,
    TaskGone,
    TaskGoneByOperator,
    TaskUnknown,
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TaskState::TaskStaging => "TASK_STAGING",
            TaskState::TaskStarting => "TASK_STARTING",
            TaskState::TaskRunning => "TASK_RUNNING",
            TaskState::TaskKilling => "TASK_KILLING",
            TaskState::TaskFinished => "TASK_FINISHED",
            TaskState::TaskFailed => "TASK_FAILED",
            TaskState::TaskKilled => "TASK_KILLED",
            TaskState::TaskError => "TASK_ERROR",
            TaskState::TaskLost => "TASK_LOST",
            TaskState::TaskDropped => "TASK_DROPPED",
            TaskState::TaskUnreachable => "TASK_UNREACHABLE",
            TaskState::TaskGone => "TASK_GONE",
            TaskState::TaskGoneByOperator => "TASK_GONE_BY_OPERATOR",
            TaskState::TaskUnknown => "TASK_UNKNOWN",
        };
        f.write_str(name)
    }
}

/// A record received on the subscription stream.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    Subscribed { subscribed: Subscribed },
    Offers { offers: OffersEvent },
    Update { update: UpdateEvent },
    Failure { failure: FailureEvent },
    Error { error: ErrorEvent },
    Heartbeat,
    #[serde(other)]
    Unknown,
}

impl Event {
    /// Stable label for metrics and diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Subscribed { .. } => "SUBSCRIBED",
            Event::Offers { .. } => "OFFERS",
            Event::Update { .. } => "UPDATE",
            Event::Failure { .. } => "FAILURE",
            Event::Error { .. } => "ERROR",
            Event::Heartbeat => "HEARTBEAT",
            Event::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Subscribed {
    pub framework_id: FrameworkId,
    #[serde(default)]
    pub heartbeat_interval_seconds: Option<f64>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct OffersEvent {
    #[serde(default)]
    pub offers: Vec<Offer>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct UpdateEvent {
    pub status: TaskStatus,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct FailureEvent {
    #[serde(default)]
    pub agent_id: Option<AgentId>,
    #[serde(default)]
    pub executor_id: Option<ExecutorId>,
    #[serde(default)]
    pub status: Option<i32>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ErrorEvent {
    pub message: String,
}

/// A message posted to the master. The `framework_id` is attached by the call
/// pipeline once a subscription has been established.
#[derive(Clone, Debug, Serialize)]
pub struct Call {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework_id: Option<FrameworkId>,
    #[serde(rename = "type")]
    pub kind: CallType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<Subscribe>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accept: Option<Accept>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decline: Option<Decline>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acknowledge: Option<Acknowledge>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kill: Option<Kill>,
}

impl Call {
    pub fn new(kind: CallType) -> Self {
        Call {
            framework_id: None,
            kind,
            subscribe: None,
            accept: None,
            decline: None,
            acknowledge: None,
            kill: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallType {
    Subscribe,
    Accept,
    Decline,
    Acknowledge,
    Revive,
    Kill,
}

impl CallType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallType::Subscribe => "SUBSCRIBE",
            CallType::Accept => "ACCEPT",
            CallType::Decline => "DECLINE",
            CallType::Acknowledge => "ACKNOWLEDGE",
            CallType::Revive => "REVIVE",
            CallType::Kill => "KILL",
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Subscribe {
    pub framework_info: FrameworkInfo,
}

#[derive(Clone, Debug, Serialize)]
pub struct Accept {
    pub offer_ids: Vec<OfferId>,
    pub operations: Vec<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<Filters>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Operation {
    #[serde(rename = "type")]
    pub kind: OperationType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launch_group: Option<LaunchGroup>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    Launch,
    LaunchGroup,
}

/// Launches a set of tasks atomically under one executor on one offer.
#[derive(Clone, Debug, Serialize)]
pub struct LaunchGroup {
    pub executor: ExecutorInfo,
    pub task_group: TaskGroupInfo,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct TaskGroupInfo {
    pub tasks: Vec<TaskInfo>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Decline {
    pub offer_ids: Vec<OfferId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<Filters>,
}

/// Limits re-offering of declined resources for `refuse_seconds`.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct Filters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refuse_seconds: Option<f64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Acknowledge {
    pub agent_id: AgentId,
    pub task_id: TaskId,
    pub uuid: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct Kill {
    pub task_id: TaskId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
}
