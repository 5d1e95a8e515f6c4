//! Task status-update handling.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::calls;
use crate::messages::{TaskState, TaskStatus};
use crate::state::StateStore;

/// Handles one UPDATE event. The update is acknowledged to the master
/// before any user-level handling happens.
pub async fn handle_update(state: &Arc<StateStore>, status: TaskStatus) {
    if let (Some(uuid), Some(agent_id)) = (status.uuid.clone(), status.agent_id.clone()) {
        let call = calls::acknowledge(agent_id, status.task_id.clone(), uuid);
        if let Err(err) = state.caller.call(call).await {
            warn!(task = %status.task_id, error = %err, "failed to acknowledge status update");
        }
    }
    status_update(state, status).await;
}

async fn status_update(state: &Arc<StateStore>, status: TaskStatus) {
    if state.config.verbose {
        let mut message = format!("task {} is in state {}", status.task_id, status.state);
        if let Some(status_message) = status.message.as_deref().filter(|m| !m.is_empty()) {
            message.push_str(&format!(" with message '{}'", status_message));
        }
        debug!("{}", message);
    }

    match status.state {
        TaskState::TaskFinished => {
            state.metrics.task_finished();
            try_revive_offers(state).await;
        }
        TaskState::TaskLost
        | TaskState::TaskKilled
        | TaskState::TaskFailed
        | TaskState::TaskError => {
            state.post_terminal_error(format!(
                "Exiting because task {} is in an unexpected state {} with reason {} from source {} with message '{}'",
                status.task_id,
                status.state,
                status.reason.as_deref().unwrap_or_default(),
                status.source.as_deref().unwrap_or_default(),
                status.message.as_deref().unwrap_or_default(),
            ));
        }
        _ => {}
    }
}

/// Sends a Revive call if a rate-limit token is available; otherwise the
/// revival is dropped, not queued.
pub async fn try_revive_offers(state: &Arc<StateStore>) {
    if !state.try_revive_token() {
        return;
    }
    if let Err(err) = state.caller.call(calls::revive()).await {
        warn!(error = %err, "failed to revive offers");
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Config;
    use crate::messages::{AgentId, CallType, TaskId};
    use crate::test_util::{make_state, make_state_without_tokens, RecordingCaller};

    fn status(task: &str, task_state: TaskState) -> TaskStatus {
        TaskStatus {
            task_id: TaskId::new(task),
            state: task_state,
            agent_id: Some(AgentId::new("A1")),
            executor_id: None,
            message: None,
            reason: None,
            source: None,
            uuid: None,
        }
    }

    #[tokio::test]
    async fn updates_with_a_uuid_are_acknowledged_first() {
        let caller = RecordingCaller::new();
        let state = make_state(Config::default(), caller.clone());
        let mut running = status("default-a-c1", TaskState::TaskFinished);
        running.uuid = Some("YWJj".to_string());

        handle_update(&state, running).await;

        let kinds = caller.recorded_kinds();
        assert_eq!(kinds[0], CallType::Acknowledge);
        let ack = caller.recorded()[0].acknowledge.clone().unwrap();
        assert_eq!(ack.task_id.value, "default-a-c1");
        assert_eq!(ack.uuid, "YWJj");
    }

    #[tokio::test]
    async fn updates_without_a_uuid_are_not_acknowledged() {
        let caller = RecordingCaller::new();
        let state = make_state_without_tokens(Config::default(), caller.clone());
        handle_update(&state, status("default-a-c1", TaskState::TaskRunning)).await;
        assert!(caller.recorded().is_empty());
    }

    #[tokio::test]
    async fn finished_tasks_trigger_a_revive() {
        let caller = RecordingCaller::new();
        let state = make_state(Config::default(), caller.clone());
        handle_update(&state, status("default-a-c1", TaskState::TaskFinished)).await;
        assert_eq!(caller.recorded_kinds(), vec![CallType::Revive]);
        assert!(state.terminal_error().is_none());
    }

    #[tokio::test]
    async fn revive_calls_are_rate_limited_to_the_burst() {
        let caller = RecordingCaller::new();
        let mut config = Config::default();
        config.revive_burst = 3;
        config.revive_wait = std::time::Duration::from_secs(1);
        let state = make_state(config, caller.clone());

        for _ in 0..10 {
            handle_update(&state, status("default-a-c1", TaskState::TaskFinished)).await;
        }

        let revives = caller
            .recorded_kinds()
            .into_iter()
            .filter(|kind| *kind == CallType::Revive)
            .count();
        assert_eq!(revives, 3);
    }

    #[tokio::test]
    async fn unexpected_terminal_states_post_the_exit_error() {
        let caller = RecordingCaller::new();
        let state = make_state(Config::default(), caller.clone());
        let mut failed = status("default-a-c1", TaskState::TaskFailed);
        failed.reason = Some("R".to_string());
        failed.source = Some("S".to_string());
        failed.message = Some("M".to_string());

        handle_update(&state, failed).await;

        let error = state.terminal_error().unwrap().to_string();
        assert_eq!(
            error,
            "Exiting because task default-a-c1 is in an unexpected state TASK_FAILED \
             with reason R from source S with message 'M'"
        );
    }

    #[tokio::test]
    async fn routine_states_are_ignored() {
        let caller = RecordingCaller::new();
        let state = make_state(Config::default(), caller.clone());
        for task_state in [
            TaskState::TaskStaging,
            TaskState::TaskStarting,
            TaskState::TaskRunning,
        ] {
            handle_update(&state, status("default-a-c1", task_state)).await;
        }
        assert!(caller.recorded().is_empty());
        assert!(state.terminal_error().is_none());
    }
}
