//! Constructors for the calls this framework sends to the master.

use std::time::Duration;

use rand::Rng;

use crate::messages::{
    Accept, Acknowledge, AgentId, Call, CallType, Decline, ExecutorInfo, Filters, FrameworkInfo,
    Kill, LaunchGroup, OfferId, Operation, OperationType, Subscribe, TaskGroupInfo, TaskId,
    TaskInfo,
};

pub fn subscribe(framework_info: FrameworkInfo) -> Call {
    let mut call = Call::new(CallType::Subscribe);
    call.subscribe = Some(Subscribe { framework_info });
    call
}

pub fn decline(offer_ids: Vec<OfferId>) -> Call {
    let mut call = Call::new(CallType::Decline);
    call.decline = Some(Decline {
        offer_ids,
        filters: None,
    });
    call
}

pub fn accept(offer_ids: Vec<OfferId>, operations: Vec<Operation>) -> Call {
    let mut call = Call::new(CallType::Accept);
    call.accept = Some(Accept {
        offer_ids,
        operations,
        filters: None,
    });
    call
}

pub fn acknowledge(agent_id: AgentId, task_id: TaskId, uuid: String) -> Call {
    let mut call = Call::new(CallType::Acknowledge);
    call.acknowledge = Some(Acknowledge {
        agent_id,
        task_id,
        uuid,
    });
    call
}

pub fn revive() -> Call {
    Call::new(CallType::Revive)
}

pub fn kill(task_id: TaskId, agent_id: Option<AgentId>) -> Call {
    let mut call = Call::new(CallType::Kill);
    call.kill = Some(Kill { task_id, agent_id });
    call
}

/// Wraps an executor and its tasks into the single operation of an Accept
/// call.
pub fn launch_group(executor: ExecutorInfo, tasks: Vec<TaskInfo>) -> Operation {
    Operation {
        kind: OperationType::LaunchGroup,
        launch_group: Some(LaunchGroup {
            executor,
            task_group: TaskGroupInfo { tasks },
        }),
    }
}

/// Filters carrying a refuse-seconds value drawn uniformly from
/// `[0, max_refuse)`.
pub fn refuse_seconds_with_jitter(max_refuse: Duration) -> Filters {
    let max = max_refuse.as_secs_f64();
    let refuse_seconds = if max > 0.0 {
        rand::thread_rng().gen_range(0.0..max)
    } else {
        0.0
    };
    Filters {
        refuse_seconds: Some(refuse_seconds),
    }
}

impl Call {
    /// Attaches `filters` to whichever call body supports them.
    pub fn with_filters(mut self, filters: Filters) -> Call {
        if let Some(decline) = self.decline.as_mut() {
            decline.filters = Some(filters);
        }
        if let Some(accept) = self.accept.as_mut() {
            accept.filters = Some(filters);
        }
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn refuse_seconds_stay_in_range() {
        for _ in 0..100 {
            let filters = refuse_seconds_with_jitter(Duration::from_secs(5));
            let refuse = filters.refuse_seconds.unwrap();
            assert!((0.0..5.0).contains(&refuse), "refuse {} out of range", refuse);
        }
        let zero = refuse_seconds_with_jitter(Duration::from_secs(0));
        assert_eq!(zero.refuse_seconds, Some(0.0));
    }

    #[test]
    fn filters_attach_to_the_present_body() {
        let filters = Filters {
            refuse_seconds: Some(1.5),
        };
        let declined = decline(vec![OfferId::new("O1")]).with_filters(filters);
        assert_eq!(
            declined.decline.unwrap().filters.unwrap().refuse_seconds,
            Some(1.5)
        );

        let accepted = accept(vec![OfferId::new("O1")], Vec::new()).with_filters(filters);
        assert_eq!(
            accepted.accept.unwrap().filters.unwrap().refuse_seconds,
            Some(1.5)
        );

        let revived = revive().with_filters(filters);
        assert!(revived.decline.is_none() && revived.accept.is_none());
    }
}
