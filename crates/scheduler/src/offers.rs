//! The offer matcher.
//!
//! Each batch of offers is processed in arrival order. An offer either fits
//! the first pending pod, in which case a single Accept call launches the
//! whole task group on it, or it is declined with jittered refuse seconds.
//! Exactly one pod is matched per offer; leftover resources are not reused
//! within the same cycle.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::calls;
use crate::messages::{Filters, Offer, OfferId};
use crate::pod;
use crate::resources::{ReservationInfo, Resources};
use crate::state::StateStore;

pub async fn handle_offers(state: &Arc<StateStore>, offers: Vec<Offer>) {
    let filters = calls::refuse_seconds_with_jitter(state.config.max_refuse_seconds);
    let mut tasks_launched_this_cycle = 0usize;
    let mut offers_declined = 0usize;
    let executor_wants = pod::executor_resources();

    for offer in offers {
        let mut remaining = offer.resources.clone();

        if state.config.verbose {
            debug!(offer = %offer.id, resources = %remaining, "received offer");
        }

        // Nothing to place: give the resources back right away.
        if state.pending.is_empty() {
            info!(offer = %offer.id, "no new pods; declining offer");
            decline_offer(state, &offer.id, filters).await;
            offers_declined += 1;
            continue;
        }

        let key = match state.pending.keys().into_iter().next() {
            Some(key) => key,
            None => {
                decline_offer(state, &offer.id, filters).await;
                offers_declined += 1;
                continue;
            }
        };
        let record = match state.pending.get(&key) {
            Some(record) => record,
            None => {
                // The pod was deleted between the snapshot and the read.
                decline_offer(state, &offer.id, filters).await;
                offers_declined += 1;
                continue;
            }
        };

        let mut flattened = remaining.to_unreserved();
        let group_wants = pod::pod_resources(&record.pod);
        if state.config.verbose {
            debug!(pod = %key, wants = %group_wants, "pod resource request");
        }

        if !flattened.contains_all(&executor_wants.plus(&group_wants)) {
            info!(offer = %offer.id, "not enough resources in offer; declining");
            decline_offer(state, &offer.id, filters).await;
            offers_declined += 1;
            continue;
        }

        for name in flattened.scalar_names() {
            state
                .metrics
                .offered_resources(flattened.sum_scalar(&name), &name);
        }

        // Carve the executor slice first, then one slice per container.
        // After each carve the remainder must still cover the next request;
        // if it does not, the pod is abandoned for this offer.
        let mut executor = pod::build_executor_info(offer.framework_id.clone(), &key);
        let found = carve(&state.config.role, &executor_wants, &flattened);
        if found.is_empty() {
            warn!(offer = %offer.id, "offer no longer covers the executor; declining");
            decline_offer(state, &offer.id, filters).await;
            offers_declined += 1;
            continue;
        }
        executor.resources = found.clone();
        remaining.subtract(&found.to_unreserved());
        flattened = remaining.to_unreserved();

        let mut tasks = record.tasks.clone();
        let mut aborted = false;
        for (pos, container) in record.pod.containers().iter().enumerate() {
            let task_wants = pod::task_resources(container);
            if state.config.verbose {
                debug!(container = %container.name, wants = %task_wants, "container resource request");
            }

            let found = carve(&state.config.role, &task_wants, &flattened);
            if found.is_empty() {
                warn!(
                    pod = %key,
                    container = %container.name,
                    "offer no longer covers task after earlier carves; abandoning pod for this offer"
                );
                aborted = true;
                break;
            }

            tasks[pos].agent_id = Some(offer.agent_id.clone());
            tasks[pos].resources = found.clone();
            remaining.subtract(&found.to_unreserved());
            flattened = remaining.to_unreserved();
        }
        if aborted {
            decline_offer(state, &offer.id, filters).await;
            offers_declined += 1;
            continue;
        }

        if state.config.verbose {
            debug!(pod = %key, offer = %offer.id, "launching pod");
        }

        let launched = tasks.len();
        let accept = calls::accept(
            vec![offer.id.clone()],
            vec![calls::launch_group(executor, tasks.clone())],
        )
        .with_filters(filters);

        match state.caller.call(accept).await {
            Ok(_) => {
                tasks_launched_this_cycle += launched;
                // The launch is out the door; freeze the assignment and
                // promote the pod. A concurrent delete may already have
                // taken the record.
                match state.pending.get_and_remove(&key) {
                    Some(mut record) => {
                        record.tasks = tasks;
                        state.running.set(key, record);
                    }
                    None => warn!(pod = %key, "pod disappeared while launching"),
                }
            }
            // The pod stays pending and gets another chance on a later
            // offer.
            Err(err) => error!(pod = %key, error = %err, "failed to launch tasks"),
        }
    }

    state.metrics.offers_declined(offers_declined);
    state.metrics.tasks_launched(tasks_launched_this_cycle);
    state
        .metrics
        .launches_per_cycle(tasks_launched_this_cycle as f64);
    if tasks_launched_this_cycle == 0 && state.config.verbose {
        debug!("zero tasks launched this cycle");
    }
}

/// Carves `wants` out of the flattened remainder. For the default role the
/// bundle is taken unreserved; any other role carves with a static
/// reservation pushed on.
fn carve(role: &str, wants: &Resources, flattened: &Resources) -> Resources {
    if role == "*" {
        flattened.find(wants)
    } else {
        flattened.find(&wants.push_reservation(ReservationInfo::static_role(role)))
    }
}

async fn decline_offer(state: &Arc<StateStore>, offer_id: &OfferId, filters: Filters) {
    let call = calls::decline(vec![offer_id.clone()]).with_filters(filters);
    if let Err(err) = state.caller.call(call).await {
        warn!(offer = %offer_id, error = %err, "failed to decline offer");
    }
}
