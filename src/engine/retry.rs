use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{Engine, TaskEntry};
use crate::ids::{NodeId, TaskId};
use crate::status::Status;


impl Engine {
    /// Decide what follows a failed terminal report for `node`.
    ///
    /// The failed record moves to history and the node gets a fresh `init`
    /// slot. Returns `true` when the node should be re-dispatched right away;
    /// delayed retries are spawned here and tracked on the entry.
    pub(super) fn plan_retry(self: &Arc<Self>, entry: &mut TaskEntry, node: &NodeId) -> bool {
        let task = &mut entry.task;
        let attempts = task.attempts(node).max(1);
        if entry.deadline_passed || attempts > task.retry {
            warn!(task_id = %task.id, node_id = %node, attempts, "node failed, no retries left");
            return false;
        }

        task.archive(node, Status::Init, self.config.max_history_per_node);
        task.attempts.insert(node.clone(), attempts + 1);

        if task.interval <= 0 {
            info!(task_id = %task.id, node_id = %node, attempt = attempts + 1, "retrying now");
            return true;
        }

        let delay = Duration::from_secs(task.interval as u64);
        info!(
            task_id = %task.id, node_id = %node, attempt = attempts + 1,
            delay_secs = task.interval, "retry scheduled"
        );
        let engine = self.clone();
        let id = task.id.clone();
        let target = node.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            engine.fire_retry(id, target).await;
        });
        if let Some(previous) = entry.retries.insert(node.clone(), handle) {
            previous.abort();
        }
        false
    }

    async fn fire_retry(self: Arc<Self>, id: TaskId, node: NodeId) {
        let entry = match self.entry(&id).await {
            Ok(entry) => entry,
            Err(_) => {
                debug!(task_id = %id, node_id = %node, "retry suppressed, task gone");
                return;
            }
        };

        let snapshot = {
            let mut entry = entry.lock().await;
            // Dropping our own handle detaches it; aborting would cancel us.
            entry.retries.remove(&node);
            if entry.deleted
                || entry.deadline_passed
                || entry.task.node_status(&node) != Status::Init
            {
                debug!(task_id = %id, node_id = %node, "retry suppressed");
                return;
            }
            entry.task.clone()
        };

        self.fan_out(&snapshot, std::slice::from_ref(&node)).await;
    }
}
