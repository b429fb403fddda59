use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::Engine;
use crate::error::Result;
use crate::ids::TaskId;
use crate::status::COMPLETE_DEADLINE;


impl Engine {
    pub(super) fn arm_deadline(self: &Arc<Self>, id: TaskId, deadline: DateTime<Utc>) -> JoinHandle<()> {
        let engine = self.clone();
        let wait = (deadline - Utc::now()).to_std().unwrap_or_default();
        tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            let now = Utc::now().max(deadline);
            if let Err(err) = engine.enforce_deadline(&id, now).await {
                debug!(task_id = %id, error = %err, "deadline check skipped");
            }
        })
    }

    /// Force every unfinished node of an overdue task into `timeout`.
    ///
    /// Pending retries are cancelled and none are scheduled for the rest of
    /// the run. Returns whether anything was forced.
    pub async fn enforce_deadline(&self, id: &TaskId, now: DateTime<Utc>) -> Result<bool> {
        let entry = self.entry(id).await?;
        let mut guard = entry.lock().await;
        let entry = &mut *guard;
        if entry.deleted || entry.deadline_passed || entry.task.is_finished() {
            return Ok(false);
        }
        let deadline = match entry.task.deadline() {
            Some(deadline) if now >= deadline => deadline,
            _ => return Ok(false),
        };

        entry.deadline_passed = true;
        for (_, handle) in entry.retries.drain() {
            handle.abort();
        }
        // May be the running timer itself; detach rather than abort.
        entry.deadline = None;

        let mut forced = 0;
        for node in entry.task.nodes.clone() {
            let record = entry.task.status.entry(node).or_default();
            if !record.status.is_terminal() {
                record.force_timeout(now, COMPLETE_DEADLINE);
                forced += 1;
            }
        }
        entry.task.complete_time = Some(now);
        warn!(task_id = %id, forced, deadline = %deadline, "deadline exceeded");
        Ok(true)
    }

    /// Enforce deadlines across every task; returns the tasks that expired.
    pub async fn sweep_deadlines(&self, now: DateTime<Utc>) -> Vec<TaskId> {
        let ids: Vec<TaskId> = self.tasks.lock().await.keys().cloned().collect();
        let mut expired = vec![];
        for id in ids {
            if let Ok(true) = self.enforce_deadline(&id, now).await {
                expired.push(id);
            }
        }
        expired
    }

    /// Periodic backstop for deadline timers.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = self.clone();
        let period = Duration::from_secs(self.config.sweep_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let expired = engine.sweep_deadlines(Utc::now()).await;
                if !expired.is_empty() {
                    debug!(count = expired.len(), "sweep expired tasks");
                }
            }
        })
    }
}
