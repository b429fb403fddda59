use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::groups::TaskGroup;
use crate::ids::{GroupId, NodeId, TaskId, TempId};
use crate::output::parse_task_output;
use crate::status::{Status, TaskStatus, COMPLETE_DEADLINE, COMPLETE_UNDELIVERED};
use crate::tasks::Task;
use crate::templates::TaskTemp;

mod deadline;
mod retry;


/// Owns every template, task and group and applies node reports to them.
///
/// Each task sits behind its own lock, so reports for different tasks never
/// contend and readers always get a whole snapshot.
pub struct Engine {
    config: EngineConfig,
    dispatcher: Arc<dyn Dispatcher>,
    templates: RwLock<HashMap<TempId, TaskTemp>>,
    tasks: Mutex<HashMap<TaskId, Arc<Mutex<TaskEntry>>>>,
    groups: Mutex<HashMap<GroupId, Arc<Mutex<GroupEntry>>>>,
}


struct TaskEntry {
    task: Task,
    retries: HashMap<NodeId, JoinHandle<()>>,
    deadline: Option<JoinHandle<()>>,
    deadline_passed: bool,
    deleted: bool,
}

impl TaskEntry {
    fn new(task: Task) -> Self {
        Self {
            task,
            retries: HashMap::new(),
            deadline: None,
            deadline_passed: false,
            deleted: false,
        }
    }

    /// Stamp completion once every node is terminal.
    fn finish_if_done(&mut self, now: DateTime<Utc>) -> bool {
        if !self.task.is_finished() {
            return false;
        }
        self.task.complete_time = Some(now);
        if let Some(handle) = self.deadline.take() {
            handle.abort();
        }
        info!(task_id = %self.task.id, status = %self.task.aggregate_status(), "task finished");
        true
    }

    /// A new run may start: nothing pending and no node executing.
    fn check_idle(&self) -> Result<()> {
        if self.task.in_flight() || !self.task.can_be_delete() {
            return Err(Error::Conflict(format!("task {} is already running", self.task.id)));
        }
        Ok(())
    }

    fn cancel_timers(&mut self) {
        for (_, handle) in self.retries.drain() {
            handle.abort();
        }
        if let Some(handle) = self.deadline.take() {
            handle.abort();
        }
    }
}


struct GroupEntry {
    name: String,
    create_time: Option<DateTime<Utc>>,
    members: Vec<TaskId>,
}


impl Engine {
    pub fn new(config: EngineConfig, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            config,
            dispatcher,
            templates: RwLock::new(HashMap::new()),
            tasks: Mutex::new(HashMap::new()),
            groups: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn create_template(&self, mut temp: TaskTemp) -> Result<TaskTemp> {
        if temp.id.is_empty() {
            temp.id = TempId::generate();
        }
        temp.create_time.get_or_insert_with(Utc::now);
        temp.validate()?;

        let mut templates = self.templates.write().await;
        if templates.contains_key(&temp.id) {
            return Err(Error::Conflict(format!("template {} already exists", temp.id)));
        }
        templates.insert(temp.id.clone(), temp.clone());
        info!(temp_id = %temp.id, name = %temp.name, "template created");
        Ok(temp)
    }

    pub async fn get_template(&self, id: &TempId) -> Result<TaskTemp> {
        self.templates
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::TemplateNotFound(id.clone()))
    }

    pub async fn list_templates(&self) -> Vec<TaskTemp> {
        let mut templates: Vec<TaskTemp> = self.templates.read().await.values().cloned().collect();
        templates.sort_by(|a, b| a.create_time.cmp(&b.create_time).then(a.id.cmp(&b.id)));
        templates
    }

    /// Tasks holding a snapshot of the template are unaffected.
    pub async fn delete_template(&self, id: &TempId) -> Result<TaskTemp> {
        let temp = self
            .templates
            .write()
            .await
            .remove(id)
            .ok_or_else(|| Error::TemplateNotFound(id.clone()))?;
        info!(temp_id = %id, "template deleted");
        Ok(temp)
    }

    async fn prepare_task(&self, mut task: Task) -> Result<Task> {
        if task.id.is_empty() {
            task.id = TaskId::generate();
        }
        task.create_time.get_or_insert_with(Utc::now);
        if task.temp.is_none() {
            if let Some(temp_id) = &task.temp_id {
                task.temp = Some(self.get_template(temp_id).await.map_err(|_| {
                    Error::ValidationFailed(format!("task {} references unknown template {}", task.id, temp_id))
                })?);
            }
        }
        task.validate()?;
        Ok(task)
    }

    pub async fn create_task(&self, task: Task) -> Result<Task> {
        let task = self.prepare_task(task).await?;

        let mut tasks = self.tasks.lock().await;
        if tasks.contains_key(&task.id) {
            return Err(Error::Conflict(format!("task {} already exists", task.id)));
        }
        tasks.insert(task.id.clone(), Arc::new(Mutex::new(TaskEntry::new(task.clone()))));
        info!(task_id = %task.id, name = %task.name, nodes = task.nodes.len(), "task created");
        Ok(task)
    }

    async fn entry(&self, id: &TaskId) -> Result<Arc<Mutex<TaskEntry>>> {
        self.tasks
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::TaskNotFound(id.clone()))
    }

    pub async fn get_task(&self, id: &TaskId) -> Result<Task> {
        let entry = self.entry(id).await?;
        let entry = entry.lock().await;
        if entry.deleted {
            return Err(Error::TaskNotFound(id.clone()));
        }
        Ok(entry.task.clone())
    }

    pub async fn list_tasks(&self) -> Vec<Task> {
        // Never wait on a task lock while holding the map.
        let entries: Vec<_> = self.tasks.lock().await.values().cloned().collect();
        let mut tasks = vec![];
        for entry in entries {
            let entry = entry.lock().await;
            if !entry.deleted {
                tasks.push(entry.task.clone());
            }
        }
        tasks.sort_by(|a, b| a.create_time.cmp(&b.create_time).then(a.id.cmp(&b.id)));
        tasks
    }

    /// Refuses while any node is executing. Pending retries and the deadline
    /// timer are cancelled.
    pub async fn delete_task(&self, id: &TaskId) -> Result<Task> {
        let entry = self.entry(id).await?;
        let mut entry = entry.lock().await;
        if entry.deleted {
            return Err(Error::TaskNotFound(id.clone()));
        }
        if !entry.task.can_be_delete() {
            warn!(task_id = %id, "refusing to delete task with executing nodes");
            return Err(Error::Conflict(format!("task {} has nodes in exec", id)));
        }

        entry.deleted = true;
        entry.cancel_timers();
        self.tasks.lock().await.remove(id);
        let task = entry.task.clone();
        drop(entry);

        let groups: Vec<_> = self.groups.lock().await.values().cloned().collect();
        for group in groups {
            group.lock().await.members.retain(|member| member != id);
        }

        info!(task_id = %id, "task deleted");
        Ok(task)
    }

    /// Start a run on every target node.
    ///
    /// Nodes that cannot be reached count as failed attempts. When any node
    /// is left unreached with no retry pending the call fails with
    /// `Dispatch`; the run itself stays recorded.
    pub async fn dispatch_task(self: &Arc<Self>, id: &TaskId) -> Result<Task> {
        let entry = self.entry(id).await?;
        let snapshot = {
            let mut entry = entry.lock().await;
            if entry.deleted {
                return Err(Error::TaskNotFound(id.clone()));
            }
            entry.check_idle()?;
            self.begin_run(&mut entry).await?
        };

        let unreachable = self.fan_out(&snapshot, &snapshot.nodes).await;
        if !unreachable.is_empty() {
            return Err(undelivered(id, &unreachable));
        }
        self.get_task(id).await
    }

    /// Re-run a timer-driven task.
    ///
    /// Returns `false` when the trigger was skipped: the previous run is
    /// still going, or a one-shot task has already run.
    pub async fn trigger(self: &Arc<Self>, id: &TaskId) -> Result<bool> {
        let entry = self.entry(id).await?;
        let snapshot = {
            let mut entry = entry.lock().await;
            if entry.deleted {
                return Err(Error::TaskNotFound(id.clone()));
            }
            if entry.task.timer.trim().is_empty() {
                return Err(Error::ValidationFailed(format!("task {} has no timer", id)));
            }
            if entry.check_idle().is_err() {
                debug!(task_id = %id, "trigger skipped, run in flight");
                return Ok(false);
            }
            if entry.task.is_once && entry.task.start_time.is_some() {
                debug!(task_id = %id, "trigger skipped, one-shot task already ran");
                return Ok(false);
            }
            self.begin_run(&mut entry).await?
        };

        let unreachable = self.fan_out(&snapshot, &snapshot.nodes).await;
        if !unreachable.is_empty() {
            return Err(undelivered(id, &unreachable));
        }
        Ok(true)
    }

    async fn begin_run(self: &Arc<Self>, entry: &mut TaskEntry) -> Result<Task> {
        if entry.task.temp.is_none() {
            entry.task.temp = Some(self.resolve_template(&entry.task).await?);
        }

        entry.cancel_timers();
        entry.deadline_passed = false;

        let now = Utc::now();
        let max_history = self.config.max_history_per_node;
        let task = &mut entry.task;
        for node in task.nodes.clone() {
            task.archive(&node, Status::Init, max_history);
            task.attempts.insert(node, 1);
        }
        task.start_time = Some(now);
        task.complete_time = None;

        let id = task.id.clone();
        if let Some(deadline) = task.deadline() {
            entry.deadline = Some(self.arm_deadline(id.clone(), deadline));
        }

        info!(task_id = %id, nodes = entry.task.nodes.len(), "dispatching task");
        Ok(entry.task.clone())
    }

    async fn resolve_template(&self, task: &Task) -> Result<TaskTemp> {
        if let Some(temp) = &task.temp {
            return Ok(temp.clone());
        }
        let temp_id = task.temp_id.as_ref().ok_or_else(|| {
            Error::ValidationFailed(format!("task {} has no template", task.id))
        })?;
        self.get_template(temp_id).await.map_err(|_| {
            Error::ValidationFailed(format!("template {} no longer exists", temp_id))
        })
    }

    /// Deliver `task` to `nodes`, retrying undelivered nodes while they have
    /// attempts left. Returns the nodes given up on.
    async fn fan_out(self: &Arc<Self>, task: &Task, nodes: &[NodeId]) -> Vec<NodeId> {
        let mut snapshot = task.clone();
        let mut pending = nodes.to_vec();
        let mut unreachable = vec![];
        while !pending.is_empty() {
            let failed = self.send(&snapshot, &pending).await;
            if failed.is_empty() {
                break;
            }
            match self.mark_undelivered(&snapshot.id, &failed).await {
                Some((next, retry_now, given_up)) => {
                    snapshot = next;
                    pending = retry_now;
                    unreachable.extend(given_up);
                }
                None => break,
            }
        }
        unreachable
    }

    async fn send(&self, task: &Task, nodes: &[NodeId]) -> Vec<NodeId> {
        let sends = nodes.iter().map(|node| async move {
            match self.dispatcher.dispatch(task, node).await {
                Ok(()) => None,
                Err(err) => {
                    warn!(task_id = %task.id, node_id = %node, error = %err, "dispatch failed");
                    Some(node.clone())
                }
            }
        });
        join_all(sends).await.into_iter().flatten().collect()
    }

    /// Close the current attempt of each undelivered node as a failure.
    ///
    /// Returns the refreshed snapshot, the nodes to resend right away and the
    /// nodes with no attempts left. `None` once the task is gone.
    async fn mark_undelivered(
        self: &Arc<Self>,
        id: &TaskId,
        nodes: &[NodeId],
    ) -> Option<(Task, Vec<NodeId>, Vec<NodeId>)> {
        let entry = self.entry(id).await.ok()?;
        let mut guard = entry.lock().await;
        let entry = &mut *guard;
        if entry.deleted {
            return None;
        }

        let now = Utc::now();
        let mut retry_now = vec![];
        let mut given_up = vec![];
        for node in nodes {
            match entry.task.status.get_mut(node) {
                Some(record) if record.status == Status::Init => {
                    record.force_timeout(now, COMPLETE_UNDELIVERED);
                }
                _ => continue,
            }
            if self.plan_retry(entry, node) {
                retry_now.push(node.clone());
            } else if entry.task.node_status(node).is_terminal() {
                given_up.push(node.clone());
            }
        }
        entry.finish_if_done(now);
        Some((entry.task.clone(), retry_now, given_up))
    }

    /// Apply a status report from one node.
    ///
    /// A failed terminal report consumes one attempt; while attempts remain
    /// the node is reset to `init` and re-dispatched after the task's
    /// interval. Rejected reports leave the task unchanged.
    pub async fn apply_status(
        self: &Arc<Self>,
        id: &TaskId,
        node: &NodeId,
        report: TaskStatus,
    ) -> Result<Task> {
        let entry = self.entry(id).await?;
        let (snapshot, redispatch) = {
            let mut guard = entry.lock().await;
            let entry = &mut *guard;
            if entry.deleted {
                return Err(Error::TaskNotFound(id.clone()));
            }
            if !entry.task.has_node(node) {
                return Err(Error::ValidationFailed(format!(
                    "node {} is not a target of task {}", node, id
                )));
            }
            if entry.task.start_time.is_none() {
                return Err(Error::Conflict(format!("task {} has not been dispatched", id)));
            }

            let mut record = entry.task.status.get(node).cloned().unwrap_or_default();
            if entry.deadline_passed && record.comple_status == COMPLETE_DEADLINE {
                return Err(Error::DeadlineExceeded(id.clone()));
            }

            let now = Utc::now();
            record.advance(&report, now)?;
            debug!(task_id = %id, node_id = %node, status = %record.status, "status applied");

            let failed = record.is_failure();
            entry.task.status.insert(node.clone(), record);

            let redispatch = failed && self.plan_retry(entry, node);

            entry.finish_if_done(now);
            (entry.task.clone(), redispatch)
        };

        if redispatch {
            self.fan_out(&snapshot, std::slice::from_ref(node)).await;
        }
        Ok(snapshot)
    }

    /// Attach a node's raw output. Malformed payloads change nothing.
    pub async fn apply_output(&self, id: &TaskId, node: &NodeId, body: &str) -> Result<Task> {
        let output = parse_task_output(body).map_err(|err| {
            warn!(task_id = %id, node_id = %node, error = %err, "dropping output");
            err
        })?;

        let entry = self.entry(id).await?;
        let mut entry = entry.lock().await;
        if entry.deleted {
            return Err(Error::TaskNotFound(id.clone()));
        }
        entry.task.record_output(node, output)?;
        debug!(task_id = %id, node_id = %node, "output recorded");
        Ok(entry.task.clone())
    }

    pub async fn create_group(&self, mut group: TaskGroup) -> Result<TaskGroup> {
        if group.id.is_empty() {
            group.id = GroupId::generate();
        }
        group.create_time.get_or_insert_with(Utc::now);
        let mut prepared = Vec::with_capacity(group.tasks.len());
        for task in std::mem::take(&mut group.tasks) {
            prepared.push(self.prepare_task(task).await?);
        }
        group.tasks = prepared;
        group.validate()?;

        {
            let mut groups = self.groups.lock().await;
            if groups.contains_key(&group.id) {
                return Err(Error::Conflict(format!("group {} already exists", group.id)));
            }
            let mut tasks = self.tasks.lock().await;
            if let Some(dup) = group.tasks.iter().find(|t| tasks.contains_key(&t.id)) {
                return Err(Error::Conflict(format!("task {} already exists", dup.id)));
            }
            for task in &group.tasks {
                tasks.insert(task.id.clone(), Arc::new(Mutex::new(TaskEntry::new(task.clone()))));
            }
            groups.insert(group.id.clone(), Arc::new(Mutex::new(GroupEntry {
                name: group.name.clone(),
                create_time: group.create_time,
                members: group.tasks.iter().map(|t| t.id.clone()).collect(),
            })));
        }

        group.refresh_status();
        info!(group_id = %group.id, tasks = group.tasks.len(), "group created");
        Ok(group)
    }

    async fn group_entry(&self, id: &GroupId) -> Result<Arc<Mutex<GroupEntry>>> {
        self.groups
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::GroupNotFound(id.clone()))
    }

    /// Member snapshots with the group status derived from them.
    pub async fn get_group(&self, id: &GroupId) -> Result<TaskGroup> {
        let entry = self.group_entry(id).await?;
        let (name, create_time, members) = {
            let entry = entry.lock().await;
            (entry.name.clone(), entry.create_time, entry.members.clone())
        };

        let mut tasks = Vec::with_capacity(members.len());
        for member in &members {
            match self.get_task(member).await {
                Ok(task) => tasks.push(task),
                Err(Error::TaskNotFound(_)) => continue,
                Err(err) => return Err(err),
            }
        }

        let mut group = TaskGroup { name, id: id.clone(), tasks, create_time, status: None };
        group.refresh_status();
        Ok(group)
    }

    pub async fn list_groups(&self) -> Vec<TaskGroup> {
        let ids: Vec<GroupId> = self.groups.lock().await.keys().cloned().collect();
        let mut groups = vec![];
        for id in ids {
            if let Ok(group) = self.get_group(&id).await {
                groups.push(group);
            }
        }
        groups.sort_by(|a, b| a.create_time.cmp(&b.create_time).then(a.id.cmp(&b.id)));
        groups
    }

    /// Delete a group and its member tasks, refusing while any member is
    /// executing. All members are locked for the check, so either every
    /// member goes or none does.
    pub async fn delete_group(&self, id: &GroupId) -> Result<TaskGroup> {
        let group_entry = self.group_entry(id).await?;
        let group_guard = group_entry.lock().await;

        let entries: Vec<_> = {
            let tasks = self.tasks.lock().await;
            group_guard.members.iter().filter_map(|m| tasks.get(m).cloned()).collect()
        };
        let mut guards = Vec::with_capacity(entries.len());
        for entry in &entries {
            guards.push(entry.lock().await);
        }

        let mut group = TaskGroup {
            name: group_guard.name.clone(),
            id: id.clone(),
            tasks: guards.iter().filter(|g| !g.deleted).map(|g| g.task.clone()).collect(),
            create_time: group_guard.create_time,
            status: None,
        };
        group.refresh_status();
        if !group.can_be_delete() {
            warn!(group_id = %id, "refusing to delete group with executing tasks");
            return Err(Error::Conflict(format!("group {} has tasks in exec", id)));
        }

        {
            let mut tasks = self.tasks.lock().await;
            for guard in guards.iter_mut() {
                guard.deleted = true;
                guard.cancel_timers();
                tasks.remove(&guard.task.id);
            }
        }
        drop(guards);
        self.groups.lock().await.remove(id);

        info!(group_id = %id, tasks = group.tasks.len(), "group deleted");
        Ok(group)
    }

    /// Dispatch every member.
    ///
    /// Members are checked up front: if any is running or has no resolvable
    /// template, nothing is started. Delivery failures are collected across
    /// members and reported together as `Dispatch`.
    pub async fn dispatch_group(self: &Arc<Self>, id: &GroupId) -> Result<TaskGroup> {
        let members = self.group_entry(id).await?.lock().await.members.clone();

        let mut entries = Vec::with_capacity(members.len());
        for member in &members {
            match self.entry(member).await {
                Ok(entry) => entries.push(entry),
                Err(Error::TaskNotFound(_)) => continue,
                Err(err) => return Err(err),
            }
        }
        for entry in &entries {
            let mut entry = entry.lock().await;
            if entry.deleted {
                continue;
            }
            entry.check_idle()?;
            if entry.task.temp.is_none() {
                entry.task.temp = Some(self.resolve_template(&entry.task).await?);
            }
        }

        let mut failures = vec![];
        for entry in &entries {
            let member = entry.lock().await.task.id.clone();
            match self.dispatch_task(&member).await {
                Ok(_) | Err(Error::TaskNotFound(_)) => {}
                Err(Error::Dispatch(msg)) => failures.push(msg),
                Err(err) => return Err(err),
            }
        }
        if !failures.is_empty() {
            warn!(group_id = %id, failed = failures.len(), "group dispatch incomplete");
            return Err(Error::Dispatch(failures.join("; ")));
        }
        self.get_group(id).await
    }
}


fn undelivered(id: &TaskId, nodes: &[NodeId]) -> Error {
    let nodes: Vec<&str> = nodes.iter().map(|n| n.as_str()).collect();
    Error::Dispatch(format!("task {} could not reach {}", id, nodes.join(", ")))
}
