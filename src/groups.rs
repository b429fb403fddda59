use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};
use crate::ids::{GroupId, TaskId};
use crate::status::{self, Status, TaskStatus};
use crate::tasks::Task;


/// A named set of tasks sharing one lifecycle view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskGroup {
    pub name: String,
    #[serde(default)]
    pub id: GroupId,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: Option<TaskGroupStatus>,
}


/// Status of a group, keyed by task id rather than node id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskGroupStatus {
    #[serde(default)]
    pub task_status: BTreeMap<TaskId, TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub status: Status,
}

impl TaskGroupStatus {
    /// Derive the group view from member snapshots.
    pub fn from_tasks<'a, I>(tasks: I) -> Self
    where
        I: IntoIterator<Item = &'a Task>,
    {
        let mut task_status = BTreeMap::new();
        let mut init_time: Option<DateTime<Utc>> = None;
        let mut start_time: Option<DateTime<Utc>> = None;
        let mut end_time: Option<DateTime<Utc>> = None;

        for task in tasks {
            task_status.insert(task.id.clone(), task.summary());
            init_time = earliest(init_time, task.start_time);
            for node in task.status.values() {
                start_time = earliest(start_time, node.start_time);
            }
            end_time = latest(end_time, task.complete_time);
        }

        let status = status::aggregate(task_status.values().map(|s| s.status));
        Self {
            task_status,
            init_time,
            start_time,
            end_time: if status.is_terminal() { end_time } else { None },
            status,
        }
    }
}


impl TaskGroup {
    pub fn new(name: impl Into<String>, tasks: Vec<Task>) -> Self {
        Self {
            name: name.into(),
            id: GroupId::generate(),
            tasks,
            create_time: None,
            status: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::ValidationFailed("group name is required".to_string()));
        }
        if !self.id.is_uuid() {
            return Err(Error::ValidationFailed(format!(
                "group id is not a uuid: {:?}", self.id.as_str()
            )));
        }
        let unique: BTreeSet<&TaskId> = self.tasks.iter().map(|t| &t.id).collect();
        if unique.len() != self.tasks.len() {
            return Err(Error::ValidationFailed(format!(
                "group {} lists a task more than once", self.id
            )));
        }
        for task in &self.tasks {
            task.validate()?;
        }
        Ok(())
    }

    pub fn refresh_status(&mut self) {
        self.status = Some(TaskGroupStatus::from_tasks(&self.tasks));
    }

    /// A group may be deleted unless some member task is executing.
    ///
    /// Scans the per-task map, not the members' per-node maps.
    pub fn can_be_delete(&self) -> bool {
        match &self.status {
            None => true,
            Some(status) => !status.task_status.values().any(|s| s.status == Status::Exec),
        }
    }
}


fn earliest(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn latest(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}
