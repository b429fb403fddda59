use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};
use crate::ids::{NodeId, TaskId, TempId};
use crate::output::TaskOutPut;
use crate::status::{self, Status, TaskStatus, COMPLETE_FAILURE, COMPLETE_SUCCESS};
use crate::templates::TaskTemp;


/// One unit of work fanned out to a set of nodes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    #[serde(default)]
    pub id: TaskId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_id: Option<TempId>,
    /// Frozen copy of the template, kept even if the template is deleted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp: Option<TaskTemp>,
    #[serde(default)]
    pub nodes: Vec<NodeId>,
    /// Trigger expression for the external timer source, e.g. `@every 30m`.
    #[serde(default)]
    pub timer: String,
    /// Seconds from start before unfinished nodes are forced to `timeout`.
    #[serde(default)]
    pub time_out: i64,
    /// Extra attempts after a failed one.
    #[serde(default)]
    pub retry: u32,
    /// Seconds to wait before a retry; `<= 0` retries immediately.
    #[serde(default)]
    pub interval: i64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub status: BTreeMap<NodeId, TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complete_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub result_path: String,
    #[serde(default)]
    pub event_id: String,
    #[serde(default)]
    pub is_once: bool,
    #[serde(default)]
    pub out_put: Vec<TaskOutPut>,
    /// Executions started per node in the current run.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attempts: BTreeMap<NodeId, u32>,
    /// Records displaced by retries and re-triggers, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<StatusAttempt>,
}


/// Audit entry for a status record replaced by a newer attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusAttempt {
    pub node_id: NodeId,
    pub attempt: u32,
    pub status: TaskStatus,
}


impl Task {
    pub fn new(name: impl Into<String>, nodes: Vec<NodeId>) -> Self {
        Self {
            name: name.into(),
            id: TaskId::generate(),
            temp_id: None,
            temp: None,
            nodes,
            timer: String::new(),
            time_out: 0,
            retry: 0,
            interval: 0,
            status: BTreeMap::new(),
            create_time: None,
            start_time: None,
            complete_time: None,
            result_path: String::new(),
            event_id: String::new(),
            is_once: false,
            out_put: vec![],
            attempts: BTreeMap::new(),
            history: vec![],
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::ValidationFailed("task name is required".to_string()));
        }
        if !self.id.is_uuid() {
            return Err(Error::ValidationFailed(format!(
                "task id is not a uuid: {:?}", self.id.as_str()
            )));
        }
        if let Some(temp_id) = &self.temp_id {
            if !temp_id.is_uuid() {
                return Err(Error::ValidationFailed(format!(
                    "temp_id is not a uuid: {:?}", temp_id.as_str()
                )));
            }
        }
        if let Some(temp) = &self.temp {
            temp.validate()?;
        }
        if self.nodes.is_empty() {
            return Err(Error::ValidationFailed(format!("task {} has no nodes", self.id)));
        }
        let unique: BTreeSet<&NodeId> = self.nodes.iter().collect();
        if unique.len() != self.nodes.len() {
            return Err(Error::ValidationFailed(format!(
                "task {} lists a node more than once", self.id
            )));
        }
        if self.time_out < 0 {
            return Err(Error::ValidationFailed(format!(
                "task {} time_out must not be negative", self.id
            )));
        }
        if self.time_out > 0 && offset(Utc::now(), self.time_out).is_none() {
            return Err(Error::ValidationFailed(format!(
                "task {} time_out {} is out of range", self.id, self.time_out
            )));
        }
        if let Some(node) = self.status.keys().find(|node| !self.has_node(node)) {
            return Err(Error::ValidationFailed(format!(
                "task {} has status for unknown node {}", self.id, node
            )));
        }
        Ok(())
    }

    pub fn has_node(&self, node: &NodeId) -> bool {
        self.nodes.contains(node)
    }

    /// A task may be deleted unless some node is executing.
    pub fn can_be_delete(&self) -> bool {
        !self.status.values().any(|s| s.status == Status::Exec)
    }

    pub fn node_status(&self, node: &NodeId) -> Status {
        self.status.get(node).map(|s| s.status).unwrap_or_default()
    }

    /// Aggregate over every target node; nodes without a record count as `create`.
    pub fn aggregate_status(&self) -> Status {
        status::aggregate(self.nodes.iter().map(|node| self.node_status(node)))
    }

    /// Every target node has reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.nodes.iter().all(|node| self.node_status(node).is_terminal())
    }

    pub fn in_flight(&self) -> bool {
        self.start_time.is_some() && !self.is_finished()
    }

    /// `None` without a positive `time_out`, before dispatch, or when the
    /// deadline is not representable.
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        if self.time_out <= 0 {
            return None;
        }
        self.start_time.and_then(|start| offset(start, self.time_out))
    }

    pub fn attempts(&self, node: &NodeId) -> u32 {
        self.attempts.get(node).copied().unwrap_or(0)
    }

    /// Task-level record as seen from a group.
    pub fn summary(&self) -> TaskStatus {
        let status = self.aggregate_status();
        let shell_code = self
            .status
            .values()
            .map(|s| s.shell_code)
            .find(|code| *code != 0)
            .unwrap_or(0);
        let comple_status = if !status.is_terminal() {
            String::new()
        } else if self.status.values().any(|s| s.is_failure()) {
            COMPLETE_FAILURE.to_string()
        } else {
            COMPLETE_SUCCESS.to_string()
        };
        let take_time = match (self.start_time, self.complete_time) {
            (Some(start), Some(end)) => (end - start).num_seconds().max(0),
            _ => 0,
        };

        TaskStatus {
            status,
            start_time: self.start_time,
            end_time: self.complete_time,
            take_time,
            comple_status,
            shell_code,
        }
    }

    /// Move the node's current record into history and open a fresh slot.
    pub fn archive(&mut self, node: &NodeId, status: Status, max_history: usize) {
        if let Some(previous) = self.status.remove(node) {
            self.history.push(StatusAttempt {
                node_id: node.clone(),
                attempt: self.attempts(node),
                status: previous,
            });
            let kept = self.history.iter().filter(|h| &h.node_id == node).count();
            if kept > max_history {
                if let Some(pos) = self.history.iter().position(|h| &h.node_id == node) {
                    self.history.remove(pos);
                }
            }
        }
        self.status.insert(node.clone(), TaskStatus::new(status));
    }

    /// Store a node's output, replacing an earlier one from the same node.
    ///
    /// Nothing is changed when the output is rejected.
    pub fn record_output(&mut self, node: &NodeId, output: TaskOutPut) -> Result<()> {
        if &output.node_id != node {
            return Err(Error::MalformedOutput(format!(
                "output for node {} reported by node {}", output.node_id, node
            )));
        }
        if !self.has_node(node) {
            return Err(Error::MalformedOutput(format!(
                "node {} is not a target of task {}", node, self.id
            )));
        }
        match self.out_put.iter_mut().find(|o| &o.node_id == node) {
            Some(existing) => *existing = output,
            None => self.out_put.push(output),
        }
        Ok(())
    }
}


fn offset(start: DateTime<Utc>, secs: i64) -> Option<DateTime<Utc>> {
    Duration::try_seconds(secs).and_then(|delta| start.checked_add_signed(delta))
}
