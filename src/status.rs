use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};


pub const COMPLETE_SUCCESS: &str = "success";
pub const COMPLETE_FAILURE: &str = "failure";
pub const COMPLETE_TIMEOUT: &str = "timeout";
pub const COMPLETE_DEADLINE: &str = "deadline_exceeded";
pub const COMPLETE_UNDELIVERED: &str = "dispatch_failed";


/// Execution state of one node, one task, or one group.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Create,
    Init,
    Exec,
    Complete,
    Timeout,
}

impl Status {
    fn rank(self) -> u8 {
        match self {
            Status::Create => 0,
            Status::Init => 1,
            Status::Exec => 2,
            Status::Complete | Status::Timeout => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Complete | Status::Timeout)
    }

    /// Moves only go forward; terminal states accept nothing.
    pub fn can_transition(self, to: Status) -> bool {
        !self.is_terminal() && to.rank() > self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Create => "create",
            Status::Init => "init",
            Status::Exec => "exec",
            Status::Complete => "complete",
            Status::Timeout => "timeout",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(Status::Create),
            "init" => Ok(Status::Init),
            "exec" => Ok(Status::Exec),
            "complete" => Ok(Status::Complete),
            "timeout" => Ok(Status::Timeout),
            other => Err(Error::ValidationFailed(format!("unknown status {:?}", other))),
        }
    }
}


/// Fold member states into one aggregate.
///
/// Used over nodes for a task and over tasks for a group:
/// any `exec` wins, then all-`complete`, then any `timeout`, then `init` if
/// anything was dispatched at all, else `create`.
pub fn aggregate<I>(statuses: I) -> Status
where
    I: IntoIterator<Item = Status>,
{
    let mut seen = false;
    let mut all_complete = true;
    let mut any_timeout = false;
    let mut any_started = false;

    for status in statuses {
        seen = true;
        match status {
            Status::Exec => return Status::Exec,
            Status::Complete => any_started = true,
            Status::Timeout => {
                any_timeout = true;
                all_complete = false;
            }
            Status::Init => {
                any_started = true;
                all_complete = false;
            }
            Status::Create => all_complete = false,
        }
    }

    if seen && all_complete {
        Status::Complete
    } else if any_timeout {
        Status::Timeout
    } else if any_started {
        Status::Init
    } else {
        Status::Create
    }
}


#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Seconds between start and end.
    #[serde(default)]
    pub take_time: i64,
    #[serde(default)]
    pub comple_status: String,
    /// Exit code of the node's script.
    #[serde(default)]
    pub shell_code: i32,
}

impl TaskStatus {
    pub fn new(status: Status) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    /// Non-zero exit or a node-side timeout.
    pub fn is_failure(&self) -> bool {
        match self.status {
            Status::Complete => self.shell_code != 0,
            Status::Timeout => true,
            _ => false,
        }
    }

    /// Apply a reported state on top of this record.
    ///
    /// A repeated non-terminal state is a no-op. On error the record is left
    /// untouched.
    pub fn advance(&mut self, report: &TaskStatus, now: DateTime<Utc>) -> Result<()> {
        let from = self.status;
        let to = report.status;
        if from == to && !from.is_terminal() {
            return Ok(());
        }
        if !from.can_transition(to) {
            return Err(Error::InvalidTransition { from, to });
        }

        self.status = to;
        if to == Status::Exec || (to.is_terminal() && self.start_time.is_none()) {
            self.start_time = report.start_time.or(self.start_time).or(Some(now));
        }

        if to.is_terminal() {
            let end = report.end_time.unwrap_or(now);
            self.end_time = Some(end);
            self.shell_code = report.shell_code;
            self.take_time = if report.take_time > 0 {
                report.take_time
            } else {
                self.start_time
                    .map(|start| (end - start).num_seconds().max(0))
                    .unwrap_or(0)
            };
            self.comple_status = if report.comple_status.is_empty() {
                default_comple_status(to, report.shell_code).to_string()
            } else {
                report.comple_status.clone()
            };
        }

        Ok(())
    }

    /// Forced terminal timeout, bypassing the reporter.
    pub fn force_timeout(&mut self, now: DateTime<Utc>, comple_status: &str) {
        self.status = Status::Timeout;
        self.end_time = Some(now);
        self.take_time = self
            .start_time
            .map(|start| (now - start).num_seconds().max(0))
            .unwrap_or(0);
        self.comple_status = comple_status.to_string();
    }
}


fn default_comple_status(status: Status, shell_code: i32) -> &'static str {
    match status {
        Status::Timeout => COMPLETE_TIMEOUT,
        _ if shell_code != 0 => COMPLETE_FAILURE,
        _ => COMPLETE_SUCCESS,
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn transitions_only_move_forward() {
        assert!(Status::Create.can_transition(Status::Init));
        assert!(Status::Init.can_transition(Status::Exec));
        assert!(Status::Exec.can_transition(Status::Complete));
        assert!(Status::Init.can_transition(Status::Timeout));
        assert!(!Status::Exec.can_transition(Status::Init));
        assert!(!Status::Complete.can_transition(Status::Exec));
        assert!(!Status::Timeout.can_transition(Status::Complete));
        assert!(!Status::Complete.can_transition(Status::Complete));
    }

    #[test]
    fn advance_rejects_backward_move_and_keeps_record() {
        let now = Utc::now();
        let mut record = TaskStatus::new(Status::Exec);
        record.advance(&TaskStatus::new(Status::Complete), now).unwrap();
        let before = record.clone();

        let err = record.advance(&TaskStatus::new(Status::Exec), now).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTransition { from: Status::Complete, to: Status::Exec }
        ));
        assert_eq!(record, before);
    }

    #[test]
    fn advance_fills_timing_and_completion() {
        let start = Utc::now();
        let end = start + Duration::seconds(12);
        let mut record = TaskStatus::new(Status::Init);

        let exec = TaskStatus {
            status: Status::Exec,
            start_time: Some(start),
            ..Default::default()
        };
        record.advance(&exec, start).unwrap();
        record.advance(&exec, start).unwrap();
        assert_eq!(record.status, Status::Exec);

        let done = TaskStatus {
            status: Status::Complete,
            shell_code: 2,
            ..Default::default()
        };
        record.advance(&done, end).unwrap();
        assert_eq!(record.start_time, Some(start));
        assert_eq!(record.end_time, Some(end));
        assert_eq!(record.take_time, 12);
        assert_eq!(record.comple_status, COMPLETE_FAILURE);
        assert!(record.is_failure());
    }

    #[test]
    fn aggregate_rules() {
        use Status::*;
        assert_eq!(aggregate(Vec::new()), Create);
        assert_eq!(aggregate([Create, Create]), Create);
        assert_eq!(aggregate([Create, Init]), Init);
        assert_eq!(aggregate([Complete, Create]), Init);
        assert_eq!(aggregate([Complete, Complete]), Complete);
        assert_eq!(aggregate([Complete, Timeout]), Timeout);
        assert_eq!(aggregate([Timeout, Init]), Timeout);
        assert_eq!(aggregate([Complete, Complete, Exec, Timeout]), Exec);
    }

    #[test]
    fn status_uses_lowercase_names() {
        assert_eq!(serde_json::to_string(&Status::Exec).unwrap(), "\"exec\"");
        let s: Status = serde_json::from_str("\"timeout\"").unwrap();
        assert_eq!(s, Status::Timeout);
    }
}
