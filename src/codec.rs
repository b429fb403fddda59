//! Canonical JSON encoding for persistence and exchange.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;


pub fn encode<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

pub fn encode_pretty<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

pub fn decode<T: DeserializeOwned>(body: &str) -> Result<T> {
    Ok(serde_json::from_str(body)?)
}


#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    use crate::groups::TaskGroup;
    use crate::ids::{NodeId, TempId};
    use crate::output::parse_task_output;
    use crate::status::{Status, TaskStatus};
    use crate::tasks::{StatusAttempt, Task};
    use crate::templates::{OutputChannel, Shell, TaskTemp};

    fn full_task() -> Task {
        let created = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let temp = TaskTemp {
            name: "check-node".to_string(),
            id: TempId::generate(),
            shell: Shell { cmd: vec!["/bin/sh".to_string(), "check.sh".to_string()] },
            envs: [("MODE".to_string(), "fast".to_string())].into_iter().collect(),
            input: "{}".to_string(),
            args: vec!["--all".to_string()],
            depends: vec!["network".to_string()],
            timeout: 60,
            out_put_chan: OutputChannel::Stderr,
            create_time: Some(created),
            labels: [("role".to_string(), "compute".to_string())].into_iter().collect(),
        };

        let mut task = Task::new("check", vec![NodeId::new("a"), NodeId::new("b")]);
        task.temp_id = Some(temp.id.clone());
        task.temp = Some(temp);
        task.timer = "@every 30m".to_string();
        task.time_out = 120;
        task.retry = 2;
        task.interval = 5;
        task.create_time = Some(created);
        task.start_time = Some(created + Duration::seconds(1));
        task.event_id = "evt-1".to_string();
        task.result_path = "/var/results/check".to_string();
        task.is_once = true;
        task.status.insert(NodeId::new("a"), TaskStatus {
            status: Status::Complete,
            start_time: Some(created + Duration::seconds(2)),
            end_time: Some(created + Duration::seconds(9)),
            take_time: 7,
            comple_status: "success".to_string(),
            shell_code: 0,
        });
        task.status.insert(NodeId::new("b"), TaskStatus::new(Status::Exec));
        task.attempts.insert(NodeId::new("b"), 2);
        task.history.push(StatusAttempt {
            node_id: NodeId::new("b"),
            attempt: 1,
            status: TaskStatus { status: Status::Timeout, ..Default::default() },
        });
        task.out_put.push(parse_task_output(r#"{
            "node_id": "a",
            "global": {"k": "v"},
            "inner": {"x": "1"},
            "type": "check",
            "status": [{"name": "disk", "condition_type": "Ready", "condition_status": "True"}]
        }"#).unwrap());
        task
    }

    #[test]
    fn task_round_trips() {
        let task = full_task();
        let body = encode(&task).unwrap();
        let back: Task = decode(&body).unwrap();
        assert_eq!(back, task);
    }

    #[test]
    fn group_round_trips() {
        let mut group = TaskGroup::new("rollout", vec![full_task()]);
        group.refresh_status();
        let back: TaskGroup = decode(&encode_pretty(&group).unwrap()).unwrap();
        assert_eq!(back, group);
    }

    #[test]
    fn uses_wire_field_names() {
        let value: serde_json::Value = serde_json::from_str(&encode(&full_task()).unwrap()).unwrap();
        assert_eq!(value["time_out"], 120);
        assert_eq!(value["is_once"], true);
        assert_eq!(value["temp"]["out_put_chan"], "stderr");
        assert_eq!(value["status"]["a"]["comple_status"], "success");
        assert_eq!(value["status"]["a"]["shell_code"], 0);
        assert_eq!(value["out_put"][0]["type"], "check");
    }

    #[test]
    fn decode_reports_errors() {
        assert!(decode::<Task>("{\"name\": 5}").is_err());
    }
}
