use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::ids::NodeId;


/// Classification of a node's output. Informational only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    Check,
    Install,
    Common,
}


#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutPutStatus {
    pub name: String,
    #[serde(default)]
    pub condition_type: String,
    #[serde(default)]
    pub condition_status: String,
}


/// Structured result of one node's execution of one task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutPut {
    pub node_id: NodeId,
    #[serde(default)]
    pub global: BTreeMap<String, String>,
    #[serde(default)]
    pub inner: BTreeMap<String, String>,
    #[serde(rename = "type")]
    pub kind: OutputKind,
    pub status: Vec<TaskOutPutStatus>,
}


/// Decode a raw payload reported by a node agent.
///
/// `node_id`, `type` and `status` must be present.
pub fn parse_task_output(body: &str) -> Result<TaskOutPut> {
    let output: TaskOutPut = serde_json::from_str(body)
        .map_err(|err| Error::MalformedOutput(err.to_string()))?;
    if output.node_id.is_empty() {
        return Err(Error::MalformedOutput("empty node_id".to_string()));
    }
    Ok(output)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_check_output() {
        let body = r#"{
            "node_id": "node-a",
            "global": {"DOCKER_VERSION": "24.0"},
            "type": "check",
            "status": [
                {"name": "docker", "condition_type": "Ready", "condition_status": "True"},
                {"name": "disk", "condition_type": "Space", "condition_status": "False"}
            ]
        }"#;
        let output = parse_task_output(body).unwrap();
        assert_eq!(output.node_id, NodeId::new("node-a"));
        assert_eq!(output.kind, OutputKind::Check);
        assert!(output.inner.is_empty());
        assert_eq!(output.global["DOCKER_VERSION"], "24.0");
        assert_eq!(output.status[1].name, "disk");
    }

    #[test]
    fn missing_structure_is_malformed() {
        for body in [
            "",
            "not json",
            r#"{"type": "check", "status": []}"#,
            r#"{"node_id": "n", "status": []}"#,
            r#"{"node_id": "n", "type": "check"}"#,
            r#"{"node_id": "n", "type": "reboot", "status": []}"#,
            r#"{"node_id": "", "type": "common", "status": []}"#,
        ] {
            let err = parse_task_output(body).unwrap_err();
            assert!(matches!(err, Error::MalformedOutput(_)), "accepted {:?}", body);
        }
    }
}
