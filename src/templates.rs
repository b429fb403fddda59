use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::ids::TempId;


#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shell {
    #[serde(default)]
    pub cmd: Vec<String>,
}


/// Which stream of the node's script carries the result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputChannel {
    Stdout,
    Stderr,
}


/// Reusable execution definition a task can be materialized from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTemp {
    pub name: String,
    #[serde(default)]
    pub id: TempId,
    #[serde(default)]
    pub shell: Shell,
    #[serde(default)]
    pub envs: BTreeMap<String, String>,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub depends: Vec<String>,
    /// Seconds a node may spend on one execution.
    pub timeout: i64,
    pub out_put_chan: OutputChannel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl TaskTemp {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::ValidationFailed("template name is required".to_string()));
        }
        if !self.id.is_uuid() {
            return Err(Error::ValidationFailed(format!(
                "template id is not a uuid: {:?}", self.id.as_str()
            )));
        }
        if self.timeout <= 0 {
            return Err(Error::ValidationFailed(format!(
                "template {} timeout must be positive", self.id
            )));
        }
        Ok(())
    }
}
