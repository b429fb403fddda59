use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::groups::TaskGroup;
use crate::ids::{GroupId, NodeId, TaskId, TempId};
use crate::server::Triggered;
use crate::status::TaskStatus;
use crate::tasks::Task;
use crate::templates::TaskTemp;


#[derive(Debug, Error)]
pub enum Error {
    #[error("request failed: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("server returned {status}: {message}")]
    Status { status: StatusCode, message: String },
}


/// Typed access to a running `nodetask serve`.
#[derive(Clone, Debug)]
pub struct Client {
    reqwest: reqwest::Client,
    server: String,
}

impl Client {
    pub fn new(server: String) -> Self {
        Self::with_reqwest(reqwest::Client::new(), server)
    }

    pub fn with_reqwest(reqwest: reqwest::Client, server: String) -> Self {
        Self {
            reqwest,
            server: server.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.server, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, Error> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Status { status, message });
        }
        Ok(response.json().await?)
    }

    pub async fn create_template(&self, temp: &TaskTemp) -> Result<TaskTemp, Error> {
        self.send(self.reqwest.post(self.url("/templates")).json(temp)).await
    }

    pub async fn get_template(&self, id: &TempId) -> Result<TaskTemp, Error> {
        self.send(self.reqwest.get(self.url(&format!("/templates/{}", id)))).await
    }

    pub async fn create_task(&self, task: &Task) -> Result<Task, Error> {
        self.send(self.reqwest.post(self.url("/tasks")).json(task)).await
    }

    pub async fn get_task(&self, id: &TaskId) -> Result<Task, Error> {
        self.send(self.reqwest.get(self.url(&format!("/tasks/{}", id)))).await
    }

    pub async fn list_tasks(&self) -> Result<Vec<Task>, Error> {
        self.send(self.reqwest.get(self.url("/tasks"))).await
    }

    pub async fn delete_task(&self, id: &TaskId) -> Result<Task, Error> {
        self.send(self.reqwest.delete(self.url(&format!("/tasks/{}", id)))).await
    }

    pub async fn dispatch_task(&self, id: &TaskId) -> Result<Task, Error> {
        self.send(self.reqwest.post(self.url(&format!("/tasks/{}/dispatch", id)))).await
    }

    pub async fn trigger_task(&self, id: &TaskId) -> Result<Triggered, Error> {
        self.send(self.reqwest.post(self.url(&format!("/tasks/{}/trigger", id)))).await
    }

    pub async fn report_status(
        &self,
        id: &TaskId,
        node: &NodeId,
        status: &TaskStatus,
    ) -> Result<Task, Error> {
        let url = self.url(&format!("/tasks/{}/nodes/{}/status", id, node));
        self.send(self.reqwest.post(url).json(status)).await
    }

    pub async fn report_output(&self, id: &TaskId, node: &NodeId, body: String) -> Result<Task, Error> {
        let url = self.url(&format!("/tasks/{}/nodes/{}/output", id, node));
        self.send(self.reqwest.post(url).body(body)).await
    }

    pub async fn create_group(&self, group: &TaskGroup) -> Result<TaskGroup, Error> {
        self.send(self.reqwest.post(self.url("/groups")).json(group)).await
    }

    pub async fn get_group(&self, id: &GroupId) -> Result<TaskGroup, Error> {
        self.send(self.reqwest.get(self.url(&format!("/groups/{}", id)))).await
    }

    pub async fn delete_group(&self, id: &GroupId) -> Result<TaskGroup, Error> {
        self.send(self.reqwest.delete(self.url(&format!("/groups/{}", id)))).await
    }

    pub async fn dispatch_group(&self, id: &GroupId) -> Result<TaskGroup, Error> {
        self.send(self.reqwest.post(self.url(&format!("/groups/{}/dispatch", id)))).await
    }

    pub async fn poll(&self, node: &NodeId) -> Result<Vec<Task>, Error> {
        self.send(self.reqwest.get(self.url(&format!("/nodes/{}/tasks", node)))).await
    }
}
