use thiserror::Error;

use crate::ids::{GroupId, TaskId, TempId};
use crate::status::Status;


pub type Result<T> = std::result::Result<T, Error>;


#[derive(Debug, Error)]
pub enum Error {
    #[error("validation failed: {0}")]
    ValidationFailed(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("malformed output: {0}")]
    MalformedOutput(String),
    #[error("deadline exceeded for task {0}")]
    DeadlineExceeded(TaskId),
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: Status, to: Status },
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
    #[error("task group not found: {0}")]
    GroupNotFound(GroupId),
    #[error("task template not found: {0}")]
    TemplateNotFound(TempId),
    #[error("encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("dispatch failed: {0}")]
    Dispatch(String),
}
