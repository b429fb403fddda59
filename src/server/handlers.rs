use axum::{extract::{Path, State}, http::StatusCode, Json};
use std::sync::Arc;

use crate::groups::TaskGroup;
use crate::ids::{GroupId, NodeId, TaskId, TempId};
use crate::server::{Server, ServerError, Triggered};
use crate::status::TaskStatus;
use crate::tasks::Task;
use crate::templates::TaskTemp;


pub async fn create_template(
    State(server): State<Arc<Server>>,
    body: Json<TaskTemp>
) -> Result<(StatusCode, Json<TaskTemp>), ServerError> {
    let temp = server.engine.create_template(body.0).await?;
    Ok((StatusCode::CREATED, Json(temp)))
}


pub async fn list_templates(State(server): State<Arc<Server>>) -> Json<Vec<TaskTemp>> {
    Json(server.engine.list_templates().await)
}


pub async fn get_template(
    State(server): State<Arc<Server>>,
    Path(temp_id): Path<TempId>
) -> Result<Json<TaskTemp>, ServerError> {
    Ok(Json(server.engine.get_template(&temp_id).await?))
}


pub async fn delete_template(
    State(server): State<Arc<Server>>,
    Path(temp_id): Path<TempId>
) -> Result<Json<TaskTemp>, ServerError> {
    Ok(Json(server.engine.delete_template(&temp_id).await?))
}


pub async fn create_task(
    State(server): State<Arc<Server>>,
    body: Json<Task>
) -> Result<(StatusCode, Json<Task>), ServerError> {
    let task = server.engine.create_task(body.0).await?;
    Ok((StatusCode::CREATED, Json(task)))
}


pub async fn list_tasks(State(server): State<Arc<Server>>) -> Json<Vec<Task>> {
    Json(server.engine.list_tasks().await)
}


pub async fn get_task(
    State(server): State<Arc<Server>>,
    Path(task_id): Path<TaskId>
) -> Result<Json<Task>, ServerError> {
    Ok(Json(server.engine.get_task(&task_id).await?))
}


pub async fn delete_task(
    State(server): State<Arc<Server>>,
    Path(task_id): Path<TaskId>
) -> Result<Json<Task>, ServerError> {
    Ok(Json(server.engine.delete_task(&task_id).await?))
}


pub async fn dispatch_task(
    State(server): State<Arc<Server>>,
    Path(task_id): Path<TaskId>
) -> Result<Json<Task>, ServerError> {
    Ok(Json(server.engine.dispatch_task(&task_id).await?))
}


pub async fn trigger_task(
    State(server): State<Arc<Server>>,
    Path(task_id): Path<TaskId>
) -> Result<Json<Triggered>, ServerError> {
    let triggered = server.engine.trigger(&task_id).await?;
    Ok(Json(Triggered { id: task_id, triggered }))
}


pub async fn report_status(
    State(server): State<Arc<Server>>,
    Path((task_id, node_id)): Path<(TaskId, NodeId)>,
    body: Json<TaskStatus>
) -> Result<Json<Task>, ServerError> {
    Ok(Json(server.engine.apply_status(&task_id, &node_id, body.0).await?))
}


/// Raw body, so malformed payloads surface as `MalformedOutput`.
pub async fn report_output(
    State(server): State<Arc<Server>>,
    Path((task_id, node_id)): Path<(TaskId, NodeId)>,
    body: String
) -> Result<Json<Task>, ServerError> {
    Ok(Json(server.engine.apply_output(&task_id, &node_id, &body).await?))
}


pub async fn create_group(
    State(server): State<Arc<Server>>,
    body: Json<TaskGroup>
) -> Result<(StatusCode, Json<TaskGroup>), ServerError> {
    let group = server.engine.create_group(body.0).await?;
    Ok((StatusCode::CREATED, Json(group)))
}


pub async fn list_groups(State(server): State<Arc<Server>>) -> Json<Vec<TaskGroup>> {
    Json(server.engine.list_groups().await)
}


pub async fn get_group(
    State(server): State<Arc<Server>>,
    Path(group_id): Path<GroupId>
) -> Result<Json<TaskGroup>, ServerError> {
    Ok(Json(server.engine.get_group(&group_id).await?))
}


pub async fn delete_group(
    State(server): State<Arc<Server>>,
    Path(group_id): Path<GroupId>
) -> Result<Json<TaskGroup>, ServerError> {
    Ok(Json(server.engine.delete_group(&group_id).await?))
}


pub async fn dispatch_group(
    State(server): State<Arc<Server>>,
    Path(group_id): Path<GroupId>
) -> Result<Json<TaskGroup>, ServerError> {
    Ok(Json(server.engine.dispatch_group(&group_id).await?))
}


pub async fn poll_node(
    State(server): State<Arc<Server>>,
    Path(node_id): Path<NodeId>
) -> Json<Vec<Task>> {
    Json(server.queue.poll(&node_id).await)
}
