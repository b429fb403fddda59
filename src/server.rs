use axum::http::StatusCode;
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::dispatch::NodeQueue;
use crate::engine::Engine;
use crate::error::Error;
use crate::ids::TaskId;

mod handlers;


pub struct Server {
    pub engine: Arc<Engine>,
    pub queue: Arc<NodeQueue>,
}

impl Server {
    /// Engine wired to an in-memory queue that node agents poll.
    pub fn new(config: EngineConfig) -> Self {
        let queue = Arc::new(NodeQueue::new());
        let engine = Arc::new(Engine::new(config, queue.clone()));
        Self { engine, queue }
    }
}


/// Outcome of a timer trigger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triggered {
    pub id: TaskId,
    pub triggered: bool,
}


#[derive(Debug)]
pub struct ServerError(pub Error);

impl From<Error> for ServerError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl axum::response::IntoResponse for ServerError {
    fn into_response(self) -> axum::http::Response<axum::body::Body> {
        let status = match self.0 {
            Error::TaskNotFound(_) | Error::GroupNotFound(_) | Error::TemplateNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Error::Conflict(_) | Error::InvalidTransition { .. } => StatusCode::CONFLICT,
            Error::ValidationFailed(_) | Error::MalformedOutput(_) => StatusCode::BAD_REQUEST,
            Error::DeadlineExceeded(_) => StatusCode::GONE,
            Error::Dispatch(_) => StatusCode::BAD_GATEWAY,
            Error::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.0.to_string()).into_response()
    }
}


pub fn router(server: Arc<Server>) -> axum::Router {
    axum::Router::new()
        .route("/templates", get(handlers::list_templates).post(handlers::create_template))
        .route(
            "/templates/:temp_id",
            get(handlers::get_template).delete(handlers::delete_template),
        )
        .route("/tasks", get(handlers::list_tasks).post(handlers::create_task))
        .route("/tasks/:task_id", get(handlers::get_task).delete(handlers::delete_task))
        .route("/tasks/:task_id/dispatch", post(handlers::dispatch_task))
        .route("/tasks/:task_id/trigger", post(handlers::trigger_task))
        .route("/tasks/:task_id/nodes/:node_id/status", post(handlers::report_status))
        .route("/tasks/:task_id/nodes/:node_id/output", post(handlers::report_output))
        .route("/groups", get(handlers::list_groups).post(handlers::create_group))
        .route("/groups/:group_id", get(handlers::get_group).delete(handlers::delete_group))
        .route("/groups/:group_id/dispatch", post(handlers::dispatch_group))
        .route("/nodes/:node_id/tasks", get(handlers::poll_node))
        .with_state(server)
}


pub async fn serve(
    server: Arc<Server>,
    listener: tokio::net::TcpListener
) -> Result<(), std::io::Error> {
    let sweeper = server.engine.spawn_sweeper();
    let app = router(server);
    let result = axum::serve(listener, app).await;
    sweeper.abort();
    result
}
