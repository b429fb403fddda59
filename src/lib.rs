pub mod client;
pub mod codec;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod engine;
mod error;
pub mod groups;
pub mod ids;
pub mod output;
pub mod server;
pub mod status;
pub mod tasks;
pub mod templates;

pub use config::EngineConfig;
pub use dispatch::{Dispatcher, NodeQueue};
pub use engine::Engine;
pub use error::{Error, Result};
pub use groups::{TaskGroup, TaskGroupStatus};
pub use ids::{GroupId, NodeId, TaskId, TempId};
pub use output::{parse_task_output, OutputKind, TaskOutPut, TaskOutPutStatus};
pub use server::{serve, Server};
pub use status::{Status, TaskStatus};
pub use tasks::{StatusAttempt, Task};
pub use templates::{OutputChannel, Shell, TaskTemp};
