use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use thiserror::Error;

use crate::ids::{GroupId, NodeId, TaskId};
use crate::status::Status;

mod run;

pub use run::run;


#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Client(#[from] crate::client::Error),
    #[error(transparent)]
    Engine(#[from] crate::error::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}


#[derive(Debug, Parser)]
#[command(name = "nodetask", about = "Fan tasks out to nodes and track their lifecycle")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,
    /// Base URL of the server, for client commands.
    #[arg(long, global = true, default_value = "http://localhost:3000")]
    pub server: String,
    #[command(subcommand)]
    pub command: Command,
}


#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a template, task or group from a YAML or JSON file.
    Create(Create),
    /// Delete a task, or a group with its tasks.
    Delete(Target),
    /// Dispatch a task, or every task of a group.
    Dispatch(Target),
    /// Show a task, or a group with its derived status.
    Get(Target),
    /// Drain the tasks queued for a node.
    Poll { node: NodeId },
    /// Report node progress, as a node agent would.
    Report(Report),
    /// Run the engine behind an HTTP server.
    Serve {
        #[arg(long)]
        bind: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        /// Engine configuration file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Fire the timer trigger of a task.
    Trigger { id: TaskId },
}


#[derive(Debug, Args)]
pub struct Create {
    #[command(subcommand)]
    pub command: CreateCommand,
}


#[derive(Debug, Subcommand)]
pub enum CreateCommand {
    Template { filename: PathBuf },
    Task { filename: PathBuf },
    Group { filename: PathBuf },
}


#[derive(Debug, Args)]
pub struct Target {
    pub id: String,
    /// Treat the id as a group id.
    #[arg(long)]
    pub group: bool,
}

impl Target {
    pub fn task_id(&self) -> TaskId {
        TaskId::new(self.id.as_str())
    }

    pub fn group_id(&self) -> GroupId {
        GroupId::new(self.id.as_str())
    }
}


#[derive(Debug, Args)]
pub struct Report {
    #[command(subcommand)]
    pub command: ReportCommand,
}


#[derive(Debug, Subcommand)]
pub enum ReportCommand {
    Status {
        task: TaskId,
        node: NodeId,
        status: Status,
        #[arg(long, default_value_t = 0)]
        shell_code: i32,
        #[arg(long, default_value = "")]
        comple_status: String,
    },
    Output {
        task: TaskId,
        node: NodeId,
        filename: PathBuf,
    },
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_status_report() {
        let cli = Cli::try_parse_from([
            "nodetask", "report", "status", "task-1", "node-a", "complete", "--shell-code", "3",
        ])
        .unwrap();
        match cli.command {
            Command::Report(Report {
                command: ReportCommand::Status { task, node, status, shell_code, comple_status },
            }) => {
                assert_eq!(task, TaskId::new("task-1"));
                assert_eq!(node, NodeId::new("node-a"));
                assert_eq!(status, Status::Complete);
                assert_eq!(shell_code, 3);
                assert!(comple_status.is_empty());
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert_eq!(cli.server, "http://localhost:3000");
    }

    #[test]
    fn rejects_unknown_status() {
        assert!(Cli::try_parse_from(["nodetask", "report", "status", "t", "n", "done"]).is_err());
    }

    #[test]
    fn group_flag_selects_group_target() {
        let cli = Cli::try_parse_from(["nodetask", "-v", "delete", "g-1", "--group"]).unwrap();
        assert!(cli.verbose);
        match cli.command {
            Command::Delete(target) => {
                assert!(target.group);
                assert_eq!(target.group_id(), GroupId::new("g-1"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
