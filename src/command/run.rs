use clap::Parser;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::client::Client;
use crate::codec;
use crate::command::{Cli, Command, Create, CreateCommand, Error, Report, ReportCommand, Target};
use crate::config::EngineConfig;
use crate::groups::TaskGroup;
use crate::server::Server;
use crate::status::TaskStatus;
use crate::tasks::Task;
use crate::templates::TaskTemp;


pub async fn run() -> Result<(), Error> {
    let args = Cli::parse();
    init_tracing(args.verbose);

    let client = Client::new(args.server.clone());
    match args.command {
        Command::Create(Create { command }) => match command {
            CreateCommand::Template { filename } => {
                let temp: TaskTemp = read_file(&filename)?;
                print(&client.create_template(&temp).await?)?;
            }
            CreateCommand::Task { filename } => {
                let task: Task = read_file(&filename)?;
                print(&client.create_task(&task).await?)?;
            }
            CreateCommand::Group { filename } => {
                let group: TaskGroup = read_file(&filename)?;
                print(&client.create_group(&group).await?)?;
            }
        }
        Command::Delete(target) => delete(&client, &target).await?,
        Command::Dispatch(target) => dispatch(&client, &target).await?,
        Command::Get(target) => get(&client, &target).await?,
        Command::Poll { node } => {
            print(&client.poll(&node).await?)?;
        }
        Command::Report(Report { command }) => match command {
            ReportCommand::Status { task, node, status, shell_code, comple_status } => {
                let report = TaskStatus {
                    status,
                    shell_code,
                    comple_status,
                    ..Default::default()
                };
                print(&client.report_status(&task, &node, &report).await?)?;
            }
            ReportCommand::Output { task, node, filename } => {
                let body = std::fs::read_to_string(filename)?;
                print(&client.report_output(&task, &node, body).await?)?;
            }
        }
        Command::Serve { bind, port, config } => {
            serve(bind, port, config.as_deref()).await?;
        }
        Command::Trigger { id } => {
            print(&client.trigger_task(&id).await?)?;
        }
    }
    Ok(())
}


fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}


fn read_file<T: DeserializeOwned>(filename: &Path) -> Result<T, Error> {
    Ok(serde_yaml::from_str(&std::fs::read_to_string(filename)?)?)
}


fn print<T: Serialize>(value: &T) -> Result<(), Error> {
    println!("{}", codec::encode_pretty(value)?);
    Ok(())
}


async fn delete(client: &Client, target: &Target) -> Result<(), Error> {
    if target.group {
        print(&client.delete_group(&target.group_id()).await?)
    } else {
        print(&client.delete_task(&target.task_id()).await?)
    }
}


async fn dispatch(client: &Client, target: &Target) -> Result<(), Error> {
    if target.group {
        print(&client.dispatch_group(&target.group_id()).await?)
    } else {
        print(&client.dispatch_task(&target.task_id()).await?)
    }
}


async fn get(client: &Client, target: &Target) -> Result<(), Error> {
    if target.group {
        print(&client.get_group(&target.group_id()).await?)
    } else {
        print(&client.get_task(&target.task_id()).await?)
    }
}


async fn serve(
    bind: Option<String>,
    port: Option<u16>,
    config: Option<&Path>,
) -> Result<(), Error> {
    let config = match config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let addr = format!(
        "{}:{}",
        bind.unwrap_or_else(|| config.bind.clone()),
        port.unwrap_or(config.port)
    );

    let server = Arc::new(Server::new(config));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");
    crate::server::serve(server, listener).await?;
    Ok(())
}
