//! Delegator CLI entry point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use delegator::{Config, DurableStore, Orchestrator, TaskNode, ToolReply, ToolRequest};
use std::io::{BufRead, Read};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "delegator", version, about = "Task-graph delegation to named workers")]
struct Cli {
    /// Config file (YAML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the plan document
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Plan to operate on
    #[arg(long, short, global = true)]
    plan: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List saved plans
    List,
    /// Print a plan document as JSON
    Show { id: String },
    /// Delete a plan
    Delete { id: String },
    /// Create, update or reuse a named worker
    RegisterWorker {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        role: String,
    },
    /// Replace the task graph with JSON nodes from a file or stdin
    PlanGraph {
        /// JSON array of {task, dependencies, status}; stdin when omitted
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Dispatch a worker against a planned task
    Assign {
        #[arg(long)]
        worker: String,
        #[arg(long)]
        task: String,
        #[arg(long, default_value = "")]
        instructions: String,
    },
    /// List pending tasks whose dependencies are completed
    Ready,
    /// Read JSON tool requests from stdin, one per line
    Tool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir.clone() {
        config.data_dir = dir;
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_filter))
        .init();

    let store_path = config.store_path();
    log::debug!("Plan store: {}", store_path.display());
    let store = DurableStore::open(store_path);
    let plan_id = cli.plan.unwrap_or_else(|| config.default_plan.clone());

    match cli.command {
        Command::List => {
            for summary in store.list_plans().await? {
                println!(
                    "{}\t{}\t{} workers\t{} tasks",
                    summary.id, summary.title, summary.worker_count, summary.task_count
                );
            }
        }
        Command::Show { id } => match store.get_plan(&id).await? {
            Some(plan) => println!("{}", serde_json::to_string_pretty(&plan)?),
            None => anyhow::bail!("Plan '{}' not found", id),
        },
        Command::Delete { id } => {
            let orch = Orchestrator::new(store, id.clone());
            if !orch.delete_plan().await? {
                anyhow::bail!("Plan '{}' not found", id);
            }
            println!("Deleted plan '{}'", id);
        }
        Command::RegisterWorker { name, role } => {
            let orch = Orchestrator::new(store, plan_id);
            return Ok(print_reply(
                orch.dispatch(ToolRequest::RegisterWorker { name, role }).await?,
            ));
        }
        Command::PlanGraph { file } => {
            let raw = match file {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                None => {
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf)?;
                    buf
                }
            };
            let nodes: Vec<TaskNode> =
                serde_json::from_str(&raw).context("Task graph must be a JSON array of nodes")?;
            let orch = Orchestrator::new(store, plan_id);
            return Ok(print_reply(
                orch.dispatch(ToolRequest::PlanGraph { nodes }).await?,
            ));
        }
        Command::Assign {
            worker,
            task,
            instructions,
        } => {
            let orch = Orchestrator::new(store, plan_id);
            let request = ToolRequest::Assign {
                worker,
                task,
                instructions,
            };
            return Ok(print_reply(orch.dispatch(request).await?));
        }
        Command::Ready => {
            let orch = Orchestrator::new(store, plan_id);
            for node in orch.ready_tasks().await? {
                println!("{}", node.task);
            }
        }
        Command::Tool => {
            let orch = Orchestrator::new(store, plan_id);
            run_tool_loop(&orch).await?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Exit status for a rejected tool request
const REJECTED: u8 = 2;

/// Print a reply; rejections go to stderr and fail the command
fn print_reply(reply: ToolReply) -> ExitCode {
    if reply.ok {
        println!("{}", reply.message);
        ExitCode::SUCCESS
    } else {
        eprintln!("{}", reply.message);
        ExitCode::from(REJECTED)
    }
}

/// JSON-lines request loop. Each line gets exactly one reply line.
async fn run_tool_loop(orch: &Orchestrator) -> Result<()> {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let reply = match ToolRequest::parse(&line) {
            Ok(request) => orch.dispatch(request).await?,
            Err(e) => ToolReply::rejected("unknown", e.to_string()),
        };
        println!("{}", reply.to_json_line());
    }
    Ok(())
}
