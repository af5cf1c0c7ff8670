// SPDX-License-Identifier: MIT

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use kinetic_orchestrator::kinetic::definition::{
    Builder, DefinitionLoader, OfflineModelProvider, Orchestration,
};
use kinetic_orchestrator::kinetic::orchestration::RunStatus;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run an orchestration definition
    Run {
        /// Path to the YAML definition
        #[arg(short, long)]
        file: String,

        /// Task text handed to the entry nodes
        #[arg(short, long)]
        input: String,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check a definition without running it
    Validate {
        /// Path to the YAML definition
        #[arg(short, long)]
        file: String,
    },
}

fn describe(orchestration: &Orchestration) -> String {
    match orchestration {
        Orchestration::Graph(s) => format!(
            "graph of {} nodes, order {}",
            s.graph().len(),
            s.graph().topological_order().join(" -> ")
        ),
        Orchestration::Workflow(s) => format!(
            "workflow of {} tasks, order {}",
            s.graph().len(),
            s.graph().topological_order().join(" -> ")
        ),
        Orchestration::Swarm(s) => format!("swarm of {}", s.members().join(", ")),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    match args.command {
        Commands::Run { file, input, json } => {
            let orchestration = Builder::new()
                .build_file(&file)
                .with_context(|| format!("failed to build {}", file))?;

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::warn!("Interrupted, cancelling run");
                    on_signal.cancel();
                }
            });

            log::info!("Running {}", describe(&orchestration));
            let result = orchestration.execute_with_cancel(input, cancel).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                match result.final_text() {
                    Some(text) => println!("{}", text),
                    None => println!("(no output)"),
                }
                eprintln!(
                    "status: {:?} | order: {} | {}ms",
                    result.status,
                    result.execution_order.join(" -> "),
                    result.total_elapsed_ms
                );
                if let Some(reason) = &result.terminated_by {
                    eprintln!("terminated by: {}", reason);
                }
            }

            if matches!(result.status, RunStatus::Failed | RunStatus::Cancelled) {
                std::process::exit(1);
            }
        }
        Commands::Validate { file } => {
            let def = DefinitionLoader::new()
                .load_file(&file)
                .with_context(|| format!("failed to load {}", file))?;
            let orchestration = Builder::with_provider(Arc::new(OfflineModelProvider))
                .build(&def)
                .with_context(|| format!("invalid definition {}", file))?;
            println!("{} '{}' is valid: {}", def.kind, def.name, describe(&orchestration));
        }
    }

    Ok(())
}
