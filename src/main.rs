// src/main.rs
//
// =============================================================================
// NODEFLOW: COMMANDER & ENTRY POINT
// =============================================================================
//
// The CLI surface around the engine: load a workflow, validate it, run it
// with events streamed to stdout, or manage the plugin lifecycle.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

mod builtin;
mod driver;
mod dsl;
mod error;
mod events;
mod exec_call;
mod fanin;
mod logging;
mod loops;
mod model;
mod plugins;
mod registry;
mod scheduler;
mod structural;
mod validator;

use crate::events::{EventSink, StdoutSink};
use crate::plugins::PluginEntryPoint;
use crate::registry::Registry;
use crate::validator::Level;

// ============================================================================
// 1. CLI DEFINITION
// ============================================================================

#[derive(Parser)]
#[command(name = "nodeflow", version, about = "Dataflow workflow engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and statically validate a workflow file; print issues.
    Validate {
        /// Path to a workflow YAML/JSON file.
        file: String,
    },

    /// Load, validate, and execute a workflow, streaming events to stdout.
    Run {
        /// Path to a workflow YAML/JSON file.
        file: String,

        /// Directory to discover plugins from (optional).
        #[arg(long)]
        plugins_root: Option<PathBuf>,

        /// Node id to pause at (repeatable), emitting a `breakpoint` event
        /// with its summarized inputs without halting execution.
        #[arg(long = "breakpoint")]
        breakpoints: Vec<String>,
    },

    /// Manage the plugin lifecycle.
    Plugins {
        #[command(subcommand)]
        action: PluginAction,

        /// Directory the plugins live under.
        #[arg(long, default_value = "plugins")]
        plugins_root: PathBuf,
    },
}

#[derive(Subcommand)]
enum PluginAction {
    /// List discovered plugins and the node types each contributed.
    List,
    /// Activate a plugin by id ("<project>/<plugin>").
    Activate { id: String },
    /// Deactivate a plugin by id.
    Deactivate { id: String },
    /// Delete an inactive plugin by id.
    Delete { id: String },
}

// ============================================================================
// 2. ENTRY POINT
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Validate { file } => run_validate(file),
        Commands::Run {
            file,
            plugins_root,
            breakpoints,
        } => run_workflow(file, plugins_root, breakpoints).await,
        Commands::Plugins {
            action,
            plugins_root,
        } => run_plugins(action, plugins_root),
    }
}

fn builtin_registry() -> Registry {
    let registry = Registry::new();
    struct RegistrarHandle<'a>(&'a Registry);
    impl plugins::PluginRegistrar for RegistrarHandle<'_> {
        fn register_node(
            &self,
            spec: model::NodeSpec,
            executor: Option<Arc<dyn registry::NodeExecutor>>,
        ) {
            self.0.register(spec, executor);
        }
    }
    builtin::register(&RegistrarHandle(&registry));
    registry
}

/// Entry points for plugin directories discovered at the default root. Real
/// deployments extend this table per §4.C's Rust-native registration
/// convention; the CLI ships only the built-in pack out of the box.
fn entry_points() -> Vec<PluginEntryPoint> {
    vec![]
}

fn run_validate(file: String) -> Result<()> {
    let workflow = dsl::load(&file).with_context(|| format!("loading workflow {file}"))?;
    let registry = builtin_registry();
    let issues = validator::validate(&workflow, &registry.snapshot());

    let mut has_error = false;
    for issue in &issues {
        let tag = match issue.level {
            Level::Error => {
                has_error = true;
                "ERROR"
            }
            Level::Warning => "WARN",
            Level::Info => "INFO",
        };
        match &issue.node_id {
            Some(node_id) => println!("[{tag}] {node_id}: {}", issue.message),
            None => println!("[{tag}] {}", issue.message),
        }
    }
    if issues.is_empty() {
        println!("no issues found");
    }

    if has_error {
        anyhow::bail!("validation found one or more errors");
    }
    Ok(())
}

async fn run_workflow(
    file: String,
    plugins_root: Option<PathBuf>,
    breakpoints: Vec<String>,
) -> Result<()> {
    let workflow = dsl::load(&file).with_context(|| format!("loading workflow {file}"))?;
    let registry = builtin_registry();
    if let Some(root) = &plugins_root {
        plugins::discovery::discover(root, &registry, &entry_points());
    }

    let issues = validator::validate(&workflow, &registry.snapshot());
    if issues.iter().any(|i| i.level == Level::Error) {
        for issue in &issues {
            log::error!("{}", issue.message);
        }
        anyhow::bail!("refusing to run a workflow with validation errors");
    }

    let sink: Arc<dyn EventSink> = Arc::new(StdoutSink);
    let breakpoints: std::collections::HashSet<String> = breakpoints.into_iter().collect();
    driver::execute(&workflow, &registry.snapshot(), &sink, &breakpoints)
        .await
        .context("workflow execution failed")?;
    Ok(())
}

fn run_plugins(action: PluginAction, plugins_root: PathBuf) -> Result<()> {
    let registry = builtin_registry();
    let entries = entry_points();

    match action {
        PluginAction::List => {
            let reports = plugins::discovery::discover(&plugins_root, &registry, &entries);
            for report in reports {
                println!(
                    "{} [{:?}] types={:?}{}",
                    report.plugin_id,
                    report.state,
                    report.node_types,
                    report
                        .error
                        .map(|e| format!(" error={e}"))
                        .unwrap_or_default()
                );
            }
        }
        PluginAction::Activate { id } => {
            let report =
                plugins::lifecycle::activate(&plugins_root, &id, &registry, &entries, &[])?;
            println!("activated {} types={:?}", report.plugin_id, report.node_types);
        }
        PluginAction::Deactivate { id } => {
            plugins::lifecycle::deactivate(&plugins_root, &id, &registry, &entries, &[])?;
            println!("deactivated {id}");
        }
        PluginAction::Delete { id } => {
            plugins::lifecycle::delete(&plugins_root, &id, &[])?;
            println!("deleted {id}");
        }
    }
    Ok(())
}
