// CLI binary: exits with a message on unrecoverable errors.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use cutline::adapter::ToolExecutionAdapter;
use cutline::demo::{create_demo_project, demo_registry};
use cutline::describe;
use cutline::model::{ExecutionContext, PlannedCommand};
use cutline::planner::plan_command;
use cutline::project::{load_project, save_project, ProjectStore, ProjectView};
use cutline::registry::catalog::{help_text, to_json_schema};
use cutline::runner::PlanRunner;
use cutline::settings::{self, OrchestratorSettings};

// ── CLI argument parsing ─────────────────────────────────────────

#[derive(Parser)]
#[command(name = "cutline-cli", about = "Cutline command orchestration CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config directory override (settings and audit logs)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Project JSON file. The built-in demo project is used when absent.
    #[arg(long, global = true)]
    project: Option<PathBuf>,

    /// Output raw JSON instead of formatted text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan a natural-language command without executing it
    Plan { command: String },
    /// Plan and execute a command against the project
    Run {
        command: String,
        /// Approve plans that require confirmation
        #[arg(long)]
        approve: bool,
        /// Write the edited project back to --project
        #[arg(long)]
        save: bool,
    },
    /// List tools, or show one category or tool
    Tools {
        topic: Option<String>,
        /// Print the full catalog as JSON schema
        #[arg(long)]
        schema: bool,
    },
    /// Show or change orchestrator settings
    Settings {
        #[command(subcommand)]
        action: Option<SettingsAction>,
    },
    /// Describe the project context the planner sees
    Context,
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print current settings
    Show,
    /// Set a value, e.g. `set doom_loop_threshold 4`
    Set { key: String, value: String },
    /// Restore defaults
    Reset,
}

// ── Setup ────────────────────────────────────────────────────────

fn config_dir(cli: &Cli) -> PathBuf {
    cli.config_dir
        .clone()
        .or_else(cutline::paths::default_config_dir)
        .unwrap_or_else(|| PathBuf::from(".cutline"))
}

/// `RUST_LOG` wins; otherwise the configured level.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn open_store(project: Option<&Path>) -> Arc<ProjectStore> {
    let project = match project {
        Some(path) if path.exists() => load_project(path).unwrap_or_else(|e| {
            eprintln!("Error: failed to load project {}: {e}", path.display());
            process::exit(1);
        }),
        _ => create_demo_project(),
    };
    Arc::new(ProjectStore::new(project))
}

fn build_adapter(store: &Arc<ProjectStore>, settings: &OrchestratorSettings, config_dir: &Path) -> ToolExecutionAdapter {
    let registry = demo_registry(store).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        process::exit(1);
    });
    let adapter = ToolExecutionAdapter::new(Arc::new(registry), store.clone());
    if settings.audit_enabled {
        adapter.with_audit_dir(config_dir)
    } else {
        adapter
    }
}

fn print<T: Serialize>(value: &T, text: impl FnOnce() -> String, raw: bool) {
    if raw {
        println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
    } else {
        println!("{}", text());
    }
}

fn plan_or_exit(
    command: &str,
    store: &ProjectStore,
    adapter: &ToolExecutionAdapter,
    settings: &OrchestratorSettings,
) -> PlannedCommand {
    let context = store.snapshot().context_snapshot();
    plan_command(command, &context, adapter, settings.planner_options()).unwrap_or_else(|| {
        eprintln!("No plan: the command was not recognized for this project.");
        eprintln!("Try `cutline-cli context` to see tracks, clips and assets.");
        process::exit(2);
    })
}

// ── Commands ─────────────────────────────────────────────────────

async fn run_command(
    command: &str,
    approve: bool,
    save: bool,
    cli: &Cli,
    settings: &OrchestratorSettings,
    config_dir: &Path,
) {
    let store = open_store(cli.project.as_deref());
    let adapter = build_adapter(&store, settings, config_dir);
    let planned = plan_or_exit(command, &store, &adapter, settings);
    if !cli.json {
        println!("{}\n", describe::describe_planned(&planned));
    }

    let snapshot = store.snapshot();
    let mut ctx = ExecutionContext::new(snapshot.project_id.clone(), "cli").expecting_version(snapshot.version);
    if let Some(sequence) = snapshot.active_sequence_id.clone() {
        ctx = ctx.with_sequence(sequence);
    }
    let detector = settings.doom_loop_detector().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("Fix it with `cutline-cli settings set doom_loop_threshold <n>`.");
        process::exit(1);
    });
    let mut runner = PlanRunner::new(&adapter, ctx, detector);
    let report = runner.run(planned.plan(), approve).await;
    print(&report, || describe::describe_run(&report), cli.json);

    if save && report.final_state_version != snapshot.version {
        match cli.project.as_deref() {
            Some(path) => {
                if let Err(e) = save_project(&store.project(), path) {
                    eprintln!("Error: failed to save project: {e}");
                    process::exit(1);
                }
            }
            None => eprintln!("--save needs --project; the demo project was not written"),
        }
    }
    if !report.completed() {
        process::exit(1);
    }
}

fn settings_command(action: Option<&SettingsAction>, mut current: OrchestratorSettings, config_dir: &Path, raw: bool) {
    match action {
        None | Some(SettingsAction::Show) => {}
        Some(SettingsAction::Set { key, value }) => {
            if let Err(e) = current.set(key, value) {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        }
        Some(SettingsAction::Reset) => current = OrchestratorSettings::default(),
    }
    if matches!(action, Some(SettingsAction::Set { .. } | SettingsAction::Reset)) {
        if let Err(e) = settings::save_settings(config_dir, &current) {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
    print(
        &current,
        || serde_json::to_string_pretty(&current).unwrap_or_default(),
        raw,
    );
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config_dir = config_dir(&cli);
    let settings = settings::load_settings(&config_dir).unwrap_or_default();
    init_tracing(&settings.log_level);

    match &cli.command {
        Commands::Plan { command } => {
            let store = open_store(cli.project.as_deref());
            let adapter = build_adapter(&store, &settings, &config_dir);
            let planned = plan_or_exit(command, &store, &adapter, &settings);
            print(&planned, || describe::describe_planned(&planned), cli.json);
        }
        Commands::Run {
            command,
            approve,
            save,
        } => run_command(command, *approve, *save, &cli, &settings, &config_dir).await,
        Commands::Tools { topic, schema } => {
            let store = open_store(cli.project.as_deref());
            let adapter = build_adapter(&store, &settings, &config_dir);
            if *schema {
                let catalog = to_json_schema(adapter.registry());
                println!("{}", serde_json::to_string_pretty(&catalog).unwrap_or_default());
            } else {
                println!("{}", help_text(adapter.registry(), topic.as_deref()));
            }
        }
        Commands::Settings { action } => {
            settings_command(action.as_ref(), settings.clone(), &config_dir, cli.json);
        }
        Commands::Context => {
            let store = open_store(cli.project.as_deref());
            let context = store.snapshot().context_snapshot();
            print(&context, || describe::describe_context(&context), cli.json);
        }
    }
}
