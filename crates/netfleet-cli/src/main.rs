//! Netfleet - declarative network configuration reconciliation CLI
//!
//! The `netfleet` command renders fleet intent into device configs, diffs
//! them against live state and applies the difference through a staged,
//! failure-contained rollout.
//!
//! ## Commands
//!
//! - `list`: Show the devices declared in the fleet intent
//! - `generate`: Render configs from intent
//! - `diff`: Preview the delta between live and desired configs
//! - `deploy`: Staged rollout with backup-before-apply
//! - `backup`: Capture live configs into the backup store
//! - `rollback`: Restore a device to its most recent backup
//! - `validate`: Read-only pre/post health checks
//! - `plan`: Show the tiered deployment order
//! - `run`: Full pipeline (generate, validate, preview, deploy, validate)

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::Level;

use netfleet_core::{
    diff_configs, ConfigRenderer, ConfigStateParser, DeviceSession, DirSessionProvider,
    IntentRepository, OutputParser, SessionProvider,
};
use netfleet_deploy::{
    AutoGate, CheckStatus, ConfirmationGate, DeployPipeline, DeployStatus, DeploymentExecutor,
    DeploymentPlanner, PipelineOptions, StdinGate, ValidationPhase, ValidationRunner,
};
use netfleet_store::{ConfigStore, FsConfigStore};

#[derive(Parser)]
#[command(name = "netfleet")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Declarative network configuration reconciliation", long_about = None)]
struct Cli {
    /// Fleet intent file (YAML)
    #[arg(long, global = true, default_value = "fleet.yaml")]
    intent: PathBuf,

    /// Template directory overriding the built-in role templates
    #[arg(long, global = true)]
    templates: Option<PathBuf>,

    /// Config store root (generated configs and backups)
    #[arg(long, global = true, default_value = ".netfleet")]
    store: PathBuf,

    /// Lab device directory (each device's running config as a file)
    #[arg(long, global = true, default_value = "lab/devices")]
    lab: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the devices declared in the fleet intent
    List,

    /// Render configs from intent into the store
    Generate {
        /// Render a single device
        #[arg(short, long)]
        device: Option<String>,
    },

    /// Preview the delta between live and desired configs
    Diff {
        /// Diff a single device
        #[arg(short, long)]
        device: Option<String>,
    },

    /// Deploy generated configs in tier order, backup first
    Deploy {
        /// Deploy a single device
        #[arg(short, long)]
        device: Option<String>,

        /// Compute diffs and backups without applying anything
        #[arg(long)]
        dry_run: bool,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Capture live configs into the backup store
    Backup {
        /// Back up a single device
        #[arg(short, long)]
        device: Option<String>,
    },

    /// Restore a device to its most recent backup
    Rollback {
        /// Device to roll back
        device: String,
    },

    /// Run read-only health checks
    Validate {
        /// Pre-deployment check suite
        #[arg(long, conflicts_with = "post")]
        pre: bool,

        /// Post-deployment check suite
        #[arg(long)]
        post: bool,

        /// Validate a single device
        #[arg(short, long)]
        device: Option<String>,
    },

    /// Show the tiered deployment order
    Plan,

    /// Run the full pipeline and write report.json
    Run {
        /// Preview mode: no deploy phase mutation, no prompts
        #[arg(long)]
        dry_run: bool,

        /// Skip confirmation prompts
        #[arg(short, long)]
        yes: bool,
    },
}

/// Everything a command needs, wired once.
struct App {
    repo: Arc<IntentRepository>,
    renderer: Arc<ConfigRenderer>,
    store: Arc<dyn ConfigStore>,
    sessions: Arc<dyn SessionProvider>,
    parser: Arc<dyn OutputParser>,
    store_root: PathBuf,
}

impl App {
    fn build(cli: &Cli) -> Result<Self> {
        let repo = Arc::new(
            IntentRepository::load(&cli.intent)
                .with_context(|| format!("load intent from {:?}", cli.intent))?,
        );
        let renderer = Arc::new(match &cli.templates {
            Some(dir) => ConfigRenderer::from_dir(dir)
                .with_context(|| format!("load templates from {:?}", dir))?,
            None => ConfigRenderer::builtin(),
        });
        let store = Arc::new(
            FsConfigStore::new(&cli.store)
                .with_context(|| format!("open config store at {:?}", cli.store))?,
        );
        let sessions: Arc<dyn SessionProvider> = Arc::new(
            DirSessionProvider::new(&cli.lab)
                .with_context(|| format!("open lab device directory {:?}", cli.lab))?,
        );
        let parser: Arc<dyn OutputParser> = Arc::new(ConfigStateParser::new(sessions.clone()));
        Ok(Self {
            repo,
            renderer,
            store,
            sessions,
            parser,
            store_root: cli.store.clone(),
        })
    }

    fn targets(&self, device: &Option<String>) -> Vec<String> {
        match device {
            Some(name) => vec![name.clone()],
            None => self.repo.device_names(),
        }
    }

    fn executor(&self) -> DeploymentExecutor {
        DeploymentExecutor::new(self.sessions.clone(), self.store.clone())
    }

    fn gate(&self, yes: bool) -> Arc<dyn ConfirmationGate> {
        if yes {
            Arc::new(AutoGate::approve())
        } else {
            Arc::new(StdinGate)
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    netfleet_core::init_tracing(cli.json, level);

    let app = App::build(&cli)?;

    match &cli.command {
        Commands::List => cmd_list(&app),
        Commands::Generate { device } => cmd_generate(&app, device).await,
        Commands::Diff { device } => cmd_diff(&app, device).await,
        Commands::Deploy {
            device,
            dry_run,
            yes,
        } => cmd_deploy(&app, device, *dry_run, *yes).await,
        Commands::Backup { device } => cmd_backup(&app, device).await,
        Commands::Rollback { device } => cmd_rollback(&app, device).await,
        Commands::Validate { pre, post, device } => {
            let phase = if *post {
                ValidationPhase::Post
            } else if *pre {
                ValidationPhase::Pre
            } else {
                anyhow::bail!("specify --pre or --post");
            };
            cmd_validate(&app, phase, device).await
        }
        Commands::Plan => cmd_plan(&app),
        Commands::Run { dry_run, yes } => cmd_run(&app, *dry_run, *yes).await,
    }
}

fn cmd_list(app: &App) -> Result<ExitCode> {
    println!("{} device(s) in fleet intent:", app.repo.len());
    for device in app.repo.devices() {
        println!(
            "  {:24} tier {}  {}",
            device.name, device.tier, device.role
        );
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_generate(app: &App, device: &Option<String>) -> Result<ExitCode> {
    let mut failed = 0usize;
    let targets = app.targets(device);

    for name in &targets {
        let rendered = app
            .repo
            .get(name)
            .and_then(|intent| app.renderer.render(&app.repo, intent));
        match rendered {
            Ok(text) => {
                app.store.save_generated(name, &text).await?;
                println!("  generated {}", name);
            }
            Err(e) => {
                println!("  skipped {}: {}", name, e);
                failed += 1;
            }
        }
    }

    println!("{}/{} configs generated", targets.len() - failed, targets.len());
    Ok(exit_for(failed == 0))
}

async fn cmd_diff(app: &App, device: &Option<String>) -> Result<ExitCode> {
    for name in app.targets(device) {
        let Some(desired) = app.store.read_generated(&name).await? else {
            println!("--- {} ---\nno generated config (run 'netfleet generate')", name);
            continue;
        };
        match app.sessions.connect(&name).await {
            Ok(mut session) => {
                let live = session.capture().await?;
                let _ = session.disconnect().await;
                let diff = diff_configs(&live, &desired);
                println!("--- {} ({}) ---", name, diff.summary());
                print!("{}", diff.render());
            }
            Err(e) => println!("--- {} ---\ndiff unavailable: {}", name, e),
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_deploy(
    app: &App,
    device: &Option<String>,
    dry_run: bool,
    yes: bool,
) -> Result<ExitCode> {
    // A requested device missing from intent is a skip, not a fatal error;
    // partial fleets are a normal operating mode.
    let mut targets = Vec::new();
    for name in app.targets(device) {
        if app.repo.get(&name).is_ok() {
            targets.push(name);
        } else {
            println!("  skipped {} (not in fleet intent)", name);
        }
    }
    let plan = DeploymentPlanner::plan(&app.repo, Some(&targets))?;

    println!(
        "deploying {} device(s) in tier order{}",
        plan.len(),
        if dry_run { " (dry run)" } else { "" }
    );

    if !dry_run {
        let gate = app.gate(yes);
        let prompt = format!("apply configuration to {} device(s)?", plan.len());
        if !gate.confirm(&prompt).await {
            println!("deployment cancelled");
            return Ok(ExitCode::FAILURE);
        }
    }

    let executor = app.executor();
    let mut failed = 0usize;
    let mut halted = false;

    for name in &plan.order {
        if halted {
            println!("  skipped {} (halted after failure)", name);
            continue;
        }
        let Some(desired) = app.store.read_generated(name).await? else {
            println!("  skipped {} (no generated config)", name);
            continue;
        };
        let result = executor.apply(name, &desired, dry_run).await;
        match result.status {
            DeployStatus::Applied => {
                println!(
                    "  {} {} ({})",
                    if dry_run { "previewed" } else { "deployed" },
                    name,
                    result.diff.map(|d| d.summary()).unwrap_or_default()
                );
            }
            _ => {
                println!(
                    "  failed {}: {}",
                    name,
                    result.error.as_deref().unwrap_or("unknown")
                );
                failed += 1;
                if !dry_run {
                    println!("halting remaining devices to contain the failure");
                    halted = true;
                }
            }
        }
    }

    Ok(exit_for(failed == 0))
}

async fn cmd_backup(app: &App, device: &Option<String>) -> Result<ExitCode> {
    let executor = app.executor();
    let mut failed = 0usize;
    for name in app.targets(device) {
        match executor.backup_device(&name).await {
            Ok(record) => println!("  backed up {} -> {}", name, record.key),
            Err(e) => {
                println!("  failed {}: {}", name, e);
                failed += 1;
            }
        }
    }
    Ok(exit_for(failed == 0))
}

async fn cmd_rollback(app: &App, device: &str) -> Result<ExitCode> {
    let executor = app.executor();
    let result = executor.rollback(device).await;
    match result.status {
        DeployStatus::Applied => {
            println!("rolled back {} to {}", device, result.backup_key.as_deref().unwrap_or("?"));
            Ok(ExitCode::SUCCESS)
        }
        _ => {
            println!(
                "rollback failed for {}: {}",
                device,
                result.error.as_deref().unwrap_or("unknown")
            );
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn cmd_validate(
    app: &App,
    phase: ValidationPhase,
    device: &Option<String>,
) -> Result<ExitCode> {
    let runner = ValidationRunner::new(app.parser.clone(), app.repo.clone());
    let results = runner.run_checks(&app.targets(device), phase).await;

    let mut fail = 0usize;
    for result in &results {
        let mark = match result.status {
            CheckStatus::Pass => "pass",
            CheckStatus::Fail => "FAIL",
            CheckStatus::Skip => "skip",
        };
        if result.status == CheckStatus::Fail {
            fail += 1;
        }
        println!(
            "  {} [{}] {}: {}",
            mark,
            result.device,
            result.check.name(),
            result.detail
        );
    }
    println!(
        "{} validation: {} checks, {} failed",
        phase,
        results.len(),
        fail
    );
    Ok(exit_for(fail == 0))
}

fn cmd_plan(app: &App) -> Result<ExitCode> {
    let plan = DeploymentPlanner::plan(&app.repo, None)?;
    for (tier, members) in &plan.tiers {
        println!("tier {}:", tier);
        for name in members {
            println!("  {}", name);
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_run(app: &App, dry_run: bool, yes: bool) -> Result<ExitCode> {
    let gate = app.gate(yes);
    let pipeline = DeployPipeline::new(
        app.repo.clone(),
        app.renderer.clone(),
        app.store.clone(),
        app.sessions.clone(),
        app.parser.clone(),
        gate,
    );

    let report = pipeline
        .run(&PipelineOptions {
            dry_run,
            devices: None,
        })
        .await;

    let report_path = app.store_root.join("report.json");
    report.write_json(&report_path)?;

    print!("{}", report.render());
    println!("report written to {:?}", report_path);

    Ok(exit_for(report.success))
}

fn exit_for(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
