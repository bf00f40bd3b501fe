//! Dockhand - Entry Point
//!
//! Deploys Compose workloads from Git repositories. `dockhand serve` runs the
//! HTTP API and auto-deploy poller; every other subcommand operates on the
//! local state directly.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing::{error, info};

use dockhand::app::context::AppContext;
use dockhand::app::options::AppOptions;
use dockhand::app::run::run;
use dockhand::compose::{ExecMode, LogsOptions, StackState};
use dockhand::credentials::AuthDescriptor;
use dockhand::errors::DockhandError;
use dockhand::logs::{init_logging, LogLevel, LogOptions};
use dockhand::models::deployment::DeploymentStatus;
use dockhand::models::workload::{CreateWorkload, UpdateWorkload, Workload, WorkloadStatus};
use dockhand::storage::layout::StorageLayout;
use dockhand::storage::settings::Settings;
use dockhand::utils::version_info;

#[derive(Debug, Parser)]
#[command(name = "dockhand", version, about = "Deploy Compose workloads from Git repositories")]
struct Cli {
    /// State directory (defaults to $DOCKHAND_HOME or ~/.dockhand)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    /// Override the configured log level
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP API and auto-deploy poller
    Serve {
        /// Bind address host
        #[arg(long)]
        host: Option<String>,

        /// Bind port
        #[arg(long)]
        port: Option<u16>,

        /// Disable the auto-deploy poller
        #[arg(long)]
        no_poller: bool,
    },
    /// List workloads
    List,
    /// Show one workload
    Show { id: String },
    /// Clone a repository and register a workload
    Create(CreateArgs),
    /// Change workload settings
    Update(UpdateArgs),
    /// Stop a workload and forget it
    Remove { id: String },
    /// Pull and (re)deploy a workload
    Deploy {
        id: String,

        /// Deploy the working tree as it is
        #[arg(long)]
        no_pull: bool,
    },
    /// Stop and remove a workload's containers
    Stop { id: String },
    /// Print container logs
    Logs {
        id: String,

        #[arg(short, long)]
        follow: bool,

        #[arg(long)]
        tail: Option<u32>,

        #[arg(short, long)]
        timestamps: bool,

        /// Restrict to these services
        services: Vec<String>,
    },
    /// Print the resolved Compose configuration
    Config { id: String },
    /// Show container status
    Status { id: String },
    /// List past deployments, newest first
    Deployments { id: String },
    /// Print version information
    Version,
}

#[derive(Debug, Args)]
struct AuthArgs {
    /// HTTP username
    #[arg(long, requires = "token")]
    username: Option<String>,

    /// HTTP token or password
    #[arg(long, requires = "username")]
    token: Option<String>,

    /// Path to an SSH private key
    #[arg(long, conflicts_with = "token")]
    ssh_key: Option<PathBuf>,

    /// SSH user (defaults to git)
    #[arg(long, requires = "ssh_key")]
    ssh_user: Option<String>,
}

impl AuthArgs {
    async fn descriptor(&self) -> Result<Option<AuthDescriptor>, DockhandError> {
        if let (Some(username), Some(token)) = (&self.username, &self.token) {
            return Ok(Some(AuthDescriptor::http(username.clone(), token.clone())));
        }
        if let Some(path) = &self.ssh_key {
            let key = tokio::fs::read_to_string(path).await.map_err(|e| {
                DockhandError::ValidationError(format!(
                    "Failed to read SSH key {}: {}",
                    path.display(),
                    e
                ))
            })?;
            return Ok(Some(AuthDescriptor::ssh(key, self.ssh_user.clone())));
        }
        Ok(None)
    }
}

#[derive(Debug, Args)]
struct CreateArgs {
    #[arg(long)]
    name: String,

    #[arg(long)]
    repo: String,

    /// Defaults to the repository's default branch
    #[arg(long)]
    branch: Option<String>,

    /// Compose file relative to the repository root; repeat to merge several
    #[arg(short = 'f', long = "compose-file", required = true)]
    compose_files: Vec<String>,

    /// KEY=VALUE passed to the runtime; repeatable
    #[arg(short, long = "env")]
    environment: Vec<String>,

    #[arg(long)]
    auto_deploy: bool,

    #[command(flatten)]
    auth: AuthArgs,
}

#[derive(Debug, Args)]
struct UpdateArgs {
    id: String,

    #[arg(long)]
    name: Option<String>,

    #[arg(long)]
    branch: Option<String>,

    #[arg(short = 'f', long = "compose-file")]
    compose_files: Vec<String>,

    #[arg(short, long = "env")]
    environment: Vec<String>,

    #[arg(long)]
    auto_deploy: Option<bool>,

    /// Forget stored credentials
    #[arg(long, conflicts_with_all = ["username", "ssh_key"])]
    clear_auth: bool,

    #[command(flatten)]
    auth: AuthArgs,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Command::Version = cli.command {
        let version = version_info();
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("{}", e),
        }
        return ExitCode::SUCCESS;
    }

    let layout = match &cli.home {
        Some(home) => StorageLayout::new(home),
        None => StorageLayout::from_env(),
    };

    let settings = match Settings::load(&layout).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging; only the server logs to stdout by default
    let is_serve = matches!(cli.command, Command::Serve { .. });
    let log_options = LogOptions {
        log_level: cli
            .log_level
            .clone()
            .unwrap_or_else(|| settings.log_level.clone()),
        stdout: is_serve || cli.log_level.is_some(),
        log_dir: settings.log_dir.clone(),
        json_format: settings.json_logs,
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    let result = match cli.command {
        Command::Serve {
            host,
            port,
            no_poller,
        } => serve(layout, settings, host, port, no_poller).await,
        command => match AppContext::init(layout, settings).await {
            Ok(context) => execute(&context, command).await,
            Err(e) => Err(e),
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("{} {}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn serve(
    layout: StorageLayout,
    settings: Settings,
    host: Option<String>,
    port: Option<u16>,
    no_poller: bool,
) -> Result<(), DockhandError> {
    let mut options = AppOptions::from_settings(layout, settings);
    if let Some(host) = host {
        options.server.host = host;
    }
    if let Some(port) = port {
        options.server.port = port;
    }
    if no_poller {
        options.enable_poller = false;
    }

    info!("Running dockhand with options: {:?}", options.server);
    run(options, await_shutdown_signal()).await
}

async fn execute(context: &AppContext, command: Command) -> Result<(), DockhandError> {
    let coordinator = &context.coordinator;

    match command {
        Command::List => {
            let workloads = coordinator.list().await?;
            if workloads.is_empty() {
                println!("No workloads");
            }
            for workload in &workloads {
                print_summary(workload);
            }
        }
        Command::Show { id } => print_workload(&coordinator.get(&id).await?),
        Command::Create(args) => {
            let request = CreateWorkload {
                name: args.name,
                repository_url: args.repo,
                branch: args.branch,
                auth: args.auth.descriptor().await?,
                compose_files: args.compose_files,
                environment: args.environment,
                auto_deploy: args.auto_deploy,
            };
            let workload = coordinator.create(request).await?;
            println!("{} {}", "Created".green().bold(), workload.id);
            print_workload(&workload);
        }
        Command::Update(args) => {
            let auth = if args.clear_auth {
                Some(AuthDescriptor::default())
            } else {
                args.auth.descriptor().await?
            };
            let request = UpdateWorkload {
                name: args.name,
                branch: args.branch,
                auth,
                compose_files: (!args.compose_files.is_empty()).then_some(args.compose_files),
                environment: (!args.environment.is_empty()).then_some(args.environment),
                auto_deploy: args.auto_deploy,
            };
            let workload = coordinator.update(&args.id, request).await?;
            print_workload(&workload);
        }
        Command::Remove { id } => {
            coordinator.remove(&id).await?;
            println!("{} {}", "Removed".green().bold(), id);
        }
        Command::Deploy { id, no_pull } => {
            coordinator.deploy_piping(&id, !no_pull).await?;
        }
        Command::Stop { id } => coordinator.stop_piping(&id).await?,
        Command::Logs {
            id,
            follow,
            tail,
            timestamps,
            services,
        } => {
            let options = LogsOptions {
                follow,
                tail,
                timestamps,
                services,
            };
            coordinator.logs(&id, &options, ExecMode::Piped).await?;
        }
        Command::Config { id } => {
            let config = coordinator.config(&id).await?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Command::Status { id } => {
            let status = coordinator.status(&id).await?;
            let state = match status.state {
                StackState::Running => "running".green(),
                StackState::Stopped => "stopped".yellow(),
                StackState::Error => "error".red(),
            };
            println!("{} {}", state.bold(), status.uptime);
            for container in &status.containers {
                println!(
                    "  {:<20} {:<32} {:<10} {}",
                    container.service, container.name, container.state, container.status
                );
            }
        }
        Command::Deployments { id } => {
            for deployment in coordinator.list_deployments(&id).await? {
                let status = match deployment.status {
                    DeploymentStatus::Completed => "completed".green(),
                    DeploymentStatus::Failed => "failed".red(),
                    DeploymentStatus::Started => "started".yellow(),
                    DeploymentStatus::Unknown => "unknown".normal(),
                };
                println!(
                    "{}  {:<10} {}  {}",
                    deployment.created_at.format("%Y-%m-%d %H:%M:%S"),
                    status,
                    deployment
                        .commit_hash
                        .as_deref()
                        .and_then(|c| c.get(..7))
                        .unwrap_or("-------"),
                    deployment.id
                );
            }
        }
        Command::Serve { .. } | Command::Version => {}
    }

    Ok(())
}

fn colored_status(status: WorkloadStatus) -> colored::ColoredString {
    match status {
        WorkloadStatus::Running => status.as_str().green(),
        WorkloadStatus::Stopped => status.as_str().yellow(),
        WorkloadStatus::Error => status.as_str().red(),
        WorkloadStatus::Unknown => status.as_str().normal(),
    }
}

fn print_summary(workload: &Workload) {
    println!(
        "{}  {:<24} {:<8} {}",
        workload.id,
        workload.name.bold(),
        colored_status(workload.status),
        workload.branch
    );
}

fn print_workload(workload: &Workload) {
    println!("{}", workload.name.bold());
    println!("  id:            {}", workload.id);
    println!("  status:        {}", colored_status(workload.status));
    println!("  repository:    {}", workload.repository_url);
    println!("  branch:        {}", workload.branch);
    println!(
        "  credentials:   {}",
        match workload.credentials.as_ref() {
            Some(sealed) => format!("{:?}", sealed.kind).to_lowercase(),
            None => "none".to_string(),
        }
    );
    println!("  working dir:   {}", workload.working_dir.display());
    println!("  compose files: {}", workload.compose_files.join(", "));
    if !workload.environment.is_empty() {
        println!("  environment:   {}", workload.environment.join(" "));
    }
    println!(
        "  last commit:   {}",
        workload.last_commit.as_deref().unwrap_or("-")
    );
    println!("  auto deploy:   {}", workload.auto_deploy);
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            _ => {
                error!("Failed to install signal handlers, waiting for Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Ctrl+C received, shutting down...");
    }
}
