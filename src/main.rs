use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use session_hub::{
    wait_for_completion, CreateSessionParams, Envelope, GroupManager, GroupSpec, HubClient,
    HubConfig, OrchestrationGroup, WaitOptions, WaitOutcome,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// Drive remote sessions through the hub webhook
#[derive(Parser)]
#[command(name = "session-hub")]
#[command(about = "session-hub - create, start and watch remote sessions", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file (defaults to <config dir>/session-hub/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the webhook URL
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a session
    Create {
        /// implementation, analysis, testing, review, coordination or documentation
        #[arg(short = 't', long = "type")]
        session_type: String,

        /// Repository as owner/name
        #[arg(short, long)]
        repository: String,

        /// What the session should do
        #[arg(short = 'q', long)]
        requirements: String,

        #[arg(long)]
        context: Option<String>,

        #[arg(short, long)]
        branch: Option<String>,

        /// Session ids this one depends on
        #[arg(short, long = "depends-on", value_delimiter = ',')]
        dependencies: Vec<String>,
    },

    /// Start a created session
    Start { session_id: String },

    /// Show a session's current status
    Status { session_id: String },

    /// Fetch a session's output
    Output { session_id: String },

    /// List sessions
    List {
        /// Only show sessions in this status ("all" for every session)
        #[arg(short, long, default_value = "all")]
        status: String,

        /// Only show sessions from this orchestration
        #[arg(short, long)]
        orchestration: Option<String>,
    },

    /// Wait for a session to finish
    Wait {
        session_id: String,

        #[command(flatten)]
        timing: Timing,
    },

    /// Work with groups of related sessions
    #[command(subcommand)]
    Group(GroupCommand),
}

#[derive(Subcommand)]
enum GroupCommand {
    /// Create one session per task, in order
    Create {
        /// Group spec (JSON)
        spec: PathBuf,

        /// Start every member once created
        #[arg(long)]
        start: bool,
    },

    /// Create the whole group with a single orchestration request
    Submit {
        /// Group spec (JSON)
        spec: PathBuf,
    },

    /// Aggregate status of a group
    Status {
        /// Group file as printed by `group create`
        group: PathBuf,
    },

    /// Wait for every member of a group
    Wait {
        /// Group file as printed by `group create`
        group: PathBuf,

        #[command(flatten)]
        timing: Timing,
    },
}

#[derive(clap::Args)]
struct Timing {
    /// Give up after this many seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Seconds between status queries
    #[arg(long)]
    interval: Option<u64>,
}

impl Timing {
    fn options(&self, config: &HubConfig) -> WaitOptions {
        let mut options = WaitOptions::from_config(config);
        if let Some(secs) = self.timeout {
            options.timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.interval.filter(|s| *s > 0) {
            options.poll_interval = Duration::from_secs(secs);
        }
        options
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(cli.verbose >= 2)
        .init();

    let mut config = HubConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(url) = cli.api_url {
        config.api_url = url;
    }
    debug!("Using hub at {}", config.api_url);

    let client = HubClient::new(config.clone());

    match cli.command {
        Commands::Create {
            session_type,
            repository,
            requirements,
            context,
            branch,
            dependencies,
        } => {
            let mut params = CreateSessionParams::new(session_type, repository, requirements)
                .with_dependencies(dependencies);
            params.context = context;
            params.branch = branch;
            report(&client.create_session(&params).await?)
        }
        Commands::Start { session_id } => report(&client.start_session(&session_id).await?),
        Commands::Status { session_id } => report(&client.get_session_status(&session_id).await?),
        Commands::Output { session_id } => report(&client.get_session_output(&session_id).await?),
        Commands::List {
            status,
            orchestration,
        } => report(
            &client
                .list_sessions(Some(&status), orchestration.as_deref())
                .await?,
        ),
        Commands::Wait { session_id, timing } => {
            let cancel = cancel_on_ctrl_c();
            let report = wait_for_completion(&client, &session_id, timing.options(&config), cancel).await?;
            print_json(&report)?;
            Ok(exit_for(std::slice::from_ref(&report.outcome)))
        }
        Commands::Group(command) => run_group(command, client, &config).await,
    }
}

async fn run_group(command: GroupCommand, client: HubClient, config: &HubConfig) -> Result<ExitCode> {
    let mut manager = GroupManager::new(client);

    match command {
        GroupCommand::Create { spec, start } => {
            let spec: GroupSpec = read_json(&spec)?;
            let group = manager.create_group(&spec).await?;
            print_json(&group)?;
            if start {
                let started = manager.start_group(&group).await?;
                let failed = started.iter().filter(|member| !member.envelope.ok).count();
                print_json(&started)?;
                if failed > 0 {
                    return Ok(ExitCode::FAILURE);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        GroupCommand::Submit { spec } => {
            let spec: GroupSpec = read_json(&spec)?;
            report(&manager.submit_orchestration(&spec).await?)
        }
        GroupCommand::Status { group } => {
            let group: OrchestrationGroup = read_json(&group)?;
            let status = manager.aggregate_status(&group).await?;
            print_json(&status)?;
            Ok(if status.any_failed {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
        GroupCommand::Wait { group, timing } => {
            let group: OrchestrationGroup = read_json(&group)?;
            let cancel = cancel_on_ctrl_c();
            let reports = manager
                .wait_for_group(&group, timing.options(config), cancel)
                .await?;
            print_json(&reports)?;
            let outcomes: Vec<WaitOutcome> = reports.into_iter().map(|r| r.outcome).collect();
            Ok(exit_for(&outcomes))
        }
    }
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, aborting wait");
            trigger.cancel();
        }
    });
    cancel
}

fn exit_for(outcomes: &[WaitOutcome]) -> ExitCode {
    if outcomes
        .iter()
        .all(|o| matches!(o, WaitOutcome::Completed { .. }))
    {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn report<T: Serialize>(envelope: &Envelope<T>) -> Result<ExitCode> {
    print_json(envelope)?;
    Ok(if envelope.ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}
