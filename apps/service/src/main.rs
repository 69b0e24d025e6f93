use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use uuid::Uuid;

use uptrack_service::config::Config;
use uptrack_service::database::{Database, Monitor};
use uptrack_service::monitoring::ScheduleTier;
use uptrack_service::monitoring::validation::validate_target;
use uptrack_service::orchestrator::Orchestrator;

#[derive(Debug, Parser)]
#[command(version, about = "Tiered uptime checks dispatched to remote check agents")]
struct Cli {
    /// Config file, defaults to $XDG_CONFIG_HOME/uptrack/config.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run all tier schedulers until interrupted (default)
    Run,
    /// Run one tier's tick now and exit
    Tick {
        /// Tier period in minutes (1, 5, 10, 30 or 60)
        #[arg(short, long)]
        tier: u32,
    },
    /// Register a monitor
    AddMonitor {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        url: String,
        #[arg(long)]
        port: Option<u16>,
        /// Tier period in minutes
        #[arg(long, default_value_t = 5)]
        tier: u32,
    },
    /// List the monitors of one owner
    List {
        #[arg(long)]
        owner: String,
    },
    /// Pause a monitor so it is no longer checked
    Pause { monitor_id: Uuid },
    /// Print recent uptime events of a monitor, newest first
    Events {
        monitor_id: Uuid,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Print the effective configuration
    ShowConfig,
}

fn parse_tier(minutes: u32) -> Result<ScheduleTier> {
    ScheduleTier::from_minutes(minutes)
        .ok_or_else(|| anyhow!("unsupported tier {minutes}, expected one of 1, 5, 10, 30, 60"))
}

fn unix_seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

fn monitor_line(monitor: &Monitor) -> String {
    let last_checked = monitor
        .last_checked_at
        .map_or_else(|| "never".to_string(), |checked| unix_seconds(checked).to_string());
    format!(
        "{} {} every {} paused={} last_checked={}",
        monitor.id,
        monitor.target(),
        monitor.tier,
        monitor.is_paused,
        last_checked
    )
}

#[tokio::main]
async fn main() {
    logger::init_tracing();

    if let Err(e) = run(Cli::parse()).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::from_config(cli.config.as_ref())?;

    match cli.command.unwrap_or(Command::Run) {
        Command::ShowConfig => {
            println!("{config}");
            Ok(())
        }
        command => run_with_engine(&config, command).await,
    }
}

async fn run_with_engine(config: &Config, command: Command) -> Result<()> {
    let orchestrator = Orchestrator::from_config(config).await?;

    match command {
        Command::Run => orchestrator.run().await?,
        Command::Tick { tier } => {
            let report = orchestrator.run_tier_now(parse_tier(tier)?).await?;
            println!(
                "due={} recorded={} abandoned={} persistence_failures={} crashed={}",
                report.due, report.recorded, report.abandoned, report.persistence_failures, report.crashed
            );
        }
        Command::AddMonitor { owner, url, port, tier } => {
            validate_target(&url, port)?;
            let monitor = Monitor::new(owner, url, port, parse_tier(tier)?);
            orchestrator.database().save_monitor(&monitor).await?;
            info!("Added monitor {} for {} on tier {}", monitor.id, monitor.url, monitor.tier);
            println!("{}", monitor.id);
        }
        Command::List { owner } => {
            let monitors = orchestrator.database().list_monitors_for_owner(&owner).await?;
            if monitors.is_empty() {
                println!("No monitors for {owner}");
            }
            for monitor in &monitors {
                println!("{}", monitor_line(monitor));
            }
        }
        Command::Pause { monitor_id } => {
            if !orchestrator.database().pause_monitor(monitor_id).await? {
                return Err(anyhow!("monitor {monitor_id} not found"));
            }
            println!("Monitor {monitor_id} paused");
        }
        Command::Events { monitor_id, limit } => {
            let database: &Arc<dyn Database> = orchestrator.database();
            let monitor = database
                .get_monitor(monitor_id)
                .await?
                .ok_or_else(|| anyhow!("monitor {monitor_id} not found"))?;
            println!("{} (every {})", monitor.target(), monitor.tier);
            for event in database.get_events_for_monitor(monitor_id, limit).await? {
                let when = unix_seconds(event.timestamp);
                println!(
                    "{when} {} ping={} port={} {}ms by {} ({})",
                    event.availability,
                    event.ping,
                    event.port,
                    event.response_time_ms(),
                    event.confirmed_by_agent,
                    event.verification
                );
            }
        }
        Command::ShowConfig => println!("{config}"),
    }

    Ok(())
}
