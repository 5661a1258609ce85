//! capi-bridge: send conversion events to Facebook, TikTok and Pinterest and
//! inspect Facebook dataset quality from the command line.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use capi_conversions::{BatchEvent, Integrations};
use capi_core::{AppConfig, BrowserContext, Delivery, EventData, HttpTransport, Platform};
use capi_quality::{
    export_csv, log_quality_metrics, render_dashboard, DatasetQualityClient, QualityMonitor,
};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "capi-bridge")]
#[command(about = "Server-side conversion events and dataset quality reporting")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, env = "CAPI_BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// URL of the page the event happened on
    #[arg(long, global = true, default_value = "")]
    page_url: String,

    #[arg(long, global = true, default_value = "")]
    referrer: String,

    #[arg(long, global = true, default_value = "")]
    user_agent: String,

    /// Raw Cookie header of the visitor
    #[arg(long, global = true, default_value = "")]
    cookies: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one event
    Track {
        platform: Platform,
        event: String,
        /// Event data as a JSON object
        #[arg(long, default_value = "{}")]
        data: String,
    },
    /// Send a JSON array of `{"event_name": ..., ...}` objects as one request
    Batch { platform: Platform, file: PathBuf },
    /// Send one event in test mode
    Validate {
        platform: Platform,
        event: String,
        #[arg(long, default_value = "{}")]
        data: String,
    },
    /// TikTok pixel event statistics
    Stats,
    /// Facebook dataset quality
    #[command(subcommand)]
    Quality(QualityCommand),
}

#[derive(Subcommand, Debug)]
enum QualityCommand {
    /// Score the dataset and log the summary
    Analyze,
    /// Full JSON report
    Report,
    /// Raw metrics as CSV
    Csv {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// HTML summary panel
    Dashboard {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Refresh periodically until interrupted
    Watch {
        /// Overrides quality.refresh_interval_ms
        #[arg(long)]
        interval_ms: Option<u64>,
    },
}

fn parse_data(raw: &str) -> anyhow::Result<EventData> {
    let value: Value = serde_json::from_str(raw).context("event data is not valid JSON")?;
    anyhow::ensure!(value.is_object(), "event data must be a JSON object");
    Ok(EventData::from_value(value))
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn finish(platform: Platform, delivery: Delivery) -> anyhow::Result<()> {
    let response = delivery
        .into_result()
        .with_context(|| format!("{platform} request failed"))?;
    print_json(&response)
}

fn write_or_print(out: Option<PathBuf>, content: &str) -> anyhow::Result<()> {
    match out {
        Some(path) => {
            std::fs::write(&path, content)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(path = %path.display(), "written");
        }
        None => println!("{content}"),
    }
    Ok(())
}

async fn track(
    integrations: &Integrations,
    platform: Platform,
    event: &str,
    data: &EventData,
    test: bool,
) -> Delivery {
    match (platform, test) {
        (Platform::Facebook, false) => integrations.facebook.track(event, data).await,
        (Platform::Facebook, true) => integrations.facebook.validate(event, data).await,
        (Platform::TikTok, false) => integrations.tiktok.track(event, data).await,
        (Platform::TikTok, true) => integrations.tiktok.validate(event, data).await,
        (Platform::Pinterest, false) => integrations.pinterest.track(event, data).await,
        (Platform::Pinterest, true) => integrations.pinterest.validate(event, data).await,
    }
}

async fn batch(integrations: &Integrations, platform: Platform, events: &[BatchEvent]) -> Delivery {
    match platform {
        Platform::Facebook => integrations.facebook.send_batch(events).await,
        Platform::TikTok => integrations.tiktok.send_batch(events).await,
        Platform::Pinterest => integrations.pinterest.send_batch(events).await,
    }
}

async fn run_quality(config: &AppConfig, command: QualityCommand) -> anyhow::Result<()> {
    let client = DatasetQualityClient::from_config(&config.http, config.quality.clone())?;

    match command {
        QualityCommand::Analyze => {
            let analysis = client.analyze().await?;
            log_quality_metrics(&analysis);
            print_json(&analysis)?;
        }
        QualityCommand::Report => {
            let report = client.full_report().await?;
            print_json(&report)?;
        }
        QualityCommand::Csv { out } => {
            let data = client.fetch(None).await?;
            write_or_print(out, &export_csv(&data)?)?;
        }
        QualityCommand::Dashboard { out } => {
            let analysis = client.analyze().await?;
            write_or_print(out, &render_dashboard(&analysis))?;
        }
        QualityCommand::Watch { interval_ms } => {
            let monitor = match interval_ms {
                Some(ms) => QualityMonitor::with_period(client, Duration::from_millis(ms.max(1))),
                None => QualityMonitor::new(client),
            };
            if let Err(e) = monitor.run_cycle().await {
                warn!(error = %e, "initial quality analysis failed");
            }
            if let Some(analysis) = monitor.latest() {
                log_quality_metrics(&analysis);
            }

            let handle = monitor.start();
            tokio::signal::ctrl_c().await?;
            handle.stop();
            handle.stopped().await;
            info!(
                cycles = monitor.cycles(),
                failures = monitor.failures(),
                "quality watch finished"
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "capi_bridge=info,capi_conversions=info,capi_quality=info".into()
            }),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    let context = BrowserContext::new(cli.page_url)
        .with_referrer(cli.referrer)
        .with_user_agent(cli.user_agent)
        .with_cookies(cli.cookies);

    if let Command::Quality(command) = cli.command {
        return run_quality(&config, command).await;
    }

    let integrations: Integrations<HttpTransport> = Integrations::from_config(&config, context)?;
    for (platform, problem) in integrations.validate_config() {
        warn!(platform = %platform, error = %problem, "platform is not fully configured");
    }

    match cli.command {
        Command::Track {
            platform,
            event,
            data,
        } => {
            let data = parse_data(&data)?;
            finish(platform, track(&integrations, platform, &event, &data, false).await)
        }
        Command::Validate {
            platform,
            event,
            data,
        } => {
            let data = parse_data(&data)?;
            finish(platform, track(&integrations, platform, &event, &data, true).await)
        }
        Command::Batch { platform, file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let events: Vec<BatchEvent> =
                serde_json::from_str(&raw).context("batch file must be a JSON array of events")?;
            info!(platform = %platform, count = events.len(), "sending batch");
            finish(platform, batch(&integrations, platform, &events).await)
        }
        Command::Stats => finish(Platform::TikTok, integrations.tiktok.event_stats().await),
        Command::Quality(_) => Ok(()),
    }
}
