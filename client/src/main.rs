//! Solarwatch - operator CLI for the Solarwatch alerting server
//!
//! Talks to the server's admin endpoint: alert history, rule thresholds,
//! live channel watch and telemetry replay.

mod admin;
mod config;
mod output;
mod replay;

use admin::{AdminClient, StreamSender};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use protocol::{AdminRequest, AdminResponse, Channel, Rule, RulePatch, RulePatchSet, Source, Threshold};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "solarwatch")]
#[command(version)]
#[command(about = "Solarwatch operator CLI - alerts, rules and live channels", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "client.conf")]
    config: PathBuf,

    /// Log progress to stderr
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Inspect and manage the alert log
    Alerts {
        #[command(subcommand)]
        action: AlertsAction,
    },
    /// Inspect and patch alert rules
    Rules {
        #[command(subcommand)]
        action: RulesAction,
    },
    /// Follow a live channel
    Watch {
        /// alerts, inverter-raw or weather-raw
        #[arg(long, default_value = "alerts", value_parser = parse_channel)]
        channel: Channel,
    },
    /// Send recorded JSON lines to a stream port
    Replay {
        /// inverter or weather
        #[arg(value_parser = parse_source)]
        source: Source,
        file: PathBuf,
        /// Pause between records
        #[arg(long, default_value_t = 0)]
        interval_ms: u64,
    },
}

#[derive(Subcommand, Debug)]
enum AlertsAction {
    /// Print every logged alert
    List {
        #[arg(long)]
        newest_first: bool,
    },
    /// Delete one alert by id
    Delete { id: uuid::Uuid },
    /// Delete every alert
    Clear,
    /// Write the alert log to a CSV file
    Export {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum RulesAction {
    /// Print the rule set
    Show,
    /// Enable, disable or re-threshold one rule
    Set {
        title: String,
        #[arg(long, conflicts_with = "disable")]
        enable: bool,
        #[arg(long)]
        disable: bool,
        /// name=min:max, repeatable
        #[arg(long = "threshold", value_parser = parse_threshold)]
        thresholds: Vec<(String, Threshold)>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = config::Config::load(&args.config)?;
    debug!("Loaded configuration from {:?}", args.config);

    match args.command {
        Command::Alerts { action } => run_alerts(&connect(&config)?, action),
        Command::Rules { action } => run_rules(&connect(&config)?, action),
        Command::Watch { channel } => run_watch(&connect(&config)?, channel),
        Command::Replay {
            source,
            file,
            interval_ms,
        } => {
            let sender = StreamSender::connect(&config.server.stream_addr(source))?;
            let sent = replay::replay_file(&sender, &file, Duration::from_millis(interval_ms))?;
            println!("Sent {} {} record(s)", sent, source);
            Ok(())
        }
    }
}

fn connect(config: &config::Config) -> Result<AdminClient> {
    AdminClient::connect(&config.server).context("Failed to set up admin client")
}

fn run_alerts(client: &AdminClient, action: AlertsAction) -> Result<()> {
    let mut stdout = std::io::stdout();

    match action {
        AlertsAction::List { newest_first } => {
            let mut entries = fetch_alerts(client)?;
            if newest_first {
                entries.reverse();
            }
            output::print_alerts(&mut stdout, &entries)
        }
        AlertsAction::Delete { id } => match client.request(&AdminRequest::DeleteAlert { id })? {
            AdminResponse::Deleted { .. } => {
                println!("Deleted alert {}", id);
                Ok(())
            }
            AdminResponse::NotFound { id } => anyhow::bail!("Alert {} not found", id),
            other => unexpected(other),
        },
        AlertsAction::Clear => match client.request(&AdminRequest::DeleteAllAlerts)? {
            AdminResponse::Deleted { count } => {
                println!("Deleted {} alert(s)", count);
                Ok(())
            }
            other => unexpected(other),
        },
        AlertsAction::Export { output } => {
            let entries = fetch_alerts(client)?;
            let output_path = output.unwrap_or_else(|| {
                PathBuf::from(format!(
                    "solarwatch_alerts_{}.csv",
                    chrono::Local::now().format("%Y%m%d_%H%M%S")
                ))
            });
            output::export_csv(&entries, &output_path)?;
            info!("Exported {} alerts", entries.len());
            println!("Exported {} alert(s) to {:?}", entries.len(), output_path);
            Ok(())
        }
    }
}

fn run_rules(client: &AdminClient, action: RulesAction) -> Result<()> {
    match action {
        RulesAction::Show => output::print_rules(&mut std::io::stdout(), &fetch_rules(client)?),
        RulesAction::Set {
            title,
            enable,
            disable,
            thresholds,
        } => {
            let enabled = if enable {
                true
            } else if disable {
                false
            } else {
                current_enabled(&fetch_rules(client)?, &title)?
            };

            let patch = build_patch(&title, enabled, thresholds);
            match client.request(&AdminRequest::UpdateRules { patch })? {
                AdminResponse::Rules { rules } => {
                    let updated: Vec<Rule> = rules.into_iter().filter(|r| r.title == title).collect();
                    output::print_rules(&mut std::io::stdout(), &updated)
                }
                other => unexpected(other),
            }
        }
    }
}

fn run_watch(client: &AdminClient, channel: Channel) -> Result<()> {
    let timeout_secs = match client.request(&AdminRequest::Subscribe { channel })? {
        AdminResponse::Subscribed { timeout_secs, .. } => timeout_secs,
        other => return unexpected(other),
    };

    let renew_every = Duration::from_secs(timeout_secs.max(2) / 2);
    info!("Watching {} on {} (renewing every {:?})", channel, client.server_addr(), renew_every);
    let mut next_renewal = Instant::now() + renew_every;

    loop {
        let now = Instant::now();
        if now >= next_renewal {
            client.send(&AdminRequest::Subscribe { channel })?;
            next_renewal = now + renew_every;
            continue;
        }

        match client.recv(next_renewal - now)? {
            Some(AdminResponse::Message { channel, message }) => {
                println!("{}", output::format_message(channel, &message));
            }
            Some(AdminResponse::Subscribed { .. }) => debug!("Subscription renewed"),
            Some(other) => debug!("Ignoring {:?}", other),
            None => {}
        }
    }
}

fn fetch_alerts(client: &AdminClient) -> Result<Vec<protocol::AlertLogEntry>> {
    match client.request(&AdminRequest::ListAlerts)? {
        AdminResponse::Alerts { entries } => Ok(entries),
        other => unexpected(other),
    }
}

fn fetch_rules(client: &AdminClient) -> Result<Vec<Rule>> {
    match client.request(&AdminRequest::GetRules)? {
        AdminResponse::Rules { rules } => Ok(rules),
        other => unexpected(other),
    }
}

fn current_enabled(rules: &[Rule], title: &str) -> Result<bool> {
    rules
        .iter()
        .find(|r| r.title == title)
        .map(|r| r.enabled)
        .with_context(|| format!("No rule titled '{}'", title))
}

fn build_patch(title: &str, enabled: bool, thresholds: Vec<(String, Threshold)>) -> RulePatchSet {
    let mut patch = RulePatchSet::new();
    patch.insert(
        title.to_string(),
        RulePatch {
            enabled,
            variables: thresholds.into_iter().collect(),
        },
    );
    patch
}

fn unexpected<T>(response: AdminResponse) -> Result<T> {
    match response {
        AdminResponse::Error { message } => anyhow::bail!("Server error: {}", message),
        other => anyhow::bail!("Unexpected response: {:?}", other),
    }
}

fn parse_threshold(s: &str) -> Result<(String, Threshold), String> {
    let (name, range) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=min:max, got '{}'", s))?;
    let (min, max) = range
        .split_once(':')
        .ok_or_else(|| format!("expected min:max after '=', got '{}'", range))?;

    let min: f64 = min.trim().parse().map_err(|e| format!("invalid min '{}': {}", min, e))?;
    let max: f64 = max.trim().parse().map_err(|e| format!("invalid max '{}': {}", max, e))?;
    let threshold = Threshold::new(min, max);
    threshold.validate()?;

    let name = name.trim();
    if name.is_empty() {
        return Err("variable name is empty".to_string());
    }
    Ok((name.to_string(), threshold))
}

fn parse_channel(s: &str) -> Result<Channel, String> {
    Channel::from_name(s).ok_or_else(|| {
        let names: Vec<&str> = Channel::ALL.iter().map(|c| c.as_str()).collect();
        format!("unknown channel '{}', expected one of {}", s, names.join(", "))
    })
}

fn parse_source(s: &str) -> Result<Source, String> {
    Source::from_name(s).ok_or_else(|| format!("unknown source '{}', expected inverter or weather", s))
}
