use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use huevoice::bridge::BridgePairing;
use huevoice::bridge::HttpBridge;
use huevoice::bridge::HttpPairingTransport;
use huevoice::config::LoggingConfig;
use huevoice::gateway::RumqttcClient;
use huevoice::CommandProcessor;
use huevoice::Config;
use huevoice::LogLevel;
use huevoice::SessionGateway;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Voice control for Hue lights over the Hermes protocol
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Configuration file; created with defaults when missing
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Override the configured log level
    #[arg(long, value_parser = parse_log_level)]
    log_level: Option<LogLevel>,

    /// Pair with the bridge, store the credential and exit
    #[arg(long)]
    pair_only: bool,
}

fn parse_log_level(s: &str) -> Result<LogLevel, String> {
    match s.to_ascii_lowercase().as_str() {
        "trace" => Ok(LogLevel::Trace),
        "debug" => Ok(LogLevel::Debug),
        "info" => Ok(LogLevel::Info),
        "warn" => Ok(LogLevel::Warn),
        "error" => Ok(LogLevel::Error),
        other => Err(format!("unknown log level {other:?}")),
    }
}

fn init_tracing(logging: &LoggingConfig, level: LogLevel) {
    let filter = logging.overrides.iter().fold(
        Targets::new().with_default(LevelFilter::from(level)),
        |targets, (target, level)| targets.with_target(target.clone(), LevelFilter::from(*level)),
    );

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::load_or_create(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    init_tracing(&config.logging, args.log_level.unwrap_or(config.logging.level));
    tracing::info!("huevoice starting");
    tracing::info!("Loaded config from: {}", args.config.display());

    let pairing = BridgePairing::new(HttpPairingTransport::new(), &config.bridge);
    let (stored_ip, stored_key) = config.stored_credential();
    let paired = tokio::select! {
        result = pairing.establish(stored_ip, stored_key) => result.context("Failed to connect to the bridge")?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted while pairing, exiting");
            return Ok(());
        }
    };

    if paired.changed {
        config.set_credential(&paired.credential);
        config
            .save(&args.config)
            .with_context(|| format!("Failed to store credential in {}", args.config.display()))?;
        tracing::info!("Stored bridge credential in {}", args.config.display());
    }

    if args.pair_only {
        tracing::info!("Paired with bridge at {}", paired.credential.bridge_ip);
        return Ok(());
    }

    let processor = CommandProcessor::new(HttpBridge::new(&paired.credential))
        .await
        .context("Failed to load rooms and scenes from the bridge")?;

    let mut gateway = SessionGateway::new(RumqttcClient::new(&config.mqtt), processor);
    gateway
        .start()
        .await
        .with_context(|| format!("Failed to subscribe on {}:{}", config.mqtt.broker, config.mqtt.port))?;

    tracing::info!("Listening for intents on {}:{}", config.mqtt.broker, config.mqtt.port);

    tokio::select! {
        result = gateway.run() => result.context("Intent loop failed")?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
    }

    Ok(())
}
