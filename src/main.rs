//! vigil-agent - version 0.1.0
//!
//! Host-resident monitoring agent with tracing logging.
//! This is the main entry point that initializes the agent loops and
//! handles subcommands.

mod commands;

use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{error, info, Level};

use vigil_agent::api::HttpConfigClient;
use vigil_agent::cli::{Args, Commands, LogLevel};
use vigil_agent::config::{
    resolve_config, show_config, validate_effective_config, Config,
};
use vigil_agent::inventory;
use vigil_agent::rates::RateTracker;
use vigil_agent::reporter::Reporter;
use vigil_agent::scheduler::Scheduler;
use vigil_agent::startup_checks::validate_environment;
use vigil_agent::state::AgentState;
use vigil_agent::transport::{spawn_forwarder, HttpSink};

use commands::{command_check, command_list, command_test};

/// Initializes tracing logging subsystem with configured log level.
fn setup_logging(args: &Args) {
    let log_level = match args.log_level {
        LogLevel::Off => Level::ERROR,
        LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    info!("Logging initialized with level: {:?}", args.log_level);
}

/// Helper function to load and validate configuration.
/// Exits the process with error code 1 if validation fails.
fn load_validated_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let config = resolve_config(args)?;
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }
    Ok(config)
}

/// Runs the agent: delivery forwarder, inventory loop, scheduler loop.
async fn run_agent(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        "vigil-agent starting (built {})",
        env!("VERGEN_BUILD_TIMESTAMP")
    );

    validate_environment(&config)?;

    let hostname = config.hostname();
    let config = Arc::new(config);

    let config_client = Arc::new(HttpConfigClient::new(
        config.config_service_url(),
        hostname.clone(),
    ));
    let sink = Arc::new(HttpSink::new(config.ingest_url()));
    let delivery = spawn_forwarder(sink);
    let tracker = Arc::new(RateTracker::new());
    let reporter = Reporter::new(hostname, tracker.clone(), delivery);

    let state = Arc::new(AgentState {
        config: config.clone(),
        config_client,
        tracker,
        reporter,
    });

    tokio::spawn(inventory::run(state.clone()));

    let scheduler = Scheduler::new(state);
    tokio::select! {
        _ = scheduler.run() => {
            error!("Scheduler loop exited unexpectedly");
        }
        _ = signal::ctrl_c() => {
            info!("Received shutdown signal, exiting");
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    setup_logging(&args);

    let config = load_validated_config(&args)?;

    if args.show_config {
        return show_config(&config, args.config_format.clone());
    }
    if args.check_config {
        println!("✅ Configuration is valid");
        return Ok(());
    }

    match &args.command {
        Some(Commands::Check) => command_check(&config),
        Some(Commands::Test {
            plugin,
            args: extra_args,
            timeout,
        }) => command_test(plugin, extra_args, *timeout, &config).await,
        Some(Commands::List) => command_list(&config),
        None => run_agent(config).await,
    }
}
