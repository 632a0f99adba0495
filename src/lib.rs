pub mod channels;
pub mod command;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod home_assistant;
pub mod mqtt;
pub mod options;
pub mod prelude;
pub mod publisher;
pub mod pylontech;
pub mod reconcile;
pub mod scheduler;
pub mod sensor;

// Get the package version from Cargo.toml
const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

use crate::mqtt::Mqtt;
use crate::prelude::*;
use crate::publisher::Publisher;
use crate::pylontech::console::TcpConsole;
use crate::scheduler::Scheduler;
use std::sync::Arc;
use std::time::Duration;

/// Manages all application components and their lifecycle
#[derive(Clone)]
pub struct Components {
    pub coordinator: Arc<Coordinator<TcpConsole>>,
    pub scheduler: Arc<Scheduler>,
    pub publisher: Arc<Publisher>,
    pub mqtt: Option<Arc<Mqtt>>,
    pub channels: Channels,
}

impl Components {
    /// Stops the poll loop first so no new snapshots are produced, then MQTT.
    pub fn stop(&self) {
        info!("Stopping all components...");

        self.coordinator.stop();

        if let Some(mqtt) = &self.mqtt {
            mqtt.stop();
        }
    }
}

pub fn init_logging(level: &str) {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.module_path().unwrap_or(""),
                record.args()
            )
        })
        .write_style(env_logger::WriteStyle::Never)
        .try_init();
}

/// Connects once, prints the BMS `info` as JSON and returns.
pub async fn probe(config: &ConfigWrapper) -> Result<()> {
    use crate::pylontech::{Response, SystemInfo};

    let mut console = TcpConsole::new(config.bms().clone());
    console.connect().await?;
    let raw = console.execute(Command::Info).await;
    console.disconnect().await;

    let info = SystemInfo::parse(&Response::new(Command::Info, raw?)?)?;
    println!("{}", serde_json::to_string_pretty(&info)?);

    Ok(())
}

/// Main application entry point
///
/// Starts every component, then waits for ctrl-c or the runtime limit and
/// shuts them down again.
pub async fn app(options: Options, config: ConfigWrapper) -> Result<()> {
    info!("pylontech-bridge {} starting", CARGO_PKG_VERSION);

    if options.probe {
        return probe(&config).await;
    }

    info!("Initializing channels...");
    let channels = Channels::new();
    let store = SnapshotStore::new();

    info!("Initializing components...");

    info!("  Creating Coordinator...");
    let coordinator = Arc::new(Coordinator::new(
        config.clone(),
        channels.clone(),
        store.clone(),
        TcpConsole::new(config.bms().clone()),
    ));
    let coordinator_clone = coordinator.clone();
    let coordinator_handle = tokio::spawn(async move {
        if let Err(e) = coordinator_clone.start().await {
            error!("Coordinator task failed: {}", e);
        }
    });

    info!("  Creating Publisher...");
    let publisher = Arc::new(Publisher::new(
        config.clone(),
        channels.clone(),
        store,
        coordinator.stats.clone(),
    ));
    let publisher_clone = publisher.clone();
    let publisher_handle = tokio::spawn(async move {
        if let Err(e) = publisher_clone.start().await {
            error!("Publisher task failed: {}", e);
        }
    });

    let mut mqtt_handle = None;
    let mqtt = if config.mqtt().enabled() {
        info!("  Creating MQTT client...");
        let mqtt = Arc::new(Mqtt::new(
            config.clone(),
            channels.clone(),
            coordinator.stats.clone(),
        ));
        let mqtt_clone = mqtt.clone();
        mqtt_handle = Some(tokio::spawn(async move {
            if let Err(e) = mqtt_clone.start().await {
                error!("MQTT task failed: {}", e);
            }
        }));
        Some(mqtt)
    } else {
        info!("  MQTT disabled, readings will only be logged");
        None
    };

    // the scheduler goes last so the first tick finds everyone listening
    info!("  Creating Scheduler...");
    let scheduler = Arc::new(Scheduler::new(config.clone(), channels.clone()));
    let scheduler_clone = scheduler.clone();
    let scheduler_handle = tokio::spawn(async move {
        if let Err(e) = scheduler_clone.start().await {
            error!("Scheduler task failed: {}", e);
        }
    });

    let components = Components {
        coordinator,
        scheduler,
        publisher,
        mqtt,
        channels,
    };

    info!("Waiting for shutdown signal...");
    let runtime_limit = async {
        match options.runtime {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for ctrl+c: {}", e);
            }
            info!("Shutdown signal received, stopping components...");
        }
        _ = runtime_limit => {
            info!("Runtime limit reached, stopping components...");
        }
    }

    components.stop();

    if let Err(e) = coordinator_handle.await {
        error!("Error waiting for coordinator task: {}", e);
    }
    if let Err(e) = scheduler_handle.await {
        error!("Error waiting for scheduler task: {}", e);
    }
    if let Err(e) = publisher_handle.await {
        error!("Error waiting for publisher task: {}", e);
    }
    if let Some(handle) = mqtt_handle {
        if let Err(e) = handle.await {
            error!("Error waiting for MQTT task: {}", e);
        }
    }

    info!("Application shutdown complete");
    Ok(())
}
