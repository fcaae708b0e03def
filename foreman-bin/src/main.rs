//! Foreman smoke binary. Wires the controller to the in-memory reference
//! collaborators and the mock engine; embedding applications supply their
//! own `Engine`, `TaskStore`, and `StateStore` implementations instead.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use foreman_config::ConfigLoader;
use foreman_controller::Controller;
use foreman_core::{EventBus, Task};
use foreman_engine::MockEngine;
use foreman_store::{InMemoryTaskStore, MemoryStateStore};

#[derive(Parser)]
#[command(name = "foreman", about = "Autonomous work-item controller", version)]
struct Cli {
    /// Path to foreman.toml (default: ~/.foreman/foreman.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seed a demo task with this title and exit once it completes.
    #[arg(long)]
    task: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let loader = ConfigLoader::load(cli.config.as_deref())?;
    let config = loader.get();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    match config.logging.format.as_str() {
        "json" => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
        "compact" => tracing_subscriber::fmt().with_env_filter(filter).compact().init(),
        _ => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    let store = Arc::new(InMemoryTaskStore::new());
    if let Some(title) = cli.task {
        store
            .add(Task::new(title, 5).with_description("Seeded from the command line"))
            .await;
    }

    let events = EventBus::default();
    let mut event_rx = events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = event_rx.recv().await {
            info!(?event, "controller event");
        }
    });

    let controller = Controller::new(
        config,
        store,
        Arc::new(MockEngine::new("mock").with_reply("Ran the requested checks; npm test passed.")),
        Arc::new(MemoryStateStore::new()),
        events,
    );

    controller.activate();
    info!("foreman running; ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    controller.deactivate();
    Ok(())
}
