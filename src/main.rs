use std::sync::Arc;

use reef::adapters::AdapterRegistry;
use reef::agent::JobManager;
use reef::config::Config;
use reef::persistence::FileStore;
use reef::service::{ProcessInfo, Service};
use tokio::io::BufReader;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let _log_guard = reef::logging::init(config.log_dir.as_deref())?;

    eprintln!("🪸 Reef v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   State: {}", config.state_path.display());
    eprintln!("   Reading JSON requests from stdin, one per line.\n");

    let registry = Arc::new(AdapterRegistry::with_builtin(&config.binaries));
    tracing::info!(adapters = ?registry.list(), "Registered adapters");

    let store = Arc::new(FileStore::new(&config.state_path));
    let manager = JobManager::new(Arc::clone(&registry), store, &config);
    manager.load().await;

    let service = Service::new(manager.clone(), ProcessInfo::new(&registry));
    reef::console::run(
        &service,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await?;

    manager.flush().await;
    tracing::info!("Shutting down");
    Ok(())
}
