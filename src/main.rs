use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use publish::config::Cli;
use publish::{BlobStore, ExpiryScheduler, FsStore, Publisher, RETENTION, Server, app};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() {
    let Err(error) = run().await else {
        process::exit(0);
    };

    if tracing::enabled!(tracing::Level::ERROR) {
        tracing::error!("publish terminated with error: {error:#}");
    } else {
        eprintln!("Error: {error:#}");
    }
    process::exit(1);
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing();
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %cli.data_dir.display(),
        retention_secs = RETENTION.as_secs(),
        "starting publish"
    );

    let store = FsStore::open(&cli.data_dir)
        .await
        .context("failed to open blob storage")?;
    let store: Arc<dyn BlobStore> = Arc::new(store);

    let expiry = ExpiryScheduler::spawn(Arc::clone(&store), RETENTION);
    let publisher = Arc::new(Publisher::new(store, expiry.clone()));

    let server = Server::bind(cli.listen_addr())
        .await
        .context("failed to start http server")?;
    server.serve(app(publisher)).await;

    let abandoned = expiry.pending();
    if abandoned > 0 {
        tracing::warn!(abandoned, "pending expiries dropped at shutdown, those blobs stay on disk");
    }
    Ok(())
}

/// Filter from `RUST_LOG`, `info` by default.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
