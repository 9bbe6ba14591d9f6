//! Replay daemon entry point (spec §6). Parses the CLI surface, stands up
//! logging, builds the resource cache pipeline and renderer factory, then
//! accepts one replay connection at a time through a [`ServerSession`],
//! driving each to completion through a fresh [`Context`].

mod cache_pipeline;
mod cli;
mod context;
mod crash;
mod error;
mod renderer;
mod replay_request;

use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Parser;

use gapir_core::config::VOLATILE_SIZE_CANDIDATES;
use gapir_core::DaemonConfig;
use gapir_resources::{CachedResourceLoader, DiskCache, MemoryCache};
use gapir_transport::{ServerSession, StreamReplayService};
use gapir_vm::MemoryManager;

use cache_pipeline::{CachingFetcher, ServiceFetcher};
use cli::Cli;
use context::Context;
use renderer::NullRendererFactory;

/// In-memory cache budget ahead of the on-disk archive (spec §4.D).
const MEMORY_CACHE_LIMIT: usize = 512 * 1024 * 1024;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.into_config();

    init_tracing(&config)?;

    if config.wait_for_debugger {
        tracing::info!("--wait-for-debugger set; pausing for 5s for a debugger to attach");
        std::thread::sleep(std::time::Duration::from_secs(5));
    }

    let auth_token = config.load_auth_token().context("failed to read auth token file")?.unwrap_or_default();

    std::fs::create_dir_all(&config.cache_dir)
        .with_context(|| format!("failed to create cache directory {}", config.cache_dir.display()))?;

    let addr = format!("127.0.0.1:{}", config.port);
    let session = ServerSession::bind(&addr, auth_token, config.idle_timeout).context("failed to bind replay session")?;
    let bound_port = session.local_port().context("failed to read bound port")?;

    // The controller greps this exact line from stdout to learn which
    // ephemeral port was chosen when `--port 0` was passed.
    println!("Bound on port '{bound_port}'");

    session.run(|stream| {
        if let Err(e) = handle_connection(stream, &config) {
            tracing::error!("replay session failed: {e}");
        }
    })?;

    Ok(())
}

fn handle_connection(stream: std::net::TcpStream, config: &DaemonConfig) -> Result<()> {
    let service = StreamReplayService::new(stream).context("failed to establish replay stream")?;
    let service: Arc<parking_lot::Mutex<Box<dyn gapir_transport::ReplayService>>> =
        Arc::new(parking_lot::Mutex::new(Box::new(service)));

    let disk = DiskCache::open(&config.cache_dir, "archive").context("failed to open on-disk resource archive")?;
    let upstream: Arc<dyn gapir_resources::ResourceFetcher> = Arc::new(ServiceFetcher::new(service.clone()));
    let fetcher: Arc<dyn gapir_resources::ResourceFetcher> = Arc::new(CachingFetcher::new(disk, upstream));

    let cache = MemoryCache::new(MEMORY_CACHE_LIMIT, fetcher.clone());
    let loader = CachedResourceLoader::new(cache, fetcher);

    let mut mm = MemoryManager::new(VOLATILE_SIZE_CANDIDATES).context("failed to allocate replay arena")?;
    let mut ctx = Context::with_shared_service(service, loader, Box::new(NullRendererFactory));

    ctx.run_replay(&mut mm, "default").map_err(Into::into)
}

fn init_tracing(config: &DaemonConfig) -> Result<()> {
    use tracing_subscriber::EnvFilter;

    let level = match config.log_level {
        gapir_core::Severity::Fatal | gapir_core::Severity::Error => "error",
        gapir_core::Severity::Warning => "warn",
        gapir_core::Severity::Info => "info",
        gapir_core::Severity::Debug => "debug",
        gapir_core::Severity::Verbose => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    match &config.log_path {
        Some(path) => {
            let file = std::fs::File::create(path).with_context(|| format!("failed to create log file {}", path.display()))?;
            subscriber.with_writer(std::sync::Mutex::new(file)).with_ansi(false).init();
        }
        None => subscriber.with_writer(std::io::stderr).init(),
    }
    Ok(())
}
