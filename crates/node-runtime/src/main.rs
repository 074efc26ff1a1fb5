//! # DWeb Node
//!
//! Entry point for every role of the network.
//!
//! ## Startup Sequence
//!
//! 1. Parse arguments, load configuration (file, then `DWEB_*` env)
//! 2. Install the log subscriber
//! 3. Start the role: a peer runtime, the registry, or a one-shot
//!    publish/resolve on top of a peer runtime
//! 4. Run until Ctrl+C (long-running roles) and shut down gracefully

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use dw_05_resolver::{DomainBinding, PublishOptions, ResolvedFile};
use node_runtime::{init_logging, run_registry, DwebConfig, PeerRuntime};
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "dweb-node")]
#[command(about = "Decentralized web node: peer, bootstrap, registry, publish and resolve")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "DWEB_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is unset (overrides the config file)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Relay and DHT server for other peers to join through
    Bootstrap {
        /// Also serve the registry from this process
        #[arg(long)]
        with_registry: bool,
    },
    /// Ordinary peer: seeds chunks and answers DHT queries
    Peer,
    /// Registry REST service
    Registry,
    /// Chunk a file, register its manifest and optionally bind a domain
    Publish(PublishArgs),
    /// Fetch a file by manifest id or domain
    Resolve(ResolveArgs),
}

#[derive(Args, Debug)]
struct PublishArgs {
    /// File to publish
    file: PathBuf,

    /// Content type recorded in the manifest
    #[arg(long, default_value = "application/octet-stream")]
    mime: String,

    /// Chunk size in bytes
    #[arg(long, default_value_t = dw_05_resolver::DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Store chunk bytes inline in the registry
    #[arg(long)]
    inline: bool,

    /// Storage service receiving chunk copies
    #[arg(long)]
    storage_url: Option<String>,

    /// Lifetime of storage pointers in seconds
    #[arg(long, requires = "storage_url")]
    pointer_ttl_secs: Option<u64>,

    /// Domain to bind to the manifest
    #[arg(long, requires = "owner")]
    domain: Option<String>,

    /// Domain owner (`dweb:0x<address>` requires a signature)
    #[arg(long)]
    owner: Option<String>,

    /// Hex secp256k1 public key for dweb:0x owners
    #[arg(long)]
    public_key: Option<String>,

    /// Hex signature over --message
    #[arg(long)]
    signature: Option<String>,

    #[arg(long)]
    message: Option<String>,

    /// Seconds to wait for a first peer before publishing to the DHT
    #[arg(long, default_value_t = 2)]
    wait_peers_secs: u64,

    /// Keep seeding the chunks until Ctrl+C
    #[arg(long)]
    serve: bool,
}

#[derive(Args, Debug)]
struct ResolveArgs {
    /// Manifest id to resolve
    #[arg(required_unless_present = "domain", conflicts_with = "domain")]
    manifest_id: Option<String>,

    /// Resolve a domain instead of a manifest id
    #[arg(long)]
    domain: Option<String>,

    /// Output file (defaults to the manifest's file name)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Never fall back to registry pointers or inline data
    #[arg(long)]
    no_registry_fallback: bool,

    /// Seconds to wait for a first peer before resolving
    #[arg(long, default_value_t = 2)]
    wait_peers_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = DwebConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    init_logging(&config.log_level)?;

    match cli.command {
        Command::Bootstrap { with_registry } => run_bootstrap(config, with_registry).await,
        Command::Peer => run_peer(config).await,
        Command::Registry => run_registry_role(config).await,
        Command::Publish(args) => run_publish(config, args).await,
        Command::Resolve(args) => run_resolve(config, args).await,
    }
}

async fn run_bootstrap(mut config: DwebConfig, with_registry: bool) -> Result<()> {
    config.node.dht_server_mode = true;
    config.node.relay.enabled = true;
    config.dht.server_mode = true;

    let runtime = PeerRuntime::start(&config)
        .await
        .context("Failed to start bootstrap node")?;
    print_addrs(&runtime);

    let registry = with_registry.then(|| {
        let config = config.clone();
        let shutdown = runtime.shutdown_signal();
        tokio::spawn(async move { run_registry(&config, shutdown).await })
    });

    info!("Bootstrap node is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;
    runtime.shutdown().await;

    if let Some(handle) = registry {
        handle
            .await
            .context("Registry task panicked")?
            .context("Registry failed")?;
    }
    Ok(())
}

async fn run_peer(config: DwebConfig) -> Result<()> {
    let runtime = PeerRuntime::start(&config)
        .await
        .context("Failed to start peer")?;
    print_addrs(&runtime);

    info!("Peer is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;
    runtime.shutdown().await;
    Ok(())
}

async fn run_registry_role(config: DwebConfig) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = {
        let config = config.clone();
        tokio::spawn(async move { run_registry(&config, shutdown_rx).await })
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Initiating graceful shutdown...");
            // The server may already have exited.
            let _ = shutdown_tx.send(true);
        }
        _ = shutdown_tx.closed() => {}
    }

    server
        .await
        .context("Registry task panicked")?
        .context("Registry failed")?;
    info!("Shutdown complete");
    Ok(())
}

async fn run_publish(config: DwebConfig, args: PublishArgs) -> Result<()> {
    let data = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let file_name = file_name_of(&args.file)?;

    let runtime = PeerRuntime::start(&config)
        .await
        .context("Failed to start peer")?;
    wait_for_peers(&runtime, Duration::from_secs(args.wait_peers_secs)).await;

    let domain = match (args.domain, args.owner) {
        (Some(domain), Some(owner)) => Some(DomainBinding {
            domain,
            owner,
            public_key: args.public_key,
            signature: args.signature,
            message: args.message,
            ..DomainBinding::default()
        }),
        _ => None,
    };
    let options = PublishOptions {
        file_name,
        mime_type: args.mime,
        chunk_size: args.chunk_size,
        inline_data: args.inline,
        pointer_ttl_ms: args.pointer_ttl_secs.map(|secs| secs * 1_000),
        domain,
        ..PublishOptions::default()
    };

    let publisher = runtime.publisher(args.storage_url.as_deref())?;
    let report = match publisher.publish(&data, options).await {
        Ok(report) => report,
        Err(e) => {
            runtime.shutdown().await;
            return Err(e).context("Publish failed");
        }
    };

    println!("manifest: {}", report.manifest.manifest.manifest_id);
    println!("chunks:   {}", report.manifest.manifest.chunk_count);
    println!("sha256:   {}", report.manifest.manifest.sha256);
    if report.pointers_set > 0 {
        println!("pointers: {}", report.pointers_set);
    }
    if let Some(record) = &report.domain {
        println!(
            "domain:   {} (dht: {})",
            record.domain,
            if report.dht_published { "yes" } else { "no" }
        );
    }

    if args.serve {
        info!("Seeding published chunks. Press Ctrl+C to stop.");
        tokio::signal::ctrl_c().await?;
    }
    runtime.shutdown().await;
    Ok(())
}

async fn run_resolve(mut config: DwebConfig, args: ResolveArgs) -> Result<()> {
    if args.no_registry_fallback {
        config.resolver.registry_fallback = false;
    }
    let runtime = PeerRuntime::start(&config)
        .await
        .context("Failed to start peer")?;
    wait_for_peers(&runtime, Duration::from_secs(args.wait_peers_secs)).await;

    let resolver = runtime.resolver()?;
    let result = match (&args.domain, &args.manifest_id) {
        (Some(domain), _) => resolver.resolve_domain_file(domain).await,
        (None, Some(manifest_id)) => resolver.resolve_manifest(manifest_id).await,
        (None, None) => {
            runtime.shutdown().await;
            bail!("Either a manifest id or --domain is required");
        }
    };
    runtime.shutdown().await;
    let file = result.context("Resolve failed")?;

    let out = match args.out {
        Some(path) => path,
        None => PathBuf::from(file_name_of(Path::new(&file.manifest.manifest.file_name))?),
    };
    tokio::fs::write(&out, &file.data)
        .await
        .with_context(|| format!("Failed to write {}", out.display()))?;

    println!("wrote {} bytes to {}", file.data.len(), out.display());
    print_sources(&file);
    Ok(())
}

fn print_addrs(runtime: &PeerRuntime) {
    println!("peer id: {}", runtime.node().local_peer_id());
    for addr in runtime.node().listen_addrs() {
        println!("listening on {addr}");
    }
}

fn print_sources(file: &ResolvedFile) {
    for (index, source) in file.sources.iter().enumerate() {
        println!("  chunk {index}: {}", source.label());
    }
}

/// Bare file name of `path`, refusing paths without one.
fn file_name_of(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .with_context(|| format!("{} has no usable file name", path.display()))
}

async fn wait_for_peers(runtime: &PeerRuntime, timeout: Duration) {
    if runtime.node().config().bootstrap_peers.is_empty() || timeout.is_zero() {
        return;
    }
    let deadline = tokio::time::Instant::now() + timeout;
    while runtime.node().connected_peers().is_empty() {
        if tokio::time::Instant::now() >= deadline {
            warn!("No peers connected, continuing without the mesh");
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
