//! gossamer node binary: storage, identity, transport, swarm, and services
//! wired together.

use anyhow::{Context, Result};
use clap::Parser;
use gossamer_crypto::{Engine, KeyStore};
use gossamer_dag::DagBuilder;
use gossamer_net::Transport;
use gossamer_storage::{BlobStore, FileKv, KvHandle, MemoryKv};
use gossamer_swarm::{
    ChatService, DiscoveryService, Dispatcher, GossipManager, Swarm, SwarmConfig, CHAT_TAG,
    DISCOVERY_TAG,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod probe;

use config::NodeConfig;

const KV_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(300);

/// Peer-to-peer encrypted messenger node
#[derive(Parser, Debug)]
#[command(name = "gossamer", version, about = "Peer-to-peer encrypted messenger node")]
struct Args {
    /// Path to a YAML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address, e.g. 0.0.0.0:4242
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Peer to connect to at startup (repeatable)
    #[arg(long)]
    connect: Vec<SocketAddr>,

    /// Data directory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Storage backend: file, memory
    #[arg(long)]
    storage: Option<String>,

    /// Log level when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Import a file into the content store at startup and log its root hash
    #[arg(long)]
    import_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut cfg = NodeConfig::load(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        cfg.listen_addr = listen;
    }
    if let Some(data_dir) = args.data_dir {
        cfg.data_dir = data_dir;
    }
    if let Some(storage) = args.storage {
        cfg.storage = storage;
    }
    if let Some(level) = args.log_level {
        cfg.log_level = level;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cfg.log_level.clone())),
        )
        .init();

    info!("starting gossamer node, data dir {}", cfg.data_dir.display());

    // Storage.
    let kv: KvHandle = match cfg.storage.as_str() {
        "memory" => Arc::new(MemoryKv::new()),
        _ => {
            let file_kv = Arc::new(
                FileKv::open(&cfg.data_dir.join("kv"))
                    .await
                    .context("opening key-value store")?,
            );
            file_kv.spawn_maintenance(KV_MAINTENANCE_INTERVAL);
            file_kv
        }
    };
    let blobs = Arc::new(
        BlobStore::open(&cfg.data_dir)
            .await
            .context("opening blob store")?,
    );

    // Identity.
    let keystore = match std::env::var("GOSSAMER_KEY_PASSWORD") {
        Ok(password) if !password.is_empty() => {
            KeyStore::with_password(Arc::clone(&kv), password)
        }
        _ => KeyStore::new(Arc::clone(&kv)),
    };
    let identity = Arc::new(keystore.get_or_generate().await?);
    info!(
        "node identity {}",
        hex::encode(identity.public_key_bytes())
    );

    let engine = Arc::new(Engine::new(&identity));

    // Transport and overlay core.
    let (transport, session_rx) = Transport::bind(cfg.listen_addr, Arc::clone(&identity))?;
    info!("listening on {}", transport.local_addr()?);

    let dispatcher = Dispatcher::new();
    let swarm = Swarm::new(
        Arc::clone(&identity),
        Arc::clone(&kv),
        Arc::clone(&transport),
        dispatcher.ingress_sender(),
        SwarmConfig {
            max_connections: cfg.max_connections,
        },
    );

    let gossip = GossipManager::new(Arc::clone(&swarm));
    let (chat, mut chat_rx) =
        ChatService::new(Arc::clone(&identity), engine, Arc::clone(&gossip));
    let discovery = DiscoveryService::new(Arc::clone(&swarm), Arc::clone(&gossip));

    dispatcher.register(CHAT_TAG, chat.clone()).await;
    dispatcher.register(DISCOVERY_TAG, discovery).await;
    dispatcher.start();

    swarm.spawn_registration_loop(session_rx);
    transport.spawn_accept_loop();

    // Surface delivered chat messages.
    tokio::spawn(async move {
        while let Some(chat) = chat_rx.recv().await {
            info!(
                from = %hex::encode(&chat.from),
                "chat: {}",
                String::from_utf8_lossy(&chat.plaintext)
            );
        }
    });

    // Informational external-address probe.
    if !cfg.stun_server.is_empty() {
        let server = cfg.stun_server.clone();
        tokio::spawn(async move {
            match probe::external_address(&server).await {
                Ok(addr) => info!("external address (STUN): {addr}"),
                Err(err) => warn!("external address probe failed: {err:#}"),
            }
        });
    }

    // Optional content import.
    if let Some(path) = args.import_file {
        let builder = DagBuilder::new(Arc::clone(&kv), Arc::clone(&blobs));
        let file = tokio::fs::File::open(&path)
            .await
            .with_context(|| format!("opening {}", path.display()))?;
        match builder.create_dag(file).await {
            Ok(root) => info!("imported {} as {root}", path.display()),
            Err(err) => error!("import of {} failed: {err}", path.display()),
        }
    }

    // Bootstrap connections.
    for addr in cfg.bootstrap.iter().chain(args.connect.iter()) {
        swarm.connect(*addr);
    }
    swarm.find_and_connect().await;

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    transport.shutdown();

    Ok(())
}
