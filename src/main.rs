#![deny(dead_code)]
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::{debug, info, LevelFilter};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

mod utils;

use chainpost::{
    config::ClientConfig,
    crypto::keystore::KeyStore,
    identity::IdentityResolver,
    ledger::{reconcile::EventReconciler, rpc::RpcLedgerClient, LedgerClient},
    models::Address,
    payload::{KeyRing, PayloadDecoder},
    preferences::{JsonFilePreferenceStore, UserPreferences},
    storage::{http::HttpTransport, tiered::TieredBlobStore, BlobStore, BlobTransport},
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Network {
    Testnet,
    Mainnet,
    Localnet,
}

/// Command line arguments for chainpost
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "chainpost: read on-chain conversations and manage off-chain blobs."
)]
struct Args {
    /// Config file; defaults to the user config directory
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Use built-in settings for a network instead of the config file
    #[arg(long, value_enum)]
    network: Option<Network>,

    /// Append log lines to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    log_file: Option<String>,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show (creating if needed) the encryption key pair for an address
    Keygen { owner: String },
    /// Print the conversation between two addresses
    Messages {
        me: String,
        peer: String,
        /// Peer's published public key (base64), to read encrypted messages
        #[arg(long)]
        peer_key: Option<String>,
    },
    /// List conversation partners of an address
    Chats { me: String },
    /// Upload a file and print its blob id
    BlobPut {
        file: PathBuf,
        #[arg(long)]
        epochs: Option<u32>,
    },
    /// Download a blob to a file or stdout
    BlobGet {
        blob_id: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Show or change local preferences
    Prefs {
        #[arg(long)]
        display_name: Option<String>,
        #[arg(long)]
        disable_popup: Option<bool>,
    },
}

fn load_config(args: &Args) -> Result<ClientConfig> {
    if let Some(network) = args.network {
        return Ok(match network {
            Network::Testnet => ClientConfig::testnet(),
            Network::Mainnet => ClientConfig::mainnet(),
            Network::Localnet => ClientConfig::localnet(),
        });
    }
    let path = match &args.config {
        Some(path) => path.clone(),
        None => ClientConfig::default_path()?,
    };
    Ok(ClientConfig::load_or_default(&path)?)
}

fn parse_address(raw: &str) -> Result<Address> {
    Address::parse(raw).with_context(|| format!("'{}' is not an address", raw))
}

fn open_preferences() -> Result<Arc<JsonFilePreferenceStore>> {
    let path = JsonFilePreferenceStore::default_path().ok_or_else(|| anyhow!("Could not determine data directory"))?;
    Ok(Arc::new(JsonFilePreferenceStore::open(path)?))
}

fn build_blob_store(config: &ClientConfig) -> Result<Arc<TieredBlobStore>> {
    let timeout = config.storage.request_timeout_secs.map(Duration::from_secs);
    let transport: Arc<dyn BlobTransport> = Arc::new(HttpTransport::new(timeout)?);

    let primary = BlobStore::new(config.storage.endpoints.clone(), transport.clone());
    let secondary = (!config.storage.secondary_endpoints.is_empty())
        .then(|| BlobStore::new(config.storage.secondary_endpoints.clone(), transport));
    Ok(Arc::new(TieredBlobStore::new(primary, secondary)))
}

fn build_reconciler(config: &ClientConfig) -> Result<EventReconciler> {
    let timeout = config.rpc_timeout_secs.map(Duration::from_secs);
    let ledger: Arc<dyn LedgerClient> = Arc::new(RpcLedgerClient::new(&config.rpc_url, timeout)?);
    let identities = Arc::new(IdentityResolver::new(
        ledger.clone(),
        &config.program.identity_object_type(),
        config.page_size,
        config.rename,
    ));
    let decoder = PayloadDecoder::new(Some(build_blob_store(config)?));

    Ok(EventReconciler::new(
        ledger,
        identities,
        decoder,
        config.program.message_types(),
        config.page_size,
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    utils::setup_logging(args.log_file.as_deref(), level)?;

    let config = load_config(&args)?;
    debug!("Using ledger at {}", config.rpc_url);

    match &args.command {
        Command::Keygen { owner } => {
            let owner = parse_address(owner)?;
            let keys = KeyStore::new(open_preferences()?);
            let (pair, generated) = keys.load_or_generate(&owner)?;
            if generated {
                info!("New key pair stored for {}", owner.short());
            }
            println!("{}", pair.public_key_base64());
        }
        Command::Messages { me, peer, peer_key } => {
            let me = parse_address(me)?;
            let peer = parse_address(peer)?;

            let mut ring = KeyRing::new();
            if let Some(peer_key) = peer_key {
                let keys = KeyStore::new(open_preferences()?);
                let shared = keys
                    .shared_key_with(&me, peer_key)?
                    .ok_or_else(|| anyhow!("No key pair stored for {}; run keygen first", me))?;
                ring.insert(peer.clone(), shared);
            }

            let reconciler = build_reconciler(&config)?;
            for message in reconciler.fetch_messages(&me, &peer, &ring).await? {
                let who = if message.sender == me { "me" } else { "them" };
                println!(
                    "[{}] {}: {}",
                    message.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    who,
                    message.content
                );
            }
        }
        Command::Chats { me } => {
            let me = parse_address(me)?;
            let reconciler = build_reconciler(&config)?;
            for chat in reconciler.fetch_recent_chats(&me, &KeyRing::new()).await? {
                println!(
                    "{}  {}  {}",
                    chat.peer_address.short(),
                    chat.display_name,
                    chat.last_message_preview
                );
            }
        }
        Command::BlobPut { file, epochs } => {
            let data = std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
            let mut options = config.storage.store_options();
            if let Some(epochs) = epochs {
                options.epochs = *epochs;
            }
            let store = build_blob_store(&config)?;
            let (record, tier) = store.store(&data, options).await?;
            info!("Stored {} bytes via {} ({:?})", record.size, record.endpoint, tier);
            println!("{}", record.blob_id);
        }
        Command::BlobGet { blob_id, out } => {
            let store = build_blob_store(&config)?;
            let data = store.retrieve(blob_id).await?;
            match out {
                Some(path) => std::fs::write(path, &data)?,
                None => {
                    use std::io::Write;
                    std::io::stdout().write_all(&data)?;
                }
            }
        }
        Command::Prefs {
            display_name,
            disable_popup,
        } => {
            let store = open_preferences()?;
            let mut prefs = UserPreferences::load(store.as_ref())?;
            if display_name.is_some() || disable_popup.is_some() {
                if let Some(name) = display_name {
                    prefs.display_name = Some(name.clone()).filter(|n| !n.trim().is_empty());
                }
                if let Some(flag) = disable_popup {
                    prefs.disable_popup = *flag;
                }
                prefs.save(store.as_ref())?;
            }
            println!("{}", serde_json::to_string_pretty(&prefs)?);
        }
    }

    Ok(())
}
