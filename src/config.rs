// src/config.rs
//! Client configuration: which ledger, which on-chain program, which storage endpoints.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::RenamePolicy;
use crate::ledger::reconcile::MessageTypes;
use crate::storage::{StorageEndpoint, StoreOptions};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// The deployed messaging program
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramConfig {
    pub package_id: String,
    pub messaging_module: String,
    pub identity_module: String,
    pub message_event: String,
    pub message_struct: String,
    pub identity_struct: String,
}

impl Default for ProgramConfig {
    fn default() -> Self {
        Self {
            package_id: "0x0".to_string(),
            messaging_module: "messaging".to_string(),
            identity_module: "identity".to_string(),
            message_event: "MessageCreated".to_string(),
            message_struct: "Message".to_string(),
            identity_struct: "Identity".to_string(),
        }
    }
}

impl ProgramConfig {
    pub fn message_event_type(&self) -> String {
        format!("{}::{}::{}", self.package_id, self.messaging_module, self.message_event)
    }

    pub fn message_object_type(&self) -> String {
        format!("{}::{}::{}", self.package_id, self.messaging_module, self.message_struct)
    }

    pub fn identity_object_type(&self) -> String {
        format!("{}::{}::{}", self.package_id, self.identity_module, self.identity_struct)
    }

    pub fn message_types(&self) -> MessageTypes {
        MessageTypes {
            event_type: self.message_event_type(),
            object_type: self.message_object_type(),
        }
    }

    /// Fully qualified entry function
    pub fn target(&self, module: &str, function: &str) -> String {
        format!("{}::{}::{}", self.package_id, module, function)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Tried in order on every call
    pub endpoints: Vec<StorageEndpoint>,
    /// Used only when every primary endpoint fails
    #[serde(default)]
    pub secondary_endpoints: Vec<StorageEndpoint>,
    pub default_epochs: u32,
    #[serde(default)]
    pub deletable: bool,
    pub request_timeout_secs: Option<u64>,
}

impl StorageConfig {
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            epochs: self.default_epochs,
            deletable: self.deletable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub rpc_url: String,
    pub rpc_timeout_secs: Option<u64>,
    pub program: ProgramConfig,
    pub storage: StorageConfig,
    /// Page size for event and object queries
    pub page_size: u32,
    /// Encoded content above this many bytes goes to blob storage
    pub inline_content_limit: usize,
    pub rename: RenamePolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::testnet()
    }
}

impl ClientConfig {
    pub fn testnet() -> Self {
        Self {
            rpc_url: "https://fullnode.testnet.sui.io:443".to_string(),
            rpc_timeout_secs: Some(30),
            program: ProgramConfig::default(),
            storage: StorageConfig {
                endpoints: vec![
                    StorageEndpoint::new(
                        "https://publisher.walrus-testnet.walrus.space",
                        "https://aggregator.walrus-testnet.walrus.space",
                    ),
                    StorageEndpoint::new(
                        "https://wal-publisher-testnet.staketab.org",
                        "https://wal-aggregator-testnet.staketab.org",
                    ),
                ],
                secondary_endpoints: Vec::new(),
                default_epochs: 5,
                deletable: false,
                request_timeout_secs: Some(60),
            },
            page_size: 50,
            inline_content_limit: 1024,
            rename: RenamePolicy::default(),
        }
    }

    pub fn mainnet() -> Self {
        Self {
            rpc_url: "https://fullnode.mainnet.sui.io:443".to_string(),
            storage: StorageConfig {
                endpoints: vec![StorageEndpoint::new(
                    "https://publisher.walrus-mainnet.walrus.space",
                    "https://aggregator.walrus-mainnet.walrus.space",
                )],
                ..Self::testnet().storage
            },
            ..Self::testnet()
        }
    }

    /// Local validator and storage daemon on their default ports
    pub fn localnet() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:9000".to_string(),
            storage: StorageConfig {
                endpoints: vec![StorageEndpoint::new("http://127.0.0.1:31415", "http://127.0.0.1:31415")],
                secondary_endpoints: Vec::new(),
                default_epochs: 1,
                deletable: true,
                request_timeout_secs: Some(10),
            },
            ..Self::testnet()
        }
    }

    pub fn default_path() -> Result<PathBuf, ConfigError> {
        Ok(dirs::config_dir()
            .ok_or(ConfigError::NoConfigDir)?
            .join("chainpost")
            .join("config.json"))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut contents = String::new();
        File::open(path)?.read_to_string(&mut contents)?;

        let config: ClientConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load `path` if it exists, otherwise the testnet defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;

        info!("Config saved to {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rpc_url.trim().is_empty() {
            return Err(ConfigError::Invalid("rpc_url is empty".to_string()));
        }
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("page_size must be positive".to_string()));
        }
        if self.storage.endpoints.is_empty() {
            return Err(ConfigError::Invalid("at least one storage endpoint is required".to_string()));
        }
        if self.storage.default_epochs == 0 {
            return Err(ConfigError::Invalid("default_epochs must be positive".to_string()));
        }
        Ok(())
    }
}
