//! Indexer configuration loaded from a file plus `CHAIN_INDEXER__*` overrides

use crate::error::{Error, Result};
use block_indexer::{ChainId, NewChain, DEFAULT_BLOCK_CACHE_SIZE};
use config::{Config, Environment, File};
use database_connector::DatabaseConfig;
use serde::{Deserialize, Deserializer};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "CHAIN_INDEXER";

#[derive(Debug, Clone, Deserialize)]
pub struct IndexerConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default = "default_block_cache_size")]
    pub block_cache_size: usize,

    #[serde(default)]
    pub chains: Vec<ChainConfig>,

    #[serde(default)]
    pub sources: Vec<SourceConfig>,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,

    /// Keep polling exhausted sources instead of exiting after one pass
    #[serde(default = "default_follow")]
    pub follow: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub id: u32,
    pub name: String,
    pub code3: String,

    /// Network magic of the chain's block files, four hex-encoded bytes
    #[serde(default, deserialize_with = "magic_from_hex")]
    pub magic: Option<[u8; 4]>,

    #[serde(default, deserialize_with = "bytes_from_hex")]
    pub address_version: Vec<u8>,

    #[serde(default = "default_policy")]
    pub policy: String,
}

/// A directory of `blkNNNNN.dat` files.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub dirname: PathBuf,

    /// Name of the chain every block of this source belongs to; when unset
    /// the chain is chosen by each frame's magic.
    #[serde(default)]
    pub chain: Option<String>,

    #[serde(default)]
    pub first_file: u32,
}

fn default_block_cache_size() -> usize {
    DEFAULT_BLOCK_CACHE_SIZE
}

fn default_poll_interval() -> u64 {
    10
}

fn default_follow() -> bool {
    true
}

fn default_policy() -> String {
    "Bitcoin".to_string()
}

fn bytes_from_hex<'de, D>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)
}

fn magic_from_hex<'de, D>(deserializer: D) -> std::result::Result<Option<[u8; 4]>, D::Error>
where
    D: Deserializer<'de>,
{
    let bytes = bytes_from_hex(deserializer)?;
    let magic: [u8; 4] = bytes.try_into().map_err(|bytes: Vec<u8>| {
        serde::de::Error::custom(format!("magic must be 4 bytes, got {}", bytes.len()))
    })?;
    Ok(Some(magic))
}

impl IndexerConfig {
    /// Load and validate the configuration at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config: IndexerConfig = Config::builder()
            .add_source(File::from(path).required(true))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_cache_size == 0 {
            return Err(Error::InvalidConfig("block_cache_size must be at least 1".to_string()));
        }

        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        let mut magics = HashSet::new();
        for chain in &self.chains {
            if !ids.insert(chain.id) {
                return Err(Error::InvalidConfig(format!("duplicate chain id {}", chain.id)));
            }
            if !names.insert(chain.name.as_str()) {
                return Err(Error::InvalidConfig(format!("duplicate chain name {}", chain.name)));
            }
            if let Some(magic) = chain.magic {
                if !magics.insert(magic) {
                    return Err(Error::InvalidConfig(format!(
                        "chain {} reuses magic {}",
                        chain.name,
                        hex::encode(magic)
                    )));
                }
            }
        }

        let mut sources = HashSet::new();
        for source in &self.sources {
            if !sources.insert(source.name.as_str()) {
                return Err(Error::InvalidConfig(format!("duplicate source name {}", source.name)));
            }
            match &source.chain {
                Some(chain) if !names.contains(chain.as_str()) => {
                    return Err(Error::InvalidConfig(format!(
                        "source {} refers to unknown chain {}",
                        source.name, chain
                    )));
                }
                None if magics.is_empty() => {
                    return Err(Error::InvalidConfig(format!(
                        "source {} names no chain and no chain has a magic",
                        source.name
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

impl ChainConfig {
    pub fn chain_id(&self) -> ChainId {
        ChainId(self.id)
    }

    pub fn to_new_chain(&self) -> NewChain {
        NewChain {
            id: self.chain_id(),
            name: self.name.clone(),
            code3: self.code3.clone(),
            magic: self.magic,
            address_version: self.address_version.clone(),
            policy: self.policy.clone(),
        }
    }
}
