//! Feeds block-file sources into the indexer, one committed block at a time

use crate::config::{IndexerConfig, SourceConfig};
use crate::error::{Error, Result};
use block_indexer::{BlockIndexer, ChainId, ImportStatus};
use block_parser::{BlockFileReader, BlockParser, StreamPosition};
use database_connector::DatabaseConnection;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

/// What one pass over every source did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundSummary {
    pub imported: usize,
    pub orphans: usize,
    pub duplicates: usize,
    /// Sources that hit a malformed record and were left where they stopped
    pub stalled: Vec<String>,
}

impl RoundSummary {
    pub fn blocks_seen(&self) -> usize {
        self.imported + self.orphans + self.duplicates
    }
}

pub struct Driver {
    indexer: BlockIndexer,
    parser: BlockParser,
    sources: Vec<SourceConfig>,
    chains_by_name: HashMap<String, ChainId>,
    chains_by_magic: HashMap<[u8; 4], ChainId>,
    shutdown: Arc<AtomicBool>,
}

impl Driver {
    /// Open the configured database and register every configured chain.
    pub fn open(config: &IndexerConfig) -> Result<Self> {
        let db = DatabaseConnection::new(config.database.clone())?;
        let indexer = BlockIndexer::new(db, config.block_cache_size)?;
        Self::new(indexer, config)
    }

    pub fn new(mut indexer: BlockIndexer, config: &IndexerConfig) -> Result<Self> {
        config.validate()?;

        let mut chains_by_name = HashMap::new();
        let mut chains_by_magic = HashMap::new();
        for chain in &config.chains {
            let registered = indexer.register_chain(chain.to_new_chain())?;
            chains_by_name.insert(registered.name.clone(), registered.id);
            if let Some(magic) = registered.magic {
                chains_by_magic.insert(magic, registered.id);
            }
        }

        Ok(Self {
            indexer,
            parser: BlockParser::new(),
            sources: config.sources.clone(),
            chains_by_name,
            chains_by_magic,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flag checked between blocks; setting it ends the current round early.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn indexer(&mut self) -> &mut BlockIndexer {
        &mut self.indexer
    }

    /// Read every source from its stored position until it is exhausted.
    ///
    /// Only errors that leave the index untrustworthy are returned; a
    /// malformed record stalls its source until the next round.
    pub fn run_round(&mut self) -> Result<RoundSummary> {
        let mut summary = RoundSummary::default();
        for source in self.sources.clone() {
            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }
            self.run_source(&source, &mut summary)?;
        }

        if summary.blocks_seen() > 0 {
            info!(
                "Round done: {} imported, {} orphaned, {} already known",
                summary.imported, summary.orphans, summary.duplicates
            );
        }
        Ok(summary)
    }

    fn run_source(&mut self, source: &SourceConfig, summary: &mut RoundSummary) -> Result<()> {
        let start = self
            .indexer
            .resume_position(&source.name)?
            .unwrap_or_else(|| StreamPosition::new(source.first_file, 0));
        debug!("Reading source {} from {}", source.name, start);

        let override_chain = match &source.chain {
            Some(name) => Some(*self.chains_by_name.get(name).ok_or_else(|| {
                Error::InvalidConfig(format!(
                    "source {} refers to unknown chain {}",
                    source.name, name
                ))
            })?),
            None => None,
        };

        let mut reader = BlockFileReader::new(&source.dirname, start);
        if override_chain.is_none() {
            reader = reader.with_magics(self.chains_by_magic.keys().copied().collect());
        }

        while !self.shutdown.load(Ordering::Relaxed) {
            let frame = match reader.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    error!("Source {} stopped at {}: {}", source.name, reader.position(), e);
                    summary.stalled.push(source.name.clone());
                    break;
                }
            };

            let record = match self.parser.parse_block(&frame.bytes, Some(frame.magic)) {
                Ok(record) => record,
                Err(e) => {
                    error!("Malformed block in {} at {}: {}", source.name, frame.position, e);
                    summary.stalled.push(source.name.clone());
                    break;
                }
            };

            let chains: Vec<ChainId> = override_chain
                .or_else(|| self.chains_by_magic.get(&frame.magic).copied())
                .into_iter()
                .collect();

            match self
                .indexer
                .import_block_at(&source.name, frame.next_position, &record, &chains)
            {
                Ok(outcome) => match outcome.status {
                    ImportStatus::Linked => summary.imported += 1,
                    ImportStatus::Orphan => summary.orphans += 1,
                    ImportStatus::Duplicate => summary.duplicates += 1,
                },
                Err(e) if e.is_fatal() => {
                    error!("Import of {} from {} failed: {}", record.hash, source.name, e);
                    return Err(e.into());
                }
                Err(e) => {
                    error!("Skipping rest of {} this round: {}", source.name, e);
                    summary.stalled.push(source.name.clone());
                    break;
                }
            }
        }
        Ok(())
    }
}
