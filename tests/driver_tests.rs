//! Driver rounds over hand-written block files

use block_indexer::ChainId;
use block_parser::{block_file_path, Hash256, StreamPosition};
use chain_indexer::{ChainConfig, Driver, IndexerConfig, SourceConfig};
use database_connector::DatabaseConfig;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

const REGTEST_MAGIC: [u8; 4] = [0xfa, 0xbf, 0xb5, 0xda];
const REGTEST_BITS: u32 = 0x207f_ffff;

fn chain_config() -> ChainConfig {
    ChainConfig {
        id: 1,
        name: "Regtest".to_string(),
        code3: "BRT".to_string(),
        magic: Some(REGTEST_MAGIC),
        address_version: vec![0x6f],
        policy: "Bitcoin".to_string(),
    }
}

fn config(dir: &Path, database: DatabaseConfig, chain: Option<&str>) -> IndexerConfig {
    IndexerConfig {
        database,
        block_cache_size: 64,
        chains: vec![chain_config()],
        sources: vec![SourceConfig {
            name: "regtest".to_string(),
            dirname: dir.to_path_buf(),
            chain: chain.map(str::to_string),
            first_file: 0,
        }],
        poll_interval_seconds: 1,
        follow: false,
    }
}

fn compact_size(out: &mut Vec<u8>, n: usize) {
    assert!(n < 0xfd);
    out.push(n as u8);
}

/// Serialized block holding one coinbase; returns the bytes and the block hash.
fn coinbase_block(prev: Hash256, time: u32, tag: u8, value: i64) -> (Vec<u8>, Hash256) {
    let mut tx = Vec::new();
    tx.extend(1i32.to_le_bytes());
    compact_size(&mut tx, 1);
    tx.extend([0u8; 32]);
    tx.extend(u32::MAX.to_le_bytes());
    compact_size(&mut tx, 2);
    tx.extend([0x01, tag]);
    tx.extend(u32::MAX.to_le_bytes());
    compact_size(&mut tx, 1);
    tx.extend(value.to_le_bytes());
    compact_size(&mut tx, 1);
    tx.push(0x51);
    tx.extend(0u32.to_le_bytes());

    let mut header = Vec::new();
    header.extend(1i32.to_le_bytes());
    header.extend(prev.as_bytes());
    header.extend(Hash256::double_sha256(&tx).as_bytes());
    header.extend(time.to_le_bytes());
    header.extend(REGTEST_BITS.to_le_bytes());
    header.extend(0u32.to_le_bytes());
    let hash = Hash256::double_sha256(&header);

    let mut block = header;
    compact_size(&mut block, 1);
    block.extend(tx);
    (block, hash)
}

fn frame(magic: [u8; 4], block: &[u8]) -> Vec<u8> {
    let mut out = magic.to_vec();
    out.extend((block.len() as u32).to_le_bytes());
    out.extend_from_slice(block);
    out
}

fn append(dir: &Path, file_number: u32, bytes: &[u8]) {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(block_file_path(dir, file_number))
        .unwrap();
    file.write_all(bytes).unwrap();
}

/// Genesis plus two blocks in `blk00000.dat`; returns the hashes.
fn write_three_blocks(dir: &Path) -> Vec<Hash256> {
    let mut prev = Hash256::ZERO;
    let mut hashes = Vec::new();
    for (i, value) in [0i64, 5_000_000_000, 5_000_000_000].into_iter().enumerate() {
        let (block, hash) = coinbase_block(prev, 1_000 + 600 * i as u32, i as u8, value);
        append(dir, 0, &frame(REGTEST_MAGIC, &block));
        hashes.push(hash);
        prev = hash;
    }
    hashes
}

#[test]
fn test_round_imports_and_resumes() {
    let blocks = tempfile::tempdir().unwrap();
    let hashes = write_three_blocks(blocks.path());
    let mut driver = Driver::open(&config(blocks.path(), DatabaseConfig::memory(), None)).unwrap();

    let summary = driver.run_round().unwrap();
    assert_eq!(summary.imported, 3);
    assert!(summary.stalled.is_empty());

    let tip = driver.indexer().chain_tip(ChainId(1)).unwrap().unwrap();
    assert_eq!(tip.hash, hashes[2]);
    assert_eq!(tip.height, Some(2));
    assert_eq!(tip.total_satoshis, Some(10_000_000_000));

    let end = fs::metadata(block_file_path(blocks.path(), 0)).unwrap().len();
    assert_eq!(
        driver.indexer().resume_position("regtest").unwrap(),
        Some(StreamPosition::new(0, end))
    );

    // Nothing new: the next round reads nothing
    assert_eq!(driver.run_round().unwrap().blocks_seen(), 0);

    // A block in the next file is picked up
    let (block, hash) = coinbase_block(hashes[2], 2_800, 3, 5_000_000_000);
    append(blocks.path(), 1, &frame(REGTEST_MAGIC, &block));
    assert_eq!(driver.run_round().unwrap().imported, 1);
    assert_eq!(driver.indexer().chain_tip(ChainId(1)).unwrap().unwrap().hash, hash);
    assert_eq!(
        driver.indexer().resume_position("regtest").unwrap(),
        Some(StreamPosition::new(1, 8 + block.len() as u64))
    );
    driver.indexer().verify_chain(ChainId(1)).unwrap();
}

#[test]
fn test_malformed_block_stalls_source_without_advancing() {
    let blocks = tempfile::tempdir().unwrap();
    let hashes = write_three_blocks(blocks.path());
    let good_end = fs::metadata(block_file_path(blocks.path(), 0)).unwrap().len();
    append(blocks.path(), 0, &frame(REGTEST_MAGIC, &[0u8; 10]));

    let mut driver = Driver::open(&config(blocks.path(), DatabaseConfig::memory(), None)).unwrap();
    let summary = driver.run_round().unwrap();
    assert_eq!(summary.imported, 3);
    assert_eq!(summary.stalled, vec!["regtest".to_string()]);
    assert_eq!(
        driver.indexer().resume_position("regtest").unwrap(),
        Some(StreamPosition::new(0, good_end))
    );
    assert_eq!(driver.indexer().chain_tip(ChainId(1)).unwrap().unwrap().hash, hashes[2]);

    // The next round stops at the same record again
    let summary = driver.run_round().unwrap();
    assert_eq!(summary.blocks_seen(), 0);
    assert_eq!(summary.stalled.len(), 1);
}

#[test]
fn test_truncated_frame_before_next_file_stalls_source() {
    let blocks = tempfile::tempdir().unwrap();
    let hashes = write_three_blocks(blocks.path());
    let good_end = fs::metadata(block_file_path(blocks.path(), 0)).unwrap().len();

    let (block, _) = coinbase_block(hashes[2], 2_800, 3, 5_000_000_000);
    let whole = frame(REGTEST_MAGIC, &block);
    append(blocks.path(), 0, &whole[..whole.len() - 4]);
    append(blocks.path(), 1, &whole);

    let mut driver = Driver::open(&config(blocks.path(), DatabaseConfig::memory(), None)).unwrap();
    let summary = driver.run_round().unwrap();
    assert_eq!(summary.imported, 3);
    assert_eq!(summary.stalled, vec!["regtest".to_string()]);
    assert_eq!(
        driver.indexer().resume_position("regtest").unwrap(),
        Some(StreamPosition::new(0, good_end))
    );
}

#[test]
fn test_unknown_magic_stalls_unless_chain_is_named() {
    let blocks = tempfile::tempdir().unwrap();
    let (genesis, hash) = coinbase_block(Hash256::ZERO, 1_000, 0, 0);
    append(blocks.path(), 0, &frame([1, 2, 3, 4], &genesis));

    let mut by_magic =
        Driver::open(&config(blocks.path(), DatabaseConfig::memory(), None)).unwrap();
    let summary = by_magic.run_round().unwrap();
    assert_eq!(summary.imported, 0);
    assert_eq!(summary.stalled.len(), 1);
    assert_eq!(by_magic.indexer().resume_position("regtest").unwrap(), None);

    let mut named = Driver::open(&config(
        blocks.path(),
        DatabaseConfig::memory(),
        Some("Regtest"),
    ))
    .unwrap();
    assert_eq!(named.run_round().unwrap().imported, 1);
    assert_eq!(named.indexer().chain_tip(ChainId(1)).unwrap().unwrap().hash, hash);
}

#[test]
fn test_reopened_index_continues_from_checkpoint() {
    let blocks = tempfile::tempdir().unwrap();
    let index = tempfile::tempdir().unwrap();
    let database = DatabaseConfig::sqlite(index.path().join("index.sqlite"));
    let hashes = write_three_blocks(blocks.path());

    {
        let mut driver = Driver::open(&config(blocks.path(), database.clone(), None)).unwrap();
        assert_eq!(driver.run_round().unwrap().imported, 3);
    }

    let mut driver = Driver::open(&config(blocks.path(), database, None)).unwrap();
    assert_eq!(driver.run_round().unwrap().blocks_seen(), 0);
    assert_eq!(driver.indexer().chain_tip(ChainId(1)).unwrap().unwrap().hash, hashes[2]);
    assert_eq!(driver.indexer().chains().unwrap().len(), 1);
}

#[test]
fn test_shutdown_flag_stops_between_blocks() {
    let blocks = tempfile::tempdir().unwrap();
    write_three_blocks(blocks.path());

    let mut driver = Driver::open(&config(blocks.path(), DatabaseConfig::memory(), None)).unwrap();
    driver
        .shutdown_handle()
        .store(true, std::sync::atomic::Ordering::Relaxed);
    assert_eq!(driver.run_round().unwrap().blocks_seen(), 0);
    assert_eq!(driver.indexer().resume_position("regtest").unwrap(), None);
}
