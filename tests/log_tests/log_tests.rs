//! Tests for the append-only Log
//!
//! These tests verify:
//! - Configuration validation at open
//! - Append/read by address, including reads spanning cache pages
//! - Segment sealing and rollover
//! - Iteration, segment removal and close semantics
//! - Rollback of torn appends
//! - Appends and reads from many threads

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use logvfs::config::SyncStrategy;
use logvfs::io::{DataWriter, MemoryDataWriter, MemoryStorage};
use logvfs::log::{Loggable, NO_STRUCTURE_ID};
use logvfs::{Log, LogConfig, Result, StoreError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

const FILE_SIZE: u64 = 4096;
const PAGE_SIZE: u32 = 1024;

fn open_memory_log(storage: &MemoryStorage) -> Log {
    let config = LogConfig::with_sizes(FILE_SIZE, PAGE_SIZE);
    Log::open(config, storage.reader(), storage.writer()).unwrap()
}

/// Switches shared between a test and its [`FaultyWriter`]
#[derive(Clone, Default)]
struct WriteFaults {
    /// Write only half of the next append
    short_next: Arc<AtomicBool>,
    /// Refuse every truncate
    fail_truncate: Arc<AtomicBool>,
}

struct FaultyWriter {
    inner: MemoryDataWriter,
    faults: WriteFaults,
}

impl DataWriter for FaultyWriter {
    fn open_segment(&mut self, start: u64) -> Result<()> {
        self.inner.open_segment(start)
    }

    fn append(&mut self, bytes: &[u8]) -> Result<usize> {
        if self.faults.short_next.swap(false, Ordering::SeqCst) {
            return self.inner.append(&bytes[..bytes.len() / 2]);
        }
        self.inner.append(bytes)
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }

    fn sync(&mut self) -> Result<()> {
        self.inner.sync()
    }

    fn truncate_segment(&mut self, start: u64, len: u64) -> Result<()> {
        if self.faults.fail_truncate.load(Ordering::SeqCst) {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::Other,
                "truncate refused",
            )));
        }
        self.inner.truncate_segment(start, len)
    }

    fn remove_segment(&mut self, start: u64) -> Result<()> {
        self.inner.remove_segment(start)
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}

fn open_faulty_log(storage: &MemoryStorage) -> (Log, WriteFaults) {
    let faults = WriteFaults::default();
    let writer = FaultyWriter {
        inner: storage.writer(),
        faults: faults.clone(),
    };
    let config = LogConfig::with_sizes(FILE_SIZE, PAGE_SIZE);
    (Log::open(config, storage.reader(), writer).unwrap(), faults)
}

/// Payload whose encoded loggable (no structure id) is exactly `total` bytes
fn payload_for_total(total: usize, fill: u8) -> Vec<u8> {
    vec![fill; total - Loggable::header_size(NO_STRUCTURE_ID)]
}

// =============================================================================
// Configuration Tests
// =============================================================================

#[test]
fn test_open_rejects_page_not_dividing_file() {
    let storage = MemoryStorage::new();
    let config = LogConfig::with_sizes(1024, 2048);
    let result = Log::open(config, storage.reader(), storage.writer());
    assert!(matches!(result, Err(StoreError::Config(_))));
}

#[test]
fn test_open_rejects_non_power_of_two() {
    let storage = MemoryStorage::new();
    let config = LogConfig::with_sizes(3000, 1000);
    let result = Log::open(config, storage.reader(), storage.writer());
    assert!(matches!(result, Err(StoreError::Config(_))));
}

#[test]
fn test_open_rejects_zero_sizes() {
    let storage = MemoryStorage::new();
    for config in [LogConfig::with_sizes(0, 1024), LogConfig::with_sizes(4096, 0)] {
        let result = Log::open(config, storage.reader(), storage.writer());
        assert!(matches!(result, Err(StoreError::Config(_))));
    }
}

#[test]
fn test_open_rejects_zero_sync_count() {
    let storage = MemoryStorage::new();
    let mut config = LogConfig::with_sizes(FILE_SIZE, PAGE_SIZE);
    config.sync_strategy = SyncStrategy::EveryNEntries { count: 0 };
    let result = Log::open(config, storage.reader(), storage.writer());
    assert!(matches!(result, Err(StoreError::Config(_))));
}

// =============================================================================
// Append / Read Tests
// =============================================================================

#[test]
fn test_append_and_read() {
    let storage = MemoryStorage::new();
    let log = open_memory_log(&storage);

    let a = log.append(1, NO_STRUCTURE_ID, b"first").unwrap();
    let b = log.append(2, 77, b"second").unwrap();

    assert_eq!(a, 0);
    assert_eq!(b, Loggable::encoded_len(NO_STRUCTURE_ID, 5));

    let first = log.read(a).unwrap();
    assert_eq!(first.loggable_type, 1);
    assert_eq!(first.structure_id, NO_STRUCTURE_ID);
    assert_eq!(&first.payload[..], b"first");

    let second = log.read(b).unwrap();
    assert_eq!(second.loggable_type, 2);
    assert_eq!(second.structure_id, 77);
    assert!(second.has_structure());
    assert_eq!(&second.payload[..], b"second");
}

#[test]
fn test_read_spanning_pages() {
    let storage = MemoryStorage::new();
    let log = open_memory_log(&storage);

    let payload: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();
    log.append(1, NO_STRUCTURE_ID, b"lead").unwrap();
    let address = log.append(1, NO_STRUCTURE_ID, &payload).unwrap();

    assert_eq!(&log.read(address).unwrap().payload[..], &payload[..]);
}

#[test]
fn test_read_beyond_high_address() {
    let storage = MemoryStorage::new();
    let log = open_memory_log(&storage);
    log.append(1, NO_STRUCTURE_ID, b"only").unwrap();

    let high = log.high_address();
    match log.read(high) {
        Err(StoreError::InvalidAddress {
            address,
            high_address,
        }) => {
            assert_eq!(address, high);
            assert_eq!(high_address, high);
        }
        other => panic!("expected InvalidAddress, got {other:?}"),
    }
}

#[test]
fn test_record_too_large() {
    let storage = MemoryStorage::new();
    let log = open_memory_log(&storage);

    let result = log.append(1, NO_STRUCTURE_ID, &vec![0u8; FILE_SIZE as usize]);
    assert!(matches!(result, Err(StoreError::RecordTooLarge { .. })));
    assert_eq!(log.high_address(), 0);
}

#[test]
fn test_record_filling_whole_segment() {
    let storage = MemoryStorage::new();
    let log = open_memory_log(&storage);

    let full = payload_for_total(FILE_SIZE as usize, 9);
    assert_eq!(log.append(1, NO_STRUCTURE_ID, &full).unwrap(), 0);
    assert_eq!(log.append(1, NO_STRUCTURE_ID, b"next").unwrap(), FILE_SIZE);
    assert_eq!(log.segment_count(), 2);
}

#[test]
fn test_full_pages_are_cached() {
    let storage = MemoryStorage::new();
    let log = open_memory_log(&storage);
    let address = log.append(1, NO_STRUCTURE_ID, &payload_for_total(2000, 1)).unwrap();

    log.read(address).unwrap();
    let after_first = log.cache_stats();
    log.read(address).unwrap();
    let after_second = log.cache_stats();

    assert!(after_first.pages >= 1);
    assert!(after_second.hits > after_first.hits);
}

// =============================================================================
// Segment Rollover Tests
// =============================================================================

#[test]
fn test_three_records_seal_first_segment() {
    let storage = MemoryStorage::new();
    let log = open_memory_log(&storage);

    let a = log.append(1, NO_STRUCTURE_ID, &payload_for_total(1000, 1)).unwrap();
    let b = log.append(1, NO_STRUCTURE_ID, &payload_for_total(1000, 2)).unwrap();
    let c = log.append(1, NO_STRUCTURE_ID, &payload_for_total(2200, 3)).unwrap();

    assert_eq!(a, 0);
    assert_eq!(b, 1000);
    // 2000 + 2200 crosses 4096: the segment is sealed and the record moves
    assert_eq!(c, 4096);

    assert_eq!(storage.segment_len(0), Some(FILE_SIZE as usize));
    assert_eq!(storage.segment_len(4096), Some(2200));
    assert_eq!(log.high_address(), 4096 + 2200);

    assert_eq!(&log.read(a).unwrap().payload[..], &payload_for_total(1000, 1)[..]);
    assert_eq!(&log.read(b).unwrap().payload[..], &payload_for_total(1000, 2)[..]);
    assert_eq!(&log.read(c).unwrap().payload[..], &payload_for_total(2200, 3)[..]);
}

#[test]
fn test_rollover_addresses_in_distinct_segments() {
    let storage = MemoryStorage::new();
    let log = open_memory_log(&storage);

    let mut addresses = Vec::new();
    for i in 0..20u8 {
        addresses.push(log.append(1, NO_STRUCTURE_ID, &vec![i; 900]).unwrap());
    }

    for pair in addresses.windows(2) {
        assert!(pair[0] < pair[1]);
    }
    for (i, &address) in addresses.iter().enumerate() {
        let loggable = log.read(address).unwrap();
        // Never split across a segment boundary
        assert_eq!(address / FILE_SIZE, (loggable.end_address() - 1) / FILE_SIZE);
        assert_eq!(&loggable.payload[..], &vec![i as u8; 900][..]);
    }
    assert!(log.segment_count() > 1);
}

// =============================================================================
// Iteration Tests
// =============================================================================

#[test]
fn test_iter_skips_padding() {
    let storage = MemoryStorage::new();
    let log = open_memory_log(&storage);

    let mut expected = Vec::new();
    for i in 0..10u8 {
        expected.push(log.append(1 + i % 3, NO_STRUCTURE_ID, &vec![i; 1500]).unwrap());
    }

    let found: Vec<u64> = log
        .iter(0)
        .map(|l| l.unwrap().address)
        .collect();
    assert_eq!(found, expected);
}

#[test]
fn test_iter_from_middle() {
    let storage = MemoryStorage::new();
    let log = open_memory_log(&storage);
    log.append(1, NO_STRUCTURE_ID, b"a").unwrap();
    let b = log.append(1, NO_STRUCTURE_ID, b"b").unwrap();
    log.append(1, NO_STRUCTURE_ID, b"c").unwrap();

    let payloads: Vec<Vec<u8>> = log
        .iter(b)
        .map(|l| l.unwrap().payload.to_vec())
        .collect();
    assert_eq!(payloads, vec![b"b".to_vec(), b"c".to_vec()]);
}

#[test]
fn test_remove_segment() {
    let storage = MemoryStorage::new();
    let log = open_memory_log(&storage);
    let first = log.append(1, NO_STRUCTURE_ID, &payload_for_total(3000, 1)).unwrap();
    let second = log.append(1, NO_STRUCTURE_ID, &payload_for_total(3000, 2)).unwrap();
    assert_eq!(second, FILE_SIZE);

    log.remove_segment(0).unwrap();

    assert_eq!(log.segment_count(), 1);
    assert_eq!(log.first_address(), FILE_SIZE);
    assert!(matches!(log.read(first), Err(StoreError::Io(_))));
    let remaining: Vec<u64> = log.iter(0).map(|l| l.unwrap().address).collect();
    assert_eq!(remaining, vec![second]);
}

#[test]
fn test_remove_tail_segment_rejected() {
    let storage = MemoryStorage::new();
    let log = open_memory_log(&storage);
    log.append(1, NO_STRUCTURE_ID, b"tail").unwrap();

    assert!(matches!(
        log.remove_segment(0),
        Err(StoreError::InvalidArgument(_))
    ));
}

// =============================================================================
// Sync and Close Tests
// =============================================================================

#[test]
fn test_every_n_entries_sync() {
    let storage = MemoryStorage::new();
    let mut config = LogConfig::with_sizes(FILE_SIZE, PAGE_SIZE);
    config.sync_strategy = SyncStrategy::EveryNEntries { count: 3 };
    let log = Log::open(config, storage.reader(), storage.writer()).unwrap();

    log.append(1, NO_STRUCTURE_ID, b"1").unwrap();
    log.append(1, NO_STRUCTURE_ID, b"2").unwrap();
    assert_eq!(log.uncommitted_count(), 2);

    log.append(1, NO_STRUCTURE_ID, b"3").unwrap();
    assert_eq!(log.uncommitted_count(), 0);

    log.append(1, NO_STRUCTURE_ID, b"4").unwrap();
    log.flush().unwrap();
    assert_eq!(log.uncommitted_count(), 0);
}

#[test]
fn test_close_is_idempotent() {
    let storage = MemoryStorage::new();
    let log = open_memory_log(&storage);
    let address = log.append(1, NO_STRUCTURE_ID, b"x").unwrap();

    log.close().unwrap();
    log.close().unwrap();

    assert!(log.is_closed());
    assert!(matches!(log.read(address), Err(StoreError::LogClosed)));
    assert!(matches!(
        log.append(1, NO_STRUCTURE_ID, b"y"),
        Err(StoreError::LogClosed)
    ));
}

#[test]
fn test_file_log_survives_reopen() {
    let temp = TempDir::new().unwrap();
    let config = LogConfig::with_sizes(FILE_SIZE, PAGE_SIZE);

    let addresses: Vec<u64> = {
        let log = Log::open_dir(temp.path(), config.clone()).unwrap();
        let addresses = (0..12u8)
            .map(|i| log.append(1, 5, &vec![i; 700]).unwrap())
            .collect();
        log.close().unwrap();
        addresses
    };

    let log = Log::open_dir(temp.path(), config).unwrap();
    assert!(!log.recovery().was_truncated());
    for (i, &address) in addresses.iter().enumerate() {
        let loggable = log.read(address).unwrap();
        assert_eq!(loggable.structure_id, 5);
        assert_eq!(&loggable.payload[..], &vec![i as u8; 700][..]);
    }

    let segment_files = log.segment_files().unwrap();
    assert_eq!(segment_files.len(), log.segment_count());
    assert!(segment_files.iter().all(|s| s.path.is_some()));
}

// =============================================================================
// Torn Append Tests
// =============================================================================

#[test]
fn test_short_append_is_rolled_back() {
    let storage = MemoryStorage::new();
    let (log, faults) = open_faulty_log(&storage);

    let a = log.append(1, NO_STRUCTURE_ID, b"first").unwrap();
    let end_of_a = log.high_address();

    faults.short_next.store(true, Ordering::SeqCst);
    assert!(matches!(
        log.append(1, NO_STRUCTURE_ID, &[7u8; 40]),
        Err(StoreError::Io(_))
    ));
    assert_eq!(log.high_address(), end_of_a);
    assert_eq!(storage.segment_len(0), Some(end_of_a as usize));

    // The next record takes the address the torn one would have had
    let c = log.append(1, NO_STRUCTURE_ID, b"third").unwrap();
    assert_eq!(c, end_of_a);
    assert_eq!(&log.read(a).unwrap().payload[..], b"first");
    assert_eq!(&log.read(c).unwrap().payload[..], b"third");
    assert_eq!(log.iter(0).count(), 2);
}

#[test]
fn test_short_padding_is_rolled_back() {
    let storage = MemoryStorage::new();
    let (log, faults) = open_faulty_log(&storage);
    log.append(1, NO_STRUCTURE_ID, &payload_for_total(3000, 1))
        .unwrap();

    // The record does not fit, so the padding write comes first and tears
    faults.short_next.store(true, Ordering::SeqCst);
    assert!(log
        .append(1, NO_STRUCTURE_ID, &payload_for_total(2000, 2))
        .is_err());
    assert_eq!(log.high_address(), 3000);
    assert_eq!(storage.segment_len(0), Some(3000));

    let address = log
        .append(1, NO_STRUCTURE_ID, &payload_for_total(2000, 2))
        .unwrap();
    assert_eq!(address, FILE_SIZE);
    assert_eq!(log.read(address).unwrap().payload[0], 2);
    assert_eq!(log.iter(0).count(), 2);
}

#[test]
fn test_failed_rollback_marks_log_failed() {
    let storage = MemoryStorage::new();
    let end_of_a = {
        let (log, faults) = open_faulty_log(&storage);
        let a = log.append(1, NO_STRUCTURE_ID, b"kept").unwrap();

        faults.short_next.store(true, Ordering::SeqCst);
        faults.fail_truncate.store(true, Ordering::SeqCst);
        assert!(log.append(1, NO_STRUCTURE_ID, &[9u8; 40]).is_err());

        assert!(matches!(
            log.append(1, NO_STRUCTURE_ID, b"later"),
            Err(StoreError::LogFailed)
        ));
        assert!(matches!(log.read(a), Err(StoreError::LogFailed)));
        log.close().unwrap();
        Loggable::encoded_len(NO_STRUCTURE_ID, 4)
    };

    // Reopening drops the torn half-record
    let log = open_memory_log(&storage);
    assert!(log.recovery().was_truncated());
    assert_eq!(log.high_address(), end_of_a);
    assert_eq!(log.append(1, NO_STRUCTURE_ID, b"next").unwrap(), end_of_a);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_appends_and_reads() {
    const THREADS: usize = 4;
    const PER_THREAD: usize = 60;

    let storage = MemoryStorage::new();
    let log = Arc::new(open_memory_log(&storage));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let log = Arc::clone(&log);
            thread::spawn(move || {
                let mut written: Vec<(u64, Vec<u8>)> = Vec::with_capacity(PER_THREAD);
                for i in 0..PER_THREAD {
                    let payload = vec![(t * PER_THREAD + i) as u8; 20 + (i * 37 + t * 11) % 900];
                    let address = log.append(1 + t as u8, NO_STRUCTURE_ID, &payload).unwrap();

                    // Read an earlier record back while the others keep appending
                    if let Some((earlier, expected)) = written.get(i / 2) {
                        assert_eq!(&log.read(*earlier).unwrap().payload[..], &expected[..]);
                    }
                    written.push((address, payload));
                }
                written
            })
        })
        .collect();

    let mut records: Vec<(u64, Vec<u8>)> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    records.sort_by_key(|(address, _)| *address);
    assert_eq!(records.len(), THREADS * PER_THREAD);

    for pair in records.windows(2) {
        let end = pair[0].0 + Loggable::encoded_len(NO_STRUCTURE_ID, pair[0].1.len());
        assert!(end <= pair[1].0, "records at {} and {} overlap", pair[0].0, pair[1].0);
    }
    for (address, payload) in &records {
        let last_byte = address + Loggable::encoded_len(NO_STRUCTURE_ID, payload.len()) - 1;
        assert_eq!(address / FILE_SIZE, last_byte / FILE_SIZE);
        assert_eq!(&log.read(*address).unwrap().payload[..], &payload[..]);
    }
    assert_eq!(log.iter(0).count(), THREADS * PER_THREAD);
}
