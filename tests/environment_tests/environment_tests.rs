//! Tests for Environment
//!
//! These tests verify:
//! - Opening validates the configuration
//! - Files survive a close and reopen of the data directory
//! - Converters installed at open apply to stored clusters
//! - Close is idempotent and later operations fail

use std::sync::Arc;

use logvfs::backup::{run_backup, Backupable};
use logvfs::environment::{CONTENTS_STRUCTURE_ID, PATHS_STRUCTURE_ID};
use logvfs::vfs::{ChecksumConverter, ClusterSettings};
use logvfs::{ClusteringStrategy, Config, Environment, StoreError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn small_config(dir: &TempDir) -> Config {
    Config::builder()
        .data_dir(dir.path())
        .file_size(4096)
        .cache_page_size(512)
        .clustering(ClusteringStrategy::linear(64))
        .build()
}

// =============================================================================
// Open Tests
// =============================================================================

#[test]
fn test_open_empty_directory() {
    let dir = TempDir::new().unwrap();
    let env = Environment::open(small_config(&dir)).unwrap();

    assert_eq!(env.vfs().file_count(), 0);
    assert_eq!(env.log().high_address(), 0);
    assert!(!env.is_closed());
}

#[test]
fn test_open_creates_missing_directory() {
    let dir = TempDir::new().unwrap();
    let nested = dir.path().join("a").join("b");
    let env = Environment::open_path(&nested).unwrap();

    env.vfs().create_file("f").unwrap();
    assert!(nested.is_dir());
}

#[test]
fn test_open_rejects_bad_log_config() {
    let dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(dir.path())
        .file_size(4096)
        .cache_page_size(1000)
        .build();
    assert!(matches!(Environment::open(config), Err(StoreError::Config(_))));
}

#[test]
fn test_open_rejects_bad_clustering() {
    let dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(dir.path())
        .clustering(ClusteringStrategy::growing(1024, 512))
        .build();
    assert!(matches!(Environment::open(config), Err(StoreError::Config(_))));
}

#[test]
fn test_open_rejects_clusters_larger_than_segments() {
    let dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(dir.path())
        .file_size(4096)
        .cache_page_size(512)
        .clustering(ClusteringStrategy::linear(4096))
        .build();
    assert!(matches!(Environment::open(config), Err(StoreError::Config(_))));
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_files_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let content: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
    {
        let env = Environment::open(small_config(&dir)).unwrap();
        let file = env.vfs().create_file("docs/readme").unwrap();
        env.vfs().write(&file, 0, &content).unwrap();
        env.vfs().create_file("empty").unwrap();
        env.close().unwrap();
    }

    let env = Environment::open(small_config(&dir)).unwrap();
    let mut names = env.vfs().file_names().unwrap();
    names.sort();
    assert_eq!(names, vec!["docs/readme", "empty"]);

    let file = env.vfs().open_existing_file("docs/readme").unwrap();
    assert_eq!(env.vfs().read_all(&file).unwrap(), content);
}

#[test]
fn test_descriptors_not_reused_after_reopen() {
    let dir = TempDir::new().unwrap();
    let first = {
        let env = Environment::open(small_config(&dir)).unwrap();
        env.vfs().create_file("a").unwrap().descriptor()
    };

    let env = Environment::open(small_config(&dir)).unwrap();
    let second = env.vfs().create_file("b").unwrap();
    assert!(second.descriptor() > first);
}

#[test]
fn test_deleted_file_stays_deleted() {
    let dir = TempDir::new().unwrap();
    {
        let env = Environment::open(small_config(&dir)).unwrap();
        let file = env.vfs().create_file("gone").unwrap();
        env.vfs().write(&file, 0, &[7u8; 300]).unwrap();
        env.vfs().delete_file("gone").unwrap();
    }

    let env = Environment::open(small_config(&dir)).unwrap();
    assert!(env.vfs().open_file("gone").unwrap().is_none());
    assert_eq!(env.vfs().file_count(), 0);
}

#[test]
fn test_indexes_use_separate_structures() {
    let dir = TempDir::new().unwrap();
    let env = Environment::open(small_config(&dir)).unwrap();
    let file = env.vfs().create_file("f").unwrap();
    env.vfs().write(&file, 0, b"hello").unwrap();

    let structures: Vec<u64> = env.log().iter(0).map(|l| l.unwrap().structure_id).collect();
    assert!(structures.contains(&PATHS_STRUCTURE_ID));
    assert!(structures.contains(&CONTENTS_STRUCTURE_ID));
}

// =============================================================================
// Settings Tests
// =============================================================================

#[test]
fn test_converter_round_trips_through_log() {
    let dir = TempDir::new().unwrap();
    let settings = || {
        ClusterSettings::new(ClusteringStrategy::linear(64))
            .with_converter(Arc::new(ChecksumConverter))
    };
    {
        let env = Environment::open_with_settings(small_config(&dir), settings()).unwrap();
        let file = env.vfs().create_file("f").unwrap();
        env.vfs().write(&file, 0, &[9u8; 200]).unwrap();
        assert_eq!(env.vfs().file_length(&file).unwrap(), 200);
    }

    let env = Environment::open_with_settings(small_config(&dir), settings()).unwrap();
    let file = env.vfs().open_existing_file("f").unwrap();
    assert_eq!(env.vfs().read_all(&file).unwrap(), vec![9u8; 200]);
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_close_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let env = Environment::open(small_config(&dir)).unwrap();

    env.close().unwrap();
    env.close().unwrap();
    assert!(env.is_closed());
    assert!(matches!(
        env.vfs().create_file("late"),
        Err(StoreError::LogClosed)
    ));
}

#[test]
fn test_environment_backup() {
    let dir = TempDir::new().unwrap();
    let target = TempDir::new().unwrap();
    {
        let env = Environment::open(small_config(&dir)).unwrap();
        let file = env.vfs().create_file("f").unwrap();
        env.vfs().write(&file, 0, &[3u8; 5000]).unwrap();

        let summary = run_backup(env.backup_strategy().as_mut(), target.path()).unwrap();
        assert_eq!(summary.files_copied, env.log().segment_count());
    }

    let restored = Environment::open(small_config(&target)).unwrap();
    let file = restored.vfs().open_existing_file("f").unwrap();
    assert_eq!(restored.vfs().read_all(&file).unwrap(), vec![3u8; 5000]);
}
