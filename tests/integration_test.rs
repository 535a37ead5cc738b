use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;
use vibestore::cache::{CachePolicy, CacheRecordManager, MruCache};
use vibestore::config::{CacheOptions, StoreOptions};
use vibestore::database::Database;
use vibestore::inspect::StoreSummary;
use vibestore::record::{BaseRecordManager, RecordId, RecordManager, RecordManagerExt};
use vibestore::storage::{PageType, StorageError};

fn fast() -> StoreOptions {
    StoreOptions::default()
        .with_sync_on_commit(false)
        .with_cache(CacheOptions::Disabled)
}

fn record(seed: u64, len: usize) -> Vec<u8> {
    (0..len).map(|i| (seed as usize * 31 + i) as u8).collect()
}

#[test]
fn test_durability_across_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.db");

    let mut expected = HashMap::new();
    {
        let mut recman = BaseRecordManager::open(&path, &fast()).unwrap();
        for (i, len) in [1usize, 100, 8000, 8170, 20_000, 50_000].into_iter().enumerate() {
            let data = record(i as u64, len);
            let id = recman.insert_bytes(&data).unwrap();
            expected.insert(id, data);
        }
        recman.set_named_object("first", RecordId(1 << 16)).unwrap();
        recman.close().unwrap();
    }
    assert!(!path.with_extension("db.log").exists());

    let mut recman = BaseRecordManager::open(&path, &fast()).unwrap();
    for (id, data) in &expected {
        assert_eq!(recman.fetch_bytes(*id).unwrap().as_ref(), Some(data));
    }
    assert_eq!(
        recman.get_named_object("first").unwrap(),
        Some(RecordId(1 << 16))
    );
}

#[test]
fn test_crash_recovery_replays_committed_transactions() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.db");
    let options = fast().with_max_logged_transactions(100);

    let (committed, uncommitted) = {
        let mut recman = BaseRecordManager::open(&path, &options).unwrap();
        let committed = recman.insert_bytes(b"survives").unwrap();
        recman.set_root(0, committed).unwrap();
        recman.commit().unwrap();

        let uncommitted = recman.insert_bytes(b"lost").unwrap();
        recman.update_bytes(committed, b"also lost").unwrap();

        // Simulate a crash: nothing is flushed or closed
        std::mem::forget(recman);
        (committed, uncommitted)
    };
    assert!(path.with_extension("db.log").exists());

    let mut recman = BaseRecordManager::open(&path, &options).unwrap();
    assert_eq!(
        recman.fetch_bytes(committed).unwrap().as_deref(),
        Some(&b"survives"[..])
    );
    assert_eq!(recman.get_root(0).unwrap(), committed);
    // The uncommitted id was never written, so it no longer addresses a record
    assert_eq!(recman.fetch_bytes(uncommitted).unwrap(), None);
}

#[test]
fn test_write_back_cache_end_to_end() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.db");

    let ids: Vec<RecordId> = {
        let base = BaseRecordManager::open(&path, &fast()).unwrap();
        let cache: Arc<MruCache> = Arc::new(MruCache::new(8));
        let mut recman = CacheRecordManager::new(base, cache.clone());

        let ids: Vec<RecordId> = (0..50u64)
            .map(|i| recman.insert_bytes(&record(i, 64)).unwrap())
            .collect();
        // Only the most recent entries remain cached; the rest were written back
        assert_eq!(cache.len(), 8);
        for &id in &ids {
            recman.update_value(id, id.0).unwrap();
        }
        recman.commit().unwrap();
        assert!(cache.entries().iter().all(|entry| !entry.dirty));
        recman.close().unwrap();
        ids
    };

    let mut recman = BaseRecordManager::open(&path, &fast()).unwrap();
    for id in ids {
        assert_eq!(recman.fetch_value::<u64>(id).unwrap(), Some(id.0));
    }
}

#[test]
fn test_buffered_installer_packs_small_records() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.db");
    let options = fast().with_buffered_install(8000).with_waste_margin(500);

    let mut recman = BaseRecordManager::open(&path, &options).unwrap();
    let before = StoreSummary::collect(&mut recman)
        .unwrap()
        .page_count(PageType::Used);

    let ids: Vec<RecordId> = (0..15u64)
        .map(|i| recman.insert_bytes(&record(i, 500)).unwrap())
        .collect();
    recman.commit().unwrap();

    let stats = recman.install_stats().unwrap();
    assert_eq!(stats.page_flushes, 1);
    assert_eq!(stats.record_flushes, 0);

    let after = StoreSummary::collect(&mut recman)
        .unwrap()
        .page_count(PageType::Used);
    assert_eq!(after, before + 1);

    for (i, id) in ids.iter().enumerate() {
        assert_eq!(recman.fetch_bytes(*id).unwrap(), Some(record(i as u64, 500)));
    }
}

#[test]
fn test_database_rollback_restores_committed_state() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.db");
    let db = Database::create_with_options(
        &path,
        StoreOptions::default()
            .with_sync_on_commit(false)
            .with_cache(CacheOptions::Mru { capacity: 3 }),
    )
    .unwrap();

    let keep = db.insert_bytes(b"keep").unwrap();
    db.commit().unwrap();

    for i in 0..10u64 {
        db.insert_bytes(&record(i, 10)).unwrap();
    }
    db.update_bytes(keep, b"changed").unwrap();
    db.delete(keep).unwrap();
    db.rollback().unwrap();

    assert_eq!(db.fetch_bytes(keep).unwrap().as_deref(), Some(&b"keep"[..]));
}

#[test]
fn test_deleted_id_is_rejected_for_mutation() {
    let dir = tempdir().unwrap();
    let mut recman = BaseRecordManager::open(&dir.path().join("store.db"), &fast()).unwrap();

    let id = recman.insert_bytes(b"gone").unwrap();
    recman.delete(id).unwrap();

    assert_eq!(recman.fetch_bytes(id).unwrap(), None);
    assert!(matches!(
        recman.update_bytes(id, b"again"),
        Err(StorageError::RecordNotFound(_))
    ));
    assert!(matches!(
        recman.delete(id),
        Err(StorageError::RecordNotFound(_))
    ));
}

fn random_workload(path: &Path, options: StoreOptions, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut committed: HashMap<RecordId, Vec<u8>> = HashMap::new();
    let mut current = committed.clone();

    let db = Database::create_with_options(path, options.clone()).unwrap();
    for step in 0..400u64 {
        match rng.gen_range(0..100) {
            0..=39 => {
                let len = if rng.gen_bool(0.1) {
                    rng.gen_range(8_000..30_000)
                } else {
                    rng.gen_range(1..600)
                };
                let data = record(step, len);
                let id = db.insert_bytes(&data).unwrap();
                assert!(current.insert(id, data).is_none());
            }
            40..=64 if !current.is_empty() => {
                let id = *current.keys().nth(rng.gen_range(0..current.len())).unwrap();
                let data = record(step, rng.gen_range(1..12_000));
                db.update_bytes(id, &data).unwrap();
                current.insert(id, data);
            }
            65..=79 if !current.is_empty() => {
                let id = *current.keys().nth(rng.gen_range(0..current.len())).unwrap();
                db.delete(id).unwrap();
                current.remove(&id);
            }
            80..=91 => {
                db.commit().unwrap();
                committed = current.clone();
            }
            92..=95 => {
                db.rollback().unwrap();
                current = committed.clone();
            }
            _ => {
                for (id, data) in &current {
                    assert_eq!(db.fetch_bytes(*id).unwrap().as_ref(), Some(data));
                }
            }
        }
    }
    db.close().unwrap();
    drop(db);

    let db = Database::open_with_options(path, options).unwrap();
    for (id, data) in &current {
        assert_eq!(db.fetch_bytes(*id).unwrap().as_ref(), Some(data));
    }
}

#[test]
fn test_random_workload_plain() {
    let dir = tempdir().unwrap();
    random_workload(&dir.path().join("store.db"), fast(), 7);
}

#[test]
fn test_random_workload_buffered_and_cached() {
    let dir = tempdir().unwrap();
    let options = StoreOptions::default()
        .with_sync_on_commit(false)
        .with_buffered_install(4096)
        .with_cache(CacheOptions::Soft {
            capacity: 16,
            reclaimable_capacity: 64,
        });
    random_workload(&dir.path().join("store.db"), options, 11);
}

#[test]
fn test_random_workload_compressed_without_transactions() {
    let dir = tempdir().unwrap();
    let options = fast()
        .with_transactions(false)
        .with_compression(true)
        .with_cache(CacheOptions::Mru { capacity: 32 });
    let mut rng = StdRng::seed_from_u64(3);
    let path = dir.path().join("store.db");

    let db = Database::create_with_options(&path, options.clone()).unwrap();
    let mut expected = HashMap::new();
    for step in 0..200u64 {
        let data = vec![(step % 7) as u8; rng.gen_range(1..20_000)];
        expected.insert(db.insert_bytes(&data).unwrap(), data);
    }
    db.close().unwrap();
    drop(db);

    let db = Database::open_with_options(&path, options).unwrap();
    for (id, data) in &expected {
        assert_eq!(db.fetch_bytes(*id).unwrap().as_ref(), Some(data));
    }
}
