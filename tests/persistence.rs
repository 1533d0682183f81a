//! Persistence and escalation tests for the wisdom store.
//!
//! These tests verify that records survive reopening the data directory,
//! that crossing a tier threshold migrates every record exactly once, and
//! that learned records from a reasoning session are still there after a
//! restart.

use std::path::Path;
use std::sync::Arc;

use theos::config::GovernorConfig;
use theos::governor::Governor;
use theos::wisdom::{
    BackendLocation, BackendTier, EscalationPolicy, WisdomKind, WisdomQuery, WisdomRecord,
    WisdomStore,
};

fn synthetic(i: usize) -> WisdomRecord {
    WisdomRecord::seed(
        format!("synthetic question {i} about topic {}", i % 97),
        "generated",
        format!("answer {i}"),
        0.5 + (i % 5) as f64 / 10.0,
        if i % 2 == 0 { "even" } else { "odd" },
    )
    .unwrap()
}

fn small_policy(dir: &Path) -> WisdomStore {
    WisdomStore::with_policy(
        BackendLocation::Directory(dir.to_path_buf()),
        EscalationPolicy {
            indexed_threshold: 3,
            vector_threshold: 6,
        },
    )
    .unwrap()
}

#[test]
fn crossing_ten_thousand_records_migrates_once() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = WisdomStore::open(dir.path()).unwrap();

    store.seed((0..10_000).map(synthetic)).unwrap();
    assert_eq!(store.tier().unwrap(), BackendTier::Flat);
    assert_eq!(store.count().unwrap(), 10_000);
    assert_eq!(store.migrations().unwrap(), 0);

    store.store(synthetic(10_000)).unwrap();
    assert_eq!(store.tier().unwrap(), BackendTier::Indexed);
    assert_eq!(store.migrations().unwrap(), 1);
    assert_eq!(store.count().unwrap(), 10_001);
    assert!(dir.path().join("wisdom.redb").exists());
    assert!(!dir.path().join("wisdom.jsonl").exists());

    let hits = store
        .query(&WisdomQuery::new("synthetic question 10000 about topic 9", 0.99))
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].record.resolution, "answer 10000");

    let stats = store.statistics().unwrap();
    assert_eq!(stats.total, 10_001);
    assert_eq!(stats.seed, 10_001);
    assert_eq!(stats.next_escalation, Some(1_000_000));
}

#[test]
fn in_memory_store_escalates_without_disk() {
    let store = WisdomStore::with_policy(
        BackendLocation::Memory,
        EscalationPolicy {
            indexed_threshold: 3,
            vector_threshold: 6,
        },
    )
    .unwrap();
    store.seed((0..7).map(synthetic)).unwrap();
    assert_eq!(store.tier().unwrap(), BackendTier::Vector);
    assert_eq!(store.migrations().unwrap(), 2);
    assert_eq!(store.count().unwrap(), 7);
}

#[test]
fn records_survive_reopen_on_every_tier() {
    let dir = tempfile::TempDir::new().unwrap();

    // Flat.
    {
        let store = small_policy(dir.path());
        store.seed((0..2).map(synthetic)).unwrap();
        assert_eq!(store.tier().unwrap(), BackendTier::Flat);
    }
    {
        let store = small_policy(dir.path());
        assert_eq!(store.tier().unwrap(), BackendTier::Flat);
        assert_eq!(store.count().unwrap(), 2);
        store.seed((2..5).map(synthetic)).unwrap();
        assert_eq!(store.tier().unwrap(), BackendTier::Indexed);
    }

    // Indexed.
    {
        let store = small_policy(dir.path());
        assert_eq!(store.tier().unwrap(), BackendTier::Indexed);
        assert_eq!(store.count().unwrap(), 5);
        // Migrations are counted per open handle.
        assert_eq!(store.migrations().unwrap(), 0);
        store.seed((5..8).map(synthetic)).unwrap();
        assert_eq!(store.tier().unwrap(), BackendTier::Vector);
    }

    // Vector.
    {
        let store = small_policy(dir.path());
        assert_eq!(store.tier().unwrap(), BackendTier::Vector);
        assert_eq!(store.count().unwrap(), 8);
        let exported = store.export_all().unwrap();
        let expected: Vec<WisdomRecord> = (0..8).map(synthetic).collect();
        for (got, want) in exported.iter().zip(&expected) {
            assert_eq!(got.query, want.query);
            assert_eq!(got.resolution, want.resolution);
            assert_eq!(got.confidence, want.confidence);
        }

        let hits = store
            .retrieve("synthetic question 6 about topic 6", 0.99)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].resolution, "answer 6");
    }
}

#[test]
fn learned_records_survive_restart() {
    let dir = tempfile::TempDir::new().unwrap();

    {
        let store = Arc::new(WisdomStore::open(dir.path()).unwrap());
        let mut gov = Governor::with_templates(GovernorConfig::default(), store).unwrap();
        gov.reason("Should we migrate the database this quarter?", "ops", None)
            .unwrap();
    }

    {
        let store = WisdomStore::open(dir.path()).unwrap();
        let records = store.export_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, WisdomKind::Learned);
        assert_eq!(records[0].domain, "ops");
        assert!(records[0].cost_units > 0);

        let stats = store.statistics().unwrap();
        assert_eq!(stats.learned, 1);
        assert_eq!(stats.average_confidence, records[0].confidence);
    }
}

#[test]
fn json_export_imports_into_fresh_store() {
    let dir = tempfile::TempDir::new().unwrap();
    let export = dir.path().join("export.json");

    let source = WisdomStore::in_memory();
    source.seed((0..5).map(synthetic)).unwrap();
    source
        .store(
            WisdomRecord::verified("is the api stable", "reviewed", "yes since 1.0", 0.95, "dev")
                .unwrap(),
        )
        .unwrap();
    assert_eq!(source.export_json(&export).unwrap(), 6);

    let target = WisdomStore::open(&dir.path().join("store")).unwrap();
    assert_eq!(target.import_json(&export).unwrap(), 6);
    assert_eq!(target.export_all().unwrap(), source.export_all().unwrap());
    assert_eq!(target.statistics().unwrap().verified, 1);

    // Import appends; it never replaces.
    assert_eq!(target.import_json(&export).unwrap(), 6);
    assert_eq!(target.count().unwrap(), 12);
}

#[test]
fn domain_filter_and_limit_apply_after_reopen() {
    let dir = tempfile::TempDir::new().unwrap();
    {
        let store = small_policy(dir.path());
        store.seed((0..5).map(synthetic)).unwrap();
    }
    let store = small_policy(dir.path());
    let query = WisdomQuery::new("synthetic question about topic", 0.0)
        .with_domain("even")
        .with_limit(2);
    let hits = store.query(&query).unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.record.domain == "even"));
    assert!(hits[0].similarity >= hits[1].similarity);
}
