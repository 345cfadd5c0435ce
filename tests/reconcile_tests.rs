//! End-to-end reconciliation tests against the in-process store
//!
//! Run with: cargo test --test reconcile_tests

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use drive_mirror::remote::MemoryStore;
use drive_mirror::sync::local_modification_time;
use drive_mirror::{
    MirrorError, PairReconciler, PairSpec, PollScheduler, SyncPair, Timestamp, TransferOutcome,
};
use tempfile::TempDir;

fn write_with_mtime(path: &Path, content: &[u8], mtime: f64) {
    let mut file = File::create(path).unwrap();
    file.write_all(content).unwrap();
    file.set_modified(Timestamp::from_secs_f64(mtime).to_system_time())
        .unwrap();
}

fn file_in(dir: &TempDir, name: &str, content: &[u8], mtime: f64) -> PathBuf {
    let path = dir.path().join(name);
    write_with_mtime(&path, content, mtime);
    path
}

#[tokio::test]
async fn test_sub_second_difference_is_noop() {
    let dir = TempDir::new().unwrap();
    let path = file_in(&dir, "notes.md", b"local", 1000.9);
    let store = MemoryStore::new();
    store.insert("doc", b"remote".to_vec(), Timestamp::from_secs_f64(1000.2));

    let outcome = PairReconciler::new(&store)
        .sync(&SyncPair::new(&path, "doc"))
        .await
        .unwrap();

    assert_eq!(outcome, TransferOutcome::NoOp);
    assert_eq!(store.uploads() + store.downloads(), 0);
}

#[tokio::test]
async fn test_noop_is_stable_across_repeated_syncs() {
    let dir = TempDir::new().unwrap();
    let path = file_in(&dir, "notes.md", b"same", 5000.4);
    let store = MemoryStore::new();
    store.insert("doc", b"same".to_vec(), Timestamp::from_secs_f64(5000.0));

    let reconciler = PairReconciler::new(&store);
    for _ in 0..5 {
        let outcome = reconciler.sync(&SyncPair::new(&path, "doc")).await.unwrap();
        assert_eq!(outcome, TransferOutcome::NoOp);
    }

    assert_eq!(store.uploads(), 0);
    assert_eq!(store.downloads(), 0);
    let local = local_modification_time(&path).await.unwrap();
    assert_eq!(local.truncated().whole_seconds(), 5000);
}

#[tokio::test]
async fn test_upload_converges_remote_time() {
    let dir = TempDir::new().unwrap();
    let path = file_in(&dir, "notes.md", b"edited locally", 1001.0);
    let store = MemoryStore::new();
    store.insert("doc", b"old".to_vec(), Timestamp::from_secs_f64(1000.6));

    let reconciler = PairReconciler::new(&store);
    let outcome = reconciler.sync(&SyncPair::new(&path, "doc")).await.unwrap();
    assert_eq!(outcome, TransferOutcome::Uploaded);

    let local = local_modification_time(&path).await.unwrap();
    let remote_raw = store.get("doc").unwrap().modified_time.unwrap();
    let remote = Timestamp::parse_canonical(&remote_raw).unwrap();
    assert_eq!(remote.truncated(), local.truncated());
    assert_eq!(remote.truncated().whole_seconds(), 1001);

    // and the next sync does nothing
    let outcome = reconciler.sync(&SyncPair::new(&path, "doc")).await.unwrap();
    assert_eq!(outcome, TransferOutcome::NoOp);
}

#[tokio::test]
async fn test_download_converges_local_content() {
    let dir = TempDir::new().unwrap();
    let path = file_in(&dir, "notes.md", b"a much longer stale local body", 1000.0);
    let store = MemoryStore::new();
    let remote_time = Timestamp::from_secs_f64(1_600_000_000.75);
    store.insert("doc", b"fresh remote".to_vec(), remote_time);

    let outcome = PairReconciler::new(&store)
        .sync(&SyncPair::new(&path, "doc"))
        .await
        .unwrap();

    assert_eq!(outcome, TransferOutcome::Downloaded);
    assert_eq!(std::fs::read(&path).unwrap(), b"fresh remote".to_vec());
    let local = local_modification_time(&path).await.unwrap();
    assert!(local.truncated() >= remote_time.truncated());
}

#[tokio::test]
async fn test_failed_pair_does_not_affect_next_pair() {
    let dir = TempDir::new().unwrap();
    let good = file_in(&dir, "good.md", b"good", 3000.0);
    let store = MemoryStore::new();
    store.insert("good", b"remote".to_vec(), Timestamp::from_secs_f64(2000.0));
    store.insert("bad", b"remote".to_vec(), Timestamp::from_secs_f64(2000.0));

    let pairs = vec![
        PairSpec::new(dir.path().join("absent.md").to_str().unwrap(), "bad").unwrap(),
        PairSpec::new(good.to_str().unwrap(), "good").unwrap(),
    ];
    let scheduler = PollScheduler::new(pairs, Duration::from_secs(10));

    let report = scheduler.run_cycle(&store).await;
    assert_eq!(report.failed, 1);
    assert_eq!(report.uploaded, 1);
    assert_eq!(store.get("good").unwrap().content, b"good".to_vec());
    assert_eq!(store.get("bad").unwrap().content, b"remote".to_vec());
}

#[tokio::test]
async fn test_pairs_processed_in_configured_order() {
    let dir = TempDir::new().unwrap();
    // both pairs point at one document: the later pair sees the earlier upload
    let first = file_in(&dir, "first.md", b"first", 4000.0);
    let second = file_in(&dir, "second.md", b"second", 3000.0);
    let store = MemoryStore::new();
    store.insert("shared", b"remote".to_vec(), Timestamp::from_secs_f64(2000.0));

    let scheduler = PollScheduler::new(
        vec![
            PairSpec::new(first.to_str().unwrap(), "shared").unwrap(),
            PairSpec::new(second.to_str().unwrap(), "shared").unwrap(),
        ],
        Duration::from_secs(10),
    );

    let report = scheduler.run_cycle(&store).await;
    assert_eq!(report.uploaded, 1);
    assert_eq!(report.downloaded, 1);
    assert_eq!(std::fs::read(&second).unwrap(), b"first".to_vec());
}

#[tokio::test]
async fn test_remote_deleted_between_cycles_is_not_found() {
    let dir = TempDir::new().unwrap();
    let path = file_in(&dir, "notes.md", b"local", 1000.0);
    let store = MemoryStore::new();
    store.insert("doc", b"local".to_vec(), Timestamp::from_secs_f64(1000.0));

    let scheduler = PollScheduler::new(
        vec![PairSpec::new(path.to_str().unwrap(), "doc").unwrap()],
        Duration::from_secs(10),
    );
    assert_eq!(scheduler.run_cycle(&store).await.unchanged, 1);

    assert!(store.remove("doc").is_some());

    let err = PairReconciler::new(&store)
        .sync(&SyncPair::new(&path, "doc"))
        .await
        .unwrap_err();
    assert!(matches!(err, MirrorError::NotFound(id) if id == "doc"));

    let report = scheduler.run_cycle(&store).await;
    assert_eq!(report.failed, 1);
    assert_eq!(std::fs::read(&path).unwrap(), b"local".to_vec());
}
