//! Integration tests for the copy and delete jobs

use chrono::{TimeZone, Utc};
use core_auth::CredentialStore;
use core_jobs::{CopyJob, Decision, DeleteJob, Job, JobState};
use core_runtime::JobConfig;
use core_vfs::{
    BackendRegistry, CapabilityOperation, Credential, FileHandle, FileSet, ResourceLocator,
    Resolver,
};
use provider_local::LocalBackend;
use provider_memory::{InjectedFailure, MemoryBackend, MEMORY_SCHEME};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn locator(path: &str) -> ResourceLocator {
    ResourceLocator::parse(&format!("mem://share{}", path)).unwrap()
}

async fn handle(backend: &MemoryBackend, path: &str) -> FileHandle {
    FileHandle::resolve(Arc::new(backend.clone()), locator(path))
        .await
        .unwrap()
}

async fn fileset(backend: &MemoryBackend, base: &str, paths: &[&str]) -> FileSet {
    let mut files = FileSet::new(locator(base));
    for path in paths {
        files.push(handle(backend, path).await);
    }
    files
}

// ============================================================================
// Copy
// ============================================================================

#[tokio::test]
async fn test_copy_recreates_tree_under_destination() {
    let backend = MemoryBackend::new();
    backend.insert_file("/src/one.txt", "first");
    backend.insert_file("/src/two.txt", "second");
    backend.insert_file("/src/nested/three.txt", "third");
    backend.insert_directory("/dst");

    let files = fileset(&backend, "/src", &["/src/one.txt", "/src/two.txt", "/src/nested"]).await;
    let destination = handle(&backend, "/dst").await;

    let job = Job::new(CopyJob::new(destination), files)
        .with_config(JobConfig::default().with_chunk_size(2))
        .build();
    job.start();
    let report = job.wait().await;

    assert_eq!(report.state, JobState::Finished);
    assert_eq!(report.progress.files_done, 4);
    assert_eq!(report.progress.total_files, 4);
    assert_eq!(report.progress.bytes_done, 16);
    assert_eq!(report.progress.total_bytes, 16);
    assert_eq!(report.progress.percent(), Some(100));

    assert_eq!(backend.read_file("/dst/one.txt").unwrap(), "first");
    assert_eq!(backend.read_file("/dst/two.txt").unwrap(), "second");
    assert_eq!(backend.read_file("/dst/nested/three.txt").unwrap(), "third");
    assert_eq!(backend.read_file("/src/one.txt").unwrap(), "first");

    assert!(job.affects_folder(&locator("/dst/nested")));
    assert!(!job.affects_folder(&locator("/src")));
    assert_eq!(job.kind(), "copy");
}

#[tokio::test]
async fn test_copy_into_missing_destination_fails_at_start() {
    let backend = MemoryBackend::new();
    backend.insert_file("/src/one.txt", "first");
    let files = fileset(&backend, "/src", &["/src/one.txt"]).await;
    let destination = handle(&backend, "/nowhere").await;

    let job = Job::new(CopyJob::new(destination), files).build();
    job.start();
    let report = job.wait().await;

    assert_eq!(report.state, JobState::Interrupted);
    assert!(report.error.is_some());
    assert_eq!(report.progress.files_done, 0);
    assert!(!backend.exists("/nowhere/one.txt"));
}

#[tokio::test]
async fn test_copy_onto_existing_folder_is_skipped() {
    let backend = MemoryBackend::new();
    backend.insert_file("/src/clash", "file");
    backend.insert_file("/src/fine.txt", "ok");
    backend.insert_directory("/dst/clash");

    let files = fileset(&backend, "/src", &["/src/clash", "/src/fine.txt"]).await;
    let destination = handle(&backend, "/dst").await;
    let asked = Arc::new(AtomicUsize::new(0));
    let counter = asked.clone();

    let job = Job::new(CopyJob::new(destination), files)
        .with_decision_fn(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Decision::Skip
        })
        .build();
    job.start();
    let report = job.wait().await;

    assert_eq!(report.state, JobState::Finished);
    assert_eq!(report.progress.files_skipped, 1);
    assert_eq!(report.progress.files_done, 1);
    assert_eq!(asked.load(Ordering::SeqCst), 1);
    assert_eq!(backend.read_file("/dst/fine.txt").unwrap(), "ok");
}

#[tokio::test]
async fn test_copy_retries_transient_read_failure() {
    let backend = MemoryBackend::new();
    backend.insert_file("/src/flaky.txt", "eventually");
    backend.insert_directory("/dst");
    backend.fail_on(
        "/src/flaky.txt",
        CapabilityOperation::Read,
        InjectedFailure::Transient,
        2,
    );

    let files = fileset(&backend, "/src", &["/src/flaky.txt"]).await;
    let destination = handle(&backend, "/dst").await;

    let job = Job::new(CopyJob::new(destination), files)
        .with_decision_fn(|_, error| {
            if error.is_retryable() {
                Decision::Retry
            } else {
                Decision::Cancel
            }
        })
        .build();
    job.start();
    let report = job.wait().await;

    assert_eq!(report.state, JobState::Finished);
    assert_eq!(report.progress.files_done, 1);
    assert_eq!(report.progress.bytes_done, 10);
    assert_eq!(backend.read_file("/dst/flaky.txt").unwrap(), "eventually");
}

#[tokio::test]
async fn test_retry_after_destination_password_change() {
    let source = MemoryBackend::new();
    source.insert_file("/src/a.txt", "alpha");
    source.insert_file("/src/b.txt", "beta");
    let files = fileset(&source, "/src", &["/src/a.txt", "/src/b.txt"]).await;

    let vault = MemoryBackend::new().with_required_credential(Credential::new("erin", "old"));
    vault.insert_directory("/dst");
    let vault_dst = ResourceLocator::parse("mem://vault/dst").unwrap();
    let destination = FileHandle::resolve(
        Arc::new(vault.clone()),
        vault_dst.with_credential(Credential::new("erin", "old")),
    )
    .await
    .unwrap();

    // The session expires on b.txt and the password changes meanwhile.
    vault.fail_on(
        "/dst/b.txt",
        CapabilityOperation::Write,
        InjectedFailure::Authentication,
        1,
    );
    let registry = Arc::new(
        BackendRegistry::new().with_backend(MEMORY_SCHEME, Arc::new(vault.clone())),
    );
    let store = Arc::new(CredentialStore::new(1));
    let asked = Arc::new(AtomicUsize::new(0));
    let counter = asked.clone();
    let server = vault.clone();
    let prompt_store = store.clone();

    let job = Job::new(CopyJob::new(destination), files)
        .with_reauthentication(registry, store)
        .with_decision_fn(move |_, error| {
            if counter.fetch_add(1, Ordering::SeqCst) > 0 || !error.is_authentication_failure() {
                return Decision::Cancel;
            }
            let fresh = Credential::new("erin", "new");
            server.set_required_credential(fresh.clone());
            if let Some(failed) = error.locator() {
                prompt_store.put(failed, fresh);
            }
            Decision::Retry
        })
        .build();
    job.start();
    let report = job.wait().await;

    assert_eq!(report.state, JobState::Finished);
    assert_eq!(report.progress.files_done, 2);
    assert_eq!(asked.load(Ordering::SeqCst), 1);
    assert_eq!(vault.read_file("/dst/a.txt").unwrap(), "alpha");
    assert_eq!(vault.read_file("/dst/b.txt").unwrap(), "beta");
}

#[tokio::test]
async fn test_cancel_mid_transfer_removes_partial_copy() {
    let backend = MemoryBackend::new().with_read_throttle(Duration::from_millis(10), 4);
    backend.insert_file("/src/large.bin", vec![1u8; 4096]);
    backend.insert_directory("/dst");

    let files = fileset(&backend, "/src", &["/src/large.bin"]).await;
    let destination = handle(&backend, "/dst").await;

    let job = Job::new(CopyJob::new(destination), files)
        .with_config(JobConfig::default().with_chunk_size(4))
        .build();
    job.start();

    while job.progress().bytes_done == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(job.status_message(), "Copying large.bin");
    job.cancel();

    let report = job.wait().await;
    assert_eq!(report.state, JobState::Interrupted);
    assert_eq!(report.error, None);
    assert_eq!(report.progress.files_done, 0);
    assert!(report.progress.bytes_done < 4096);
    assert!(!backend.exists("/dst/large.bin"));
}

fn temp_root() -> PathBuf {
    let base = std::env::temp_dir().join(format!("core-jobs-copy-test-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&base).unwrap();
    base
}

#[tokio::test]
async fn test_copy_preserves_timestamps_on_local_files() {
    let root = temp_root();
    std::fs::create_dir_all(root.join("src")).unwrap();
    std::fs::create_dir_all(root.join("dst")).unwrap();
    std::fs::write(root.join("src/dated.txt"), "old news").unwrap();

    let registry = BackendRegistry::new().with_backend("file", Arc::new(LocalBackend::new()));
    let resolve = |path: PathBuf| {
        let registry = &registry;
        async move {
            registry
                .resolve(&ResourceLocator::from_path(path).unwrap())
                .await
                .unwrap()
        }
    };

    let source = resolve(root.join("src/dated.txt")).await;
    let then = Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap();
    source.change_timestamp(then).await.unwrap();
    let source = source.refresh().await.unwrap();

    let base = ResourceLocator::from_path(root.join("src")).unwrap();
    let files = FileSet::from_handles(base, [source]);
    let destination = resolve(root.join("dst")).await;

    let job = Job::new(CopyJob::new(destination), files).build();
    job.start();
    assert_eq!(job.wait().await.state, JobState::Finished);

    let copied = resolve(root.join("dst/dated.txt")).await;
    assert_eq!(copied.size(), 8);
    assert_eq!(copied.modified().unwrap().timestamp(), then.timestamp());

    let _ = std::fs::remove_dir_all(&root);
}

// ============================================================================
// Delete
// ============================================================================

#[tokio::test]
async fn test_delete_removes_folders_recursively() {
    let backend = MemoryBackend::new();
    backend.insert_file("/trash/a.txt", "a");
    backend.insert_file("/trash/sub/b.txt", "b");
    backend.insert_file("/trash/sub/deep/c.txt", "c");
    backend.insert_file("/keep/d.txt", "d");

    let files = fileset(&backend, "/trash", &["/trash/a.txt", "/trash/sub"]).await;
    let job = Job::new(DeleteJob::new(), files).build();
    job.start();
    let report = job.wait().await;

    assert_eq!(report.state, JobState::Finished);
    assert_eq!(report.progress.files_done, 5);
    assert_eq!(report.progress.total_files, 5);
    assert_eq!(
        backend.paths(),
        vec!["/", "/keep", "/keep/d.txt", "/trash"]
    );

    assert!(job.affects_folder(&locator("/trash")));
    assert!(job.affects_folder(&locator("/trash/sub")));
    assert!(!job.affects_folder(&locator("/keep")));
}

#[tokio::test]
async fn test_delete_skipping_a_child_keeps_its_folder() {
    let backend = MemoryBackend::new();
    backend.insert_file("/trash/sub/stuck.txt", "s");
    backend.insert_file("/trash/sub/gone.txt", "g");
    backend.always_fail_on(
        "/trash/sub/stuck.txt",
        CapabilityOperation::Delete,
        InjectedFailure::PermissionDenied,
    );

    let files = fileset(&backend, "/trash", &["/trash/sub"]).await;
    let job = Job::new(DeleteJob::new(), files)
        .with_decision_fn(|_, _| Decision::Skip)
        .build();
    job.start();
    let report = job.wait().await;

    assert_eq!(report.state, JobState::Finished);
    assert_eq!(report.progress.files_done, 1);
    assert_eq!(report.progress.files_skipped, 2);
    assert!(backend.exists("/trash/sub/stuck.txt"));
    assert!(!backend.exists("/trash/sub/gone.txt"));
}
