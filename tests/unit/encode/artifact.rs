use std::sync::Arc;

use super::*;
use crate::progress::log::NullSink;

#[test]
fn urls_and_paths_are_keyed_by_job_id() {
    let store = ArtifactStore::new("/srv/videos", "https://cdn.example/videos/");
    let id = JobId::new();
    assert_eq!(
        store.url_for(id),
        format!("https://cdn.example/videos/{id}.mp4")
    );
    assert_eq!(store.final_path(id), PathBuf::from(format!("/srv/videos/{id}.mp4")));
    let partial = store.partial_path(id);
    assert!(partial.file_name().unwrap().to_string_lossy().starts_with('.'));
    assert_ne!(partial, store.final_path(id));
}

#[tokio::test]
async fn publish_renames_partial_into_place() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path(), "http://localhost/v");
    let id = JobId::new();
    std::fs::write(store.partial_path(id), b"mp4 bytes").unwrap();

    let artifact = store.publish(id, Duration::from_secs(3600)).await.unwrap();
    assert_eq!(artifact.path, store.final_path(id));
    assert!(artifact.path.is_file());
    assert!(!store.partial_path(id).exists());
    assert_eq!(
        (artifact.expires_at - artifact.created_at).num_seconds(),
        3600
    );
}

#[tokio::test]
async fn empty_or_missing_output_is_never_published() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path(), "http://localhost/v");

    let missing = JobId::new();
    let err = store.publish(missing, Duration::from_secs(1)).await.unwrap_err();
    assert!(matches!(err, ReelError::EncodingFailed(_)));

    let empty = JobId::new();
    std::fs::write(store.partial_path(empty), b"").unwrap();
    let err = store.publish(empty, Duration::from_secs(1)).await.unwrap_err();
    assert!(matches!(err, ReelError::EncodingFailed(_)));
    assert!(!store.partial_path(empty).exists());
    assert!(!store.final_path(empty).exists());
}

#[tokio::test]
async fn discard_tolerates_missing_files() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path(), "http://localhost/v");
    let id = JobId::new();
    store.discard(id).await;
    std::fs::write(store.partial_path(id), b"x").unwrap();
    store.discard(id).await;
    assert!(!store.partial_path(id).exists());
}

#[tokio::test(start_paused = true)]
async fn artifact_is_retrievable_before_ttl_and_gone_after() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path(), "http://localhost/v");
    let id = JobId::new();
    std::fs::write(store.partial_path(id), b"mp4 bytes").unwrap();
    let ttl = Duration::from_secs(60);
    let artifact = store.publish(id, ttl).await.unwrap();

    let progress = ProgressLog::new(id, Arc::new(NullSink));
    progress.append("Done");
    let expiry = schedule_expiry(&artifact, ttl, progress.clone());

    tokio::time::sleep(Duration::from_secs(59)).await;
    assert!(artifact.path.is_file());
    assert!(!expiry.is_finished());

    tokio::time::sleep(Duration::from_secs(2)).await;
    expiry.await.unwrap();
    assert!(!artifact.path.exists());
    let lines = progress.lines();
    assert_eq!(lines.len(), 2);
    assert!(lines[1].contains("no longer available"));
}
