use std::time::Duration;

use anyhow::Result;
use chrono::{TimeZone, Utc};
use sluice_data::{DataError, FileStatus, NewFileItem, NewTorrent, RetryPolicy, StateStore};
use tempfile::TempDir;

async fn open_store() -> Result<(TempDir, StateStore)> {
    let dir = tempfile::tempdir()?;
    let store = StateStore::open(
        dir.path().join("state.db"),
        RetryPolicy::new(3, Duration::from_millis(5)),
    )
    .await?;
    Ok((dir, store))
}

fn sample_torrent(hash: &str) -> NewTorrent {
    NewTorrent {
        hash: hash.to_string(),
        name: format!("{hash}-name"),
        total_size: 3_000,
        files: vec![
            NewFileItem {
                file_index: 0,
                path: format!("/downloads/{hash}/a.bin"),
                rel_path: format!("{hash}/a.bin"),
                size: 1_000,
            },
            NewFileItem {
                file_index: 2,
                path: format!("/downloads/{hash}/c.bin"),
                rel_path: format!("{hash}/c.bin"),
                size: 2_000,
            },
        ],
    }
}

#[tokio::test]
async fn insert_is_idempotent_per_hash() -> Result<()> {
    let (_dir, store) = open_store().await?;
    assert!(store.insert_torrent(&sample_torrent("aa")).await?);
    assert!(!store.insert_torrent(&sample_torrent("aa")).await?);

    let torrents = store.list_torrents().await?;
    assert_eq!(torrents.len(), 1);
    assert_eq!(torrents[0].status, "PROCESSING");
    assert!(store.torrent_exists("aa").await?);
    assert!(!store.torrent_exists("bb").await?);

    let files = store.files_for_torrent("aa").await?;
    assert_eq!(files.len(), 2);
    assert_eq!(files[1].file_index, 2);
    assert!(files.iter().all(|file| file.status == FileStatus::Waiting));
    assert!(files.iter().all(|file| file.started_at.is_none()));
    Ok(())
}

#[tokio::test]
async fn transitions_compare_and_set() -> Result<()> {
    let (_dir, store) = open_store().await?;
    store.insert_torrent(&sample_torrent("aa")).await?;
    let id = store.files_for_torrent("aa").await?[0].id;

    assert!(
        store
            .transition(id, FileStatus::Waiting, FileStatus::Downloading, None)
            .await?
    );
    assert!(
        !store
            .transition(id, FileStatus::Waiting, FileStatus::Downloading, None)
            .await?,
        "second writer loses the race"
    );

    let illegal = store
        .transition(id, FileStatus::Downloading, FileStatus::Done, None)
        .await;
    assert!(matches!(
        illegal,
        Err(DataError::IllegalTransition { .. })
    ));

    assert!(
        store
            .transition(id, FileStatus::Downloading, FileStatus::Killed, Some("slow"))
            .await?
    );
    let file = store.file(id).await?.expect("file exists");
    assert_eq!(file.status, FileStatus::Killed);
    assert_eq!(file.failed_reason, "slow");
    Ok(())
}

#[tokio::test]
async fn finished_upload_clears_earlier_failure_reason() -> Result<()> {
    let (_dir, store) = open_store().await?;
    store.insert_torrent(&sample_torrent("aa")).await?;
    let id = store.files_for_torrent("aa").await?[0].id;
    for (from, to) in [
        (FileStatus::Waiting, FileStatus::Downloading),
        (FileStatus::Downloading, FileStatus::Ready),
        (FileStatus::Ready, FileStatus::Uploading),
    ] {
        assert!(store.transition(id, from, to, None).await?);
    }
    store
        .transition(id, FileStatus::Uploading, FileStatus::Ready, Some("quota exceeded"))
        .await?;
    let requeued = store.file(id).await?.expect("file exists");
    assert_eq!(requeued.failed_reason, "quota exceeded");

    store
        .transition(id, FileStatus::Ready, FileStatus::Uploading, None)
        .await?;
    assert_eq!(
        store.file(id).await?.expect("file exists").failed_reason,
        "quota exceeded",
        "retry keeps the reason visible while in flight"
    );
    store
        .transition(id, FileStatus::Uploading, FileStatus::Done, None)
        .await?;
    let done = store.file(id).await?.expect("file exists");
    assert_eq!(done.status, FileStatus::Done);
    assert_eq!(done.failed_reason, "");
    Ok(())
}

#[tokio::test]
async fn batch_transition_reports_moved_ids() -> Result<()> {
    let (_dir, store) = open_store().await?;
    store.insert_torrent(&sample_torrent("aa")).await?;
    let ids: Vec<i64> = store
        .files_for_torrent("aa")
        .await?
        .iter()
        .map(|file| file.id)
        .collect();
    store
        .transition(ids[0], FileStatus::Waiting, FileStatus::Downloading, None)
        .await?;

    let moved = store
        .transition_many(&ids, FileStatus::Waiting, FileStatus::Downloading)
        .await?;
    assert_eq!(moved, vec![ids[1]]);
    assert_eq!(
        store.files_with_status(FileStatus::Downloading).await?.len(),
        2
    );
    Ok(())
}

#[tokio::test]
async fn started_at_is_stamped_once() -> Result<()> {
    let (_dir, store) = open_store().await?;
    store.insert_torrent(&sample_torrent("aa")).await?;
    let id = store.files_for_torrent("aa").await?[0].id;

    let first = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    let later = Utc.with_ymd_and_hms(2026, 1, 1, 6, 0, 0).unwrap();

    assert!(!store.mark_started(id, first).await?, "waiting files are not stamped");
    store
        .transition(id, FileStatus::Waiting, FileStatus::Downloading, None)
        .await?;
    assert!(store.mark_started(id, first).await?);
    assert!(!store.mark_started(id, later).await?);

    let file = store.file(id).await?.expect("file exists");
    assert_eq!(file.started_at, Some(first));
    Ok(())
}

#[tokio::test]
async fn deleting_a_torrent_cascades_to_files() -> Result<()> {
    let (_dir, store) = open_store().await?;
    store.insert_torrent(&sample_torrent("aa")).await?;
    store.insert_torrent(&sample_torrent("bb")).await?;

    assert!(store.delete_torrent("aa").await?);
    assert!(!store.delete_torrent("aa").await?);
    assert!(store.files_for_torrent("aa").await?.is_empty());
    assert_eq!(store.files_for_torrent("bb").await?.len(), 2);
    assert_eq!(
        store.torrent_hashes().await?.into_iter().collect::<Vec<_>>(),
        vec!["bb".to_string()]
    );
    Ok(())
}

#[tokio::test]
async fn interrupted_uploads_return_to_ready() -> Result<()> {
    let (_dir, store) = open_store().await?;
    store.insert_torrent(&sample_torrent("aa")).await?;
    let id = store.files_for_torrent("aa").await?[0].id;
    store
        .transition(id, FileStatus::Waiting, FileStatus::Downloading, None)
        .await?;
    store
        .transition(id, FileStatus::Downloading, FileStatus::Ready, None)
        .await?;
    store
        .transition(id, FileStatus::Ready, FileStatus::Uploading, None)
        .await?;

    assert_eq!(store.requeue_interrupted_uploads().await?, 1);
    let counts = store.status_counts().await?;
    assert_eq!(counts[&FileStatus::Ready], 1);
    assert_eq!(counts[&FileStatus::Waiting], 1);
    assert_eq!(counts[&FileStatus::Uploading], 0);
    Ok(())
}

#[tokio::test]
async fn reopening_preserves_state() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("state.db");
    {
        let store = StateStore::open(&path, RetryPolicy::default()).await?;
        store.insert_torrent(&sample_torrent("aa")).await?;
        store.pool().close().await;
    }
    let store = StateStore::open(&path, RetryPolicy::default()).await?;
    store.ping().await?;
    assert_eq!(store.list_torrents().await?.len(), 1);
    Ok(())
}
