// tests/watermark_file.rs
use chrono::{DateTime, SubsecRound, Utc};
use rss_forwarder::watermark::{
    format_stamp, parse_stamp, FileWatermarkStore, PersistenceError, WatermarkStore,
};
use tempfile::tempdir;

fn default_wm() -> DateTime<Utc> {
    parse_stamp("2024-01-01 00:00:00").unwrap()
}

#[tokio::test]
async fn missing_file_reads_default() {
    let dir = tempdir().unwrap();
    let store = FileWatermarkStore::new(dir.path().join("last_synced.txt"), default_wm());
    assert_eq!(store.read_last().await, default_wm());
}

#[tokio::test]
async fn blank_file_reads_default() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("last_synced.txt");
    std::fs::write(&path, "\n  \n").unwrap();
    let store = FileWatermarkStore::new(&path, default_wm());
    assert_eq!(store.read_last().await, default_wm());
}

#[tokio::test]
async fn corrupt_last_line_reads_default() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("last_synced.txt");
    std::fs::write(&path, "2024-03-01 10:00:00\nnot a timestamp\n").unwrap();
    let store = FileWatermarkStore::new(&path, default_wm());
    assert_eq!(store.read_last().await, default_wm());
}

#[tokio::test]
async fn last_non_blank_line_wins() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("last_synced.txt");
    std::fs::write(&path, "2024-02-01 08:00:00\n2024-03-01 10:00:00\n\n").unwrap();
    let store = FileWatermarkStore::new(&path, default_wm());
    assert_eq!(
        store.read_last().await,
        parse_stamp("2024-03-01 10:00:00").unwrap()
    );
}

#[tokio::test]
async fn commit_appends_and_creates_directories() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state").join("nested").join("last_synced.txt");
    let store = FileWatermarkStore::new(&path, default_wm());

    let first = parse_stamp("2024-04-01 09:15:00").unwrap();
    let second = Utc::now().trunc_subsecs(0);
    store.commit(first).await.unwrap();
    store.commit(second).await.unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines, vec!["2024-04-01 09:15:00".to_string(), format_stamp(second)]);
    assert_eq!(store.read_last().await, second);

    // A fresh store over the same log sees the same value.
    let reopened = FileWatermarkStore::new(&path, default_wm());
    assert_eq!(reopened.read_last().await, second);
}

#[tokio::test]
async fn commit_reports_unwritable_location() {
    let dir = tempdir().unwrap();
    let blocker = dir.path().join("not_a_dir");
    std::fs::write(&blocker, "file").unwrap();
    let store = FileWatermarkStore::new(blocker.join("last_synced.txt"), default_wm());

    let err = store.commit(default_wm()).await.unwrap_err();
    assert!(matches!(err, PersistenceError::CreateDir { .. }), "{err}");
    assert_eq!(store.read_last().await, default_wm());
}
