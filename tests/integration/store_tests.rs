use std::path::{Path, PathBuf};
use std::sync::Arc;

use dupetree::pipeline::ScanPipeline;
use dupetree::scanner::{hash_to_hex, FileRecord, Hasher};
use dupetree::signal::CancelToken;
use dupetree::store::{FileStore, MemoryStore, SqliteStore};
use tempfile::TempDir;

use super::common::{test_options, write_file};

#[test]
fn test_scan_results_survive_reopen() {
    let data = TempDir::new().unwrap();
    let files = TempDir::new().unwrap();
    let a = write_file(files.path(), "a.txt", "alpha");
    write_file(files.path(), "nested/b.txt", "beta");
    let db = data.path().join("dupetree.db");

    {
        let store = Arc::new(SqliteStore::open(&db).unwrap());
        store.add_directory(files.path()).unwrap();
        ScanPipeline::new(store, test_options())
            .run(&[files.path().to_path_buf()], &CancelToken::new())
            .unwrap();
    }

    let store = SqliteStore::open(&db).unwrap();
    let records = store.read_all_files().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(
        store.read_all_directories().unwrap(),
        vec![files.path().to_path_buf()]
    );

    let expected = Hasher::new().hash_file(&a, &CancelToken::new()).unwrap();
    let stored = records.iter().find(|r| r.path == a).unwrap();
    assert_eq!(stored.content_hash, Some(expected));
    assert_eq!(stored.hash_hex(), Some(hash_to_hex(&expected)));
    assert_eq!(stored.extension, "txt");
}

#[test]
fn test_rescan_replaces_previous_file_set() {
    let data = TempDir::new().unwrap();
    let files = TempDir::new().unwrap();
    let first = write_file(files.path(), "first.txt", "1");
    let store = Arc::new(SqliteStore::open(&data.path().join("db.sqlite")).unwrap());
    let pipeline = ScanPipeline::new(store.clone(), test_options());
    let roots = vec![files.path().to_path_buf()];

    pipeline.run(&roots, &CancelToken::new()).unwrap();
    std::fs::remove_file(&first).unwrap();
    write_file(files.path(), "second.txt", "2");
    pipeline.run(&roots, &CancelToken::new()).unwrap();

    let names: Vec<String> = store
        .read_all_files()
        .unwrap()
        .into_iter()
        .map(|r| r.name)
        .collect();
    assert_eq!(names, vec!["second.txt".to_string()]);
}

fn exercise_directories(store: &dyn FileStore) {
    store.add_directory(Path::new("/music")).unwrap();
    store.add_directory(Path::new("/docs")).unwrap();
    store.add_directory(Path::new("/music")).unwrap();

    let mut dirs = store.read_all_directories().unwrap();
    dirs.sort();
    assert_eq!(dirs, vec![PathBuf::from("/docs"), PathBuf::from("/music")]);

    store.remove_directory(Path::new("/music")).unwrap();
    store.remove_directory(Path::new("/never-added")).unwrap();
    assert_eq!(
        store.read_all_directories().unwrap(),
        vec![PathBuf::from("/docs")]
    );

    store.clear_files().unwrap();
    assert_eq!(store.read_all_directories().unwrap().len(), 1);
}

#[test]
fn test_directory_set_semantics_match_across_stores() {
    exercise_directories(&MemoryStore::new());
    exercise_directories(&SqliteStore::open_in_memory().unwrap());
}

#[test]
fn test_record_with_same_path_is_replaced() {
    let store = SqliteStore::open_in_memory().unwrap();
    store
        .add_file(&FileRecord::hashed(PathBuf::from("/a/x"), [1; 32]))
        .unwrap();
    store
        .add_file(&FileRecord::hashed(PathBuf::from("/a/x"), [2; 32]))
        .unwrap();

    let records = store.read_all_files().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].content_hash, Some([2; 32]));
}
