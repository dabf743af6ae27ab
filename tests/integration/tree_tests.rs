use std::path::{Path, PathBuf};
use std::sync::Arc;

use dupetree::grouping::{DuplicateTree, EquivalenceKey, LiveSettings, ViewSettings};
use dupetree::pipeline::ScanPipeline;
use dupetree::scanner::FileRecord;
use dupetree::signal::CancelToken;
use dupetree::store::{FileStore, MemoryStore};
use tempfile::TempDir;

use super::common::{test_options, write_file};

fn scanned_tree(root: &Path, settings: ViewSettings) -> DuplicateTree {
    let store = Arc::new(MemoryStore::new());
    ScanPipeline::new(store.clone(), test_options())
        .run(&[root.to_path_buf()], &CancelToken::new())
        .unwrap();
    DuplicateTree::build(store.read_all_files().unwrap(), settings)
}

#[test]
fn test_tree_from_scan_mirrors_directories() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "photos/2023/a.jpg", "A");
    write_file(dir.path(), "photos/2023/b.jpg", "B");
    write_file(dir.path(), "backup/a.jpg", "A");

    let tree = scanned_tree(dir.path(), ViewSettings::new(EquivalenceKey::ByHash));

    let a = tree
        .find_file(&dir.path().join("photos").join("2023").join("a.jpg"))
        .unwrap();
    let parent = tree.node(a).unwrap().parent().unwrap();
    assert_eq!(
        tree.node(parent).unwrap().path(),
        dir.path().join("photos").join("2023")
    );

    let group: Vec<PathBuf> = tree
        .duplicate_group(a)
        .into_iter()
        .map(|r| r.path.clone())
        .collect();
    assert_eq!(group.len(), 2);
    assert!(group.contains(&dir.path().join("backup").join("a.jpg")));
}

#[test]
fn test_duplicates_only_view() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "keep/one.txt", "same");
    write_file(dir.path(), "keep/two.txt", "same");
    write_file(dir.path(), "drop/unique.txt", "different");

    let tree = scanned_tree(
        dir.path(),
        ViewSettings::new(EquivalenceKey::ByHash).with_duplicates_only(true),
    );

    let visible_paths: Vec<PathBuf> = tree
        .visible_nodes()
        .into_iter()
        .map(|(_, id)| tree.node(id).unwrap().path().to_path_buf())
        .collect();
    assert!(visible_paths.contains(&dir.path().join("keep").join("one.txt")));
    assert!(visible_paths.contains(&dir.path().join("keep").join("two.txt")));
    assert!(!visible_paths.contains(&dir.path().join("drop").join("unique.txt")));
    assert!(!visible_paths.contains(&dir.path().join("drop")));
}

#[test]
fn test_live_settings_drive_recomputation() {
    let files = vec![
        FileRecord::hashed(PathBuf::from("/m/a/song.mp3"), [1; 32]),
        FileRecord::hashed(PathBuf::from("/m/b/song.mp3"), [2; 32]),
        FileRecord::hashed(PathBuf::from("/m/b/copy.mp3"), [1; 32]),
    ];
    let live = LiveSettings::new(ViewSettings::new(EquivalenceKey::ByName));
    let mut tree = DuplicateTree::build(files, live.snapshot().settings);
    tree.refresh(&live);

    let song_a = tree.find_file(Path::new("/m/a/song.mp3")).unwrap();
    let copy = tree.find_file(Path::new("/m/b/copy.mp3")).unwrap();
    assert!(tree.node(song_a).unwrap().has_duplicates());
    assert!(!tree.node(copy).unwrap().has_duplicates());

    live.set_key(EquivalenceKey::ByHash);
    live.set_duplicates_only(true);
    assert!(tree.refresh(&live));
    assert!(tree.node(copy).unwrap().has_duplicates());
    assert_eq!(tree.settings().key, EquivalenceKey::ByHash);

    live.set_key(EquivalenceKey::ByNameAndHash);
    assert!(tree.refresh(&live));
    assert!(tree.visible_nodes().is_empty());
    for &root in tree.roots() {
        assert!(!tree.node(root).unwrap().is_visible());
    }
}

#[test]
fn test_json_view_of_scanned_tree() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "x/a.txt", "same");
    write_file(dir.path(), "y/a.txt", "same");

    let tree = scanned_tree(
        dir.path(),
        ViewSettings::new(EquivalenceKey::ByNameAndHash).with_duplicates_only(true),
    );
    let json = serde_json::to_string(&tree.view()).unwrap();

    assert!(json.contains("\"group_size\":2"));
    assert!(json.contains("\"kind\":\"directory\""));
}
