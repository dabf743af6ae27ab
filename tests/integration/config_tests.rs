use std::fs;

use dupetree::config::{Config, ConfigError};
use dupetree::grouping::EquivalenceKey;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use tempfile::tempdir;

#[test]
fn test_config_load_defaults() {
    // Build the figment by hand so environment variables set by other tests
    // cannot leak in.
    let figment = Figment::from(Serialized::defaults(Config::default()));
    let config = Config::from_figment(&figment).unwrap();

    assert_eq!(config.chunk_size, 256 * 1024);
    assert_eq!(config.batch_channel_capacity, 64);
    assert_eq!(config.default_key, EquivalenceKey::ByName);
    assert!(!config.duplicates_only);
}

#[test]
fn test_config_load_from_toml() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
database = "/var/lib/dupetree/files.db"
io_threads = 3
chunk_size = 65536
sample_interval_ms = 100
default_key = "name-hash"
duplicates_only = true
"#,
    )
    .unwrap();

    let figment = Figment::from(Serialized::defaults(Config::default())).merge(Toml::file(&path));
    let config = Config::from_figment(&figment).unwrap();

    assert_eq!(config.database, std::path::PathBuf::from("/var/lib/dupetree/files.db"));
    assert_eq!(config.io_threads, 3);
    assert_eq!(config.chunk_size, 65536);
    assert_eq!(config.sample_interval_ms, 100);
    assert_eq!(config.default_key, EquivalenceKey::ByNameAndHash);
    assert!(config.duplicates_only);
}

#[test]
fn test_config_env_overrides_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "io_threads = 3\ndefault_key = \"name\"\n").unwrap();

    std::env::set_var("DUPETREE_TEST_IO_THREADS", "12");
    std::env::set_var("DUPETREE_TEST_DEFAULT_KEY", "hash");

    let figment = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(&path))
        .merge(Env::prefixed("DUPETREE_TEST_"));
    let config = Config::from_figment(&figment).unwrap();

    std::env::remove_var("DUPETREE_TEST_IO_THREADS");
    std::env::remove_var("DUPETREE_TEST_DEFAULT_KEY");

    assert_eq!(config.io_threads, 12);
    assert_eq!(config.default_key, EquivalenceKey::ByHash);
}

#[test]
fn test_config_values_are_clamped() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "io_threads = 0\nchunk_size = 1\nsample_interval_ms = 0\n").unwrap();

    let config = Config::load(Some(&path)).unwrap();

    assert_eq!(config.io_threads, 1);
    assert_eq!(config.chunk_size, 4 * 1024);
    assert_eq!(config.sample_interval_ms, 1);
}

#[test]
fn test_config_missing_file_uses_defaults() {
    let dir = tempdir().unwrap();
    let config = Config::load(Some(&dir.path().join("absent.toml"))).unwrap();
    assert_eq!(config.chunk_size, 256 * 1024);
}

#[test]
fn test_config_unknown_key_is_invalid() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "default_key = \"size\"\n").unwrap();

    let figment = Figment::from(Serialized::defaults(Config::default())).merge(Toml::file(&path));
    let err = Config::from_figment(&figment).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn test_config_save_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("sub").join("config.toml");
    let config = Config {
        io_threads: 5,
        default_key: EquivalenceKey::ByHash,
        ..Config::default()
    };

    config.save(&path).unwrap();
    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains("default_key = \"hash\""));

    let figment = Figment::from(Serialized::defaults(Config::default())).merge(Toml::file(&path));
    assert_eq!(Config::from_figment(&figment).unwrap(), config);
}
