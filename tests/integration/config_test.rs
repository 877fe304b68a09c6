use sheetmon::core::config::{Config, DeliverySemantics};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_default_path_is_under_sheetmon() {
    // Fails only on platforms without a config directory
    if let Ok(path) = Config::default_path() {
        assert!(path.ends_with(PathBuf::from("sheetmon").join("config.json")));
    }
}

#[test]
fn test_semantics_parse_from_kebab_case() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");
    fs::write(
        &path,
        r#"{
            "interval_seconds": 60,
            "directories": ["/srv"],
            "sink": {"credentials_ref": "/etc/key.json", "destination_id": "abc"},
            "delivery": {"semantics": "sink-deduplicates"}
        }"#,
    )
    .unwrap();

    let config = Config::load_from(&path).unwrap();
    assert_eq!(config.delivery.semantics, DeliverySemantics::SinkDeduplicates);
    assert!(config.validate().is_ok());
    assert!(config.validate_sink().is_ok());
}

#[test]
fn test_malformed_file_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");
    fs::write(&path, "{ not json").unwrap();

    let err = Config::load_from(&path).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config file"));
}

#[test]
fn test_empty_file_is_default() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");
    fs::write(&path, "  \n").unwrap();

    assert_eq!(Config::load_from(&path).unwrap(), Config::default());
}

#[test]
fn test_edits_persist() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");

    let mut config = Config::default();
    config.add_directory(PathBuf::from("/var/log"));
    config.interval_seconds = 30;
    config.save_to(&path).unwrap();

    let mut loaded = Config::load_from(&path).unwrap();
    assert_eq!(loaded.directories, vec![PathBuf::from("/var/log")]);
    assert_eq!(loaded.interval_seconds, 30);

    assert!(loaded.remove_directory(&PathBuf::from("/var/log")));
    loaded.save_to(&path).unwrap();
    assert!(Config::load_from(&path).unwrap().directories.is_empty());
}
