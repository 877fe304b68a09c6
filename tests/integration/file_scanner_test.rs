use sheetmon::core::file_scanner::FileScanner;
use sheetmon::core::sample::{DirectoryStats, Sample, SheetRow};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_nested_tree_totals() {
    let temp_dir = TempDir::new().unwrap();
    let deep = temp_dir.path().join("a").join("b").join("c");
    fs::create_dir_all(&deep).unwrap();
    fs::write(temp_dir.path().join("top.bin"), vec![0u8; 100]).unwrap();
    fs::write(deep.join("deep.bin"), vec![0u8; 23]).unwrap();

    let stats = FileScanner::new().scan(temp_dir.path());

    assert!(stats.is_ok());
    assert_eq!(stats.file_count, 2);
    assert_eq!(stats.dir_count, 3);
    assert_eq!(stats.total_size_bytes, 123);
}

#[test]
fn test_scan_results_survive_row_encoding() {
    let temp_dir = TempDir::new().unwrap();
    let present = temp_dir.path().join("present");
    fs::create_dir(&present).unwrap();
    fs::write(present.join("x.txt"), "abc").unwrap();
    let missing = temp_dir.path().join("missing");

    let stats = FileScanner::new().scan_all(&[present.clone(), missing.clone()]);
    let sample = Sample {
        sequence_id: 42,
        timestamp: chrono::Utc::now(),
        cpu_percent: 1.0,
        ram_percent: 2.0,
        net_bytes_sent_delta: 0,
        net_bytes_recv_delta: 0,
        directory_stats: stats,
    };

    let row = SheetRow::from(&sample);
    assert_eq!(row.sequence_id, 42);

    let decoded: Vec<DirectoryStats> =
        serde_json::from_str(row.values[6].as_str().unwrap()).unwrap();
    assert_eq!(decoded.len(), 2);
    assert_eq!(decoded[0].path, present);
    assert_eq!(decoded[0].total_size_bytes, 3);
    assert_eq!(decoded[1].path, missing);
    assert!(decoded[1].error.is_some());
}
