use flate2::read::GzDecoder;
use log_tracker::archiver::archiver::{Archiver, DEFAULT_COMPRESSION_LEVEL, TarGzArchiver};
use log_tracker::helpers::load_config::Config;
use log_tracker::helpers::shutdown::Shutdown;
use log_tracker::runtime::runtime::run_log_tracker;
use log_tracker::tracker::models::{Tracker, TrackerConfig};
use log_tracker::tracker::reader::LineMode;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

const TICK: Duration = Duration::from_millis(50);

fn append(path: &Path, data: &[u8]) {
    let mut f = OpenOptions::new().append(true).open(path).unwrap();
    f.write_all(data).unwrap();
}

fn read_archive(path: &Path) -> HashMap<String, Vec<u8>> {
    let mut archive = tar::Archive::new(GzDecoder::new(File::open(path).unwrap()));
    let mut entries = HashMap::new();
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        let name = entry.path().unwrap().display().to_string();
        let mut content = Vec::new();
        entry.read_to_end(&mut content).unwrap();
        entries.insert(name, content);
    }
    entries
}

#[tokio::test]
async fn two_sources_end_up_in_one_archive() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.txt");
    let b = dir.path().join("b.txt");
    fs::write(&a, b"").unwrap();
    fs::write(&b, b"").unwrap();
    let staging = dir.path().join("staging");

    let mut tracker = Tracker::new(TrackerConfig {
        files: vec![a.clone(), b.clone()],
        poll_interval: TICK,
        staging_dir: staging.clone(),
        line_mode: LineMode::Joined,
    });
    tracker.start().await.unwrap();

    for i in 0..5 {
        append(&a, format!("a-line-{i}\n").as_bytes());
        append(&b, format!("b-line-{i}\n").as_bytes());
        tokio::time::sleep(TICK * 2).await;
    }
    tokio::time::sleep(TICK * 4).await;

    tracker.stop().await.unwrap();

    let staged_a = fs::read(staging.join("a.txt")).unwrap();
    let staged_b = fs::read(staging.join("b.txt")).unwrap();
    assert_eq!(staged_a, b"a-line-0a-line-1a-line-2a-line-3a-line-4");
    assert_eq!(staged_b, b"b-line-0b-line-1b-line-2b-line-3b-line-4");

    let output = dir.path().join("logs_archive.tar.gz");
    TarGzArchiver::new(&output, DEFAULT_COMPRESSION_LEVEL)
        .archive(&tracker.destinations())
        .unwrap();

    let entries = read_archive(&output);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries["a.txt"], staged_a);
    assert_eq!(entries["b.txt"], staged_b);
}

#[tokio::test]
async fn runtime_archives_after_shutdown_signal() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("service.log");
    fs::write(&source, b"ignored history\n").unwrap();
    let staging = dir.path().join("staging");
    let output = dir.path().join("out.tar.gz");

    let raw = format!(
        r#"
[tracker]
files = [{source:?}]
poll_interval_ms = 50
staging_dir = {staging:?}

[archiver]
output_path = {output:?}
"#,
        source = source.display().to_string(),
        staging = staging.display().to_string(),
        output = output.display().to_string(),
    );
    let cfg = Config::from_toml_str(&raw).unwrap();

    let shutdown = Shutdown::new();
    let runtime = tokio::spawn(run_log_tracker(cfg, shutdown.clone()));

    tokio::time::sleep(TICK * 2).await;
    append(&source, b"request served\n");

    let dest = staging.join("service.log");
    for _ in 0..100 {
        if fs::read(&dest).map(|c| c == b"request served").unwrap_or(false) {
            break;
        }
        tokio::time::sleep(TICK).await;
    }

    shutdown.trigger();
    runtime.await.unwrap().unwrap();

    let entries = read_archive(&output);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries["service.log"], b"request served");
}
