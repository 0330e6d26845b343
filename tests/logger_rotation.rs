//! Integration tests for on-disk session log layout, exercised through the public API only.

mod common;

use chrono::Local;
use common::temp_test_dir;
use tty_relay::logger::SessionLogger;

fn date_dir(base: &std::path::Path) -> std::path::PathBuf {
    base.join(Local::now().date_naive().format("%Y/%m/%d").to_string())
}

#[test]
fn two_sessions_in_the_same_day_get_distinct_file_names() {
    let dir = temp_test_dir();

    let mut a = SessionLogger::new(dir.path(), "aaaaaaaa");
    let mut b = SessionLogger::new(dir.path(), "bbbbbbbb");
    a.start().unwrap();
    b.start().unwrap();
    a.write(b"from a\n");
    b.write(b"from b\n");
    a.stop();
    b.stop();

    let entries: Vec<_> = std::fs::read_dir(date_dir(dir.path()))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();

    assert!(entries.iter().any(|n| n.contains("aaaaaaaa")));
    assert!(entries.iter().any(|n| n.contains("bbbbbbbb")));
    // typescript + timing file per session
    assert_eq!(entries.len(), 4, "expected 4 files total, got {:?}", entries);
}

#[test]
fn typescript_and_timing_files_share_a_base_name() {
    let dir = temp_test_dir();
    let mut logger = SessionLogger::new(dir.path(), "pairing1");
    logger.start().unwrap();
    logger.write(b"x");
    logger.stop();

    let mut entries: Vec<_> = std::fs::read_dir(date_dir(dir.path()))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    entries.sort();

    assert_eq!(entries.len(), 2);
    let typescript = entries.iter().find(|n| !n.ends_with(".timing")).unwrap();
    let timing = entries.iter().find(|n| n.ends_with(".timing")).unwrap();
    assert_eq!(format!("{}.timing", typescript), *timing);
}

#[test]
fn dropping_a_logger_without_explicit_stop_still_writes_the_footer() {
    let dir = temp_test_dir();
    {
        let mut logger = SessionLogger::new(dir.path(), "dropme01");
        logger.start().unwrap();
        logger.write(b"still here\n");
        // no explicit stop() — Drop must flush the footer.
    }

    let typescript = std::fs::read_dir(date_dir(dir.path()))
        .unwrap()
        .map(|e| e.unwrap().path())
        .find(|p| !p.to_string_lossy().ends_with(".timing"))
        .expect("typescript file should exist");

    let contents = std::fs::read_to_string(typescript).unwrap();
    assert!(contents.contains("Script done on"), "Drop should write the footer");
}

#[test]
fn date_directory_layout_is_year_month_day() {
    let dir = temp_test_dir();
    let mut logger = SessionLogger::new(dir.path(), "layout01");
    logger.start().unwrap();
    logger.stop();

    let today = Local::now().date_naive();
    let expected = dir
        .path()
        .join(today.format("%Y").to_string())
        .join(today.format("%m").to_string())
        .join(today.format("%d").to_string());
    assert!(expected.is_dir(), "expected {:?} to exist", expected);
}
