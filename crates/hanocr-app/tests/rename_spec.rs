//! Specs for renaming previously downloaded artifacts.

use tempfile::TempDir;

use hanocr_app::naming::RenameMap;
use hanocr_app::services::{ResultIdentifier, SaveOptions};

fn options(dir: &std::path::Path, dry_run: bool) -> SaveOptions {
    SaveOptions::builder()
        .dir(dir.to_path_buf())
        .rename_map(RenameMap::from_entries([("555", "chapter one")]))
        .dry_run(dry_run)
        .build()
}

#[test]
fn renames_suffix_and_token_matches() {
    let temp = TempDir::new().expect("temp dir");
    std::fs::write(temp.path().join("555.txt"), b"text").expect("write");
    std::fs::write(temp.path().join("scan_guid555.json"), b"{}").expect("write");
    std::fs::write(temp.path().join("unrelated.txt"), b"x").expect("write");

    let identifier = ResultIdentifier::new(555);
    let renamed = identifier
        .rename_existing_downloads(&options(temp.path(), false))
        .expect("rename");

    assert_eq!(renamed.len(), 2);
    assert!(temp.path().join("chapter one.txt").is_file());
    assert!(temp.path().join("chapter one.json").is_file());
    assert!(!temp.path().join("555.txt").exists());
    assert!(!temp.path().join("scan_guid555.json").exists());
    assert!(temp.path().join("unrelated.txt").is_file());
}

#[test]
fn dry_run_only_reports_planned_renames() {
    let temp = TempDir::new().expect("temp dir");
    std::fs::write(temp.path().join("555.txt"), b"text").expect("write");

    let identifier = ResultIdentifier::new(555);
    let planned = identifier
        .rename_existing_downloads(&options(temp.path(), true))
        .expect("dry run");

    assert_eq!(planned.len(), 1);
    assert_eq!(planned[0].to, temp.path().join("chapter one.txt"));
    assert!(temp.path().join("555.txt").is_file());
    assert!(!temp.path().join("chapter one.txt").exists());
}

#[test]
fn skips_files_already_named_correctly() {
    let temp = TempDir::new().expect("temp dir");
    // Stem matches the guid token and already carries the target name.
    let map = RenameMap::from_entries([("555", "guid555")]);
    std::fs::write(temp.path().join("guid555.txt"), b"text").expect("write");

    let save = SaveOptions::builder()
        .dir(temp.path().to_path_buf())
        .rename_map(map)
        .build();
    let renamed = ResultIdentifier::new(555)
        .rename_existing_downloads(&save)
        .expect("rename");

    assert!(renamed.is_empty());
    assert!(temp.path().join("guid555.txt").is_file());
}

#[test]
fn absent_directory_renames_nothing() {
    let temp = TempDir::new().expect("temp dir");
    let missing = temp.path().join("never_created");
    let renamed = ResultIdentifier::new(555)
        .rename_existing_downloads(&options(&missing, false))
        .expect("no-op");
    assert!(renamed.is_empty());
}
