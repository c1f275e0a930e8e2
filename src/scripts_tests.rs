use super::*;
use crate::config::Config;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn touch(dir: &Path, relative: &str) -> PathBuf {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, "").unwrap();
    path
}

#[test]
fn test_is_applescript() {
    assert!(is_applescript(Path::new("hello.scpt")));
    assert!(is_applescript(Path::new("/Users/me/Scripts/hello.applescript")));
    assert!(is_applescript(Path::new("LOUD.SCPT")));
    assert!(!is_applescript(Path::new("notes.txt")));
    assert!(!is_applescript(Path::new("script")));
    assert!(!is_applescript(Path::new("bundle.scptd")));
}

#[test]
fn test_missing_directory_yields_nothing() {
    let dir = TempDir::new().unwrap();
    assert!(read_scripts_from_dir(&dir.path().join("absent")).is_empty());
}

#[test]
fn test_reads_only_applescript_files_sorted_by_name() {
    let dir = TempDir::new().unwrap();
    touch(dir.path(), "zeta.scpt");
    touch(dir.path(), "Alpha.applescript");
    touch(dir.path(), "readme.md");
    touch(dir.path(), "nested/beta.scpt");

    let scripts = read_scripts_from_dir(dir.path());

    let names: Vec<&str> = scripts.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Alpha", "beta", "zeta"]);
    assert_eq!(scripts[1].resolved_path, dir.path().join("nested/beta.scpt"));
}

#[test]
fn test_directories_with_script_extension_are_skipped() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("folder.scpt")).unwrap();
    touch(dir.path(), "real.scpt");

    let scripts = read_scripts_from_dir(dir.path());

    assert_eq!(scripts.len(), 1);
    assert_eq!(scripts[0].name, "real");
}

#[test]
fn test_read_scripts_uses_configured_folder() {
    let dir = TempDir::new().unwrap();
    touch(dir.path(), "configured.scpt");
    let config = Config {
        scripts_dir: Some(dir.path().to_string_lossy().into_owned()),
        ..Default::default()
    };

    let scripts = read_scripts(&config);

    assert_eq!(scripts.len(), 1);
    assert_eq!(scripts[0].name, "configured");
}
