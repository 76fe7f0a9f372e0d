//! Worker configuration tests
//!
//! These swap HOME, so they run serially.

use serial_test::serial;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

use ceylon_offline::config::{ConfigOptions, WorkerConfig, DEFAULT_PRECACHE};

/// Point HOME at a temp dir for the duration of a test
struct HomeGuard {
    prev: Option<std::ffi::OsString>,
    temp: TempDir,
}

impl HomeGuard {
    fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let prev = std::env::var_os("HOME");
        std::env::set_var("HOME", temp.path());
        Self { prev, temp }
    }

    fn write_config(&self, contents: &str) {
        let dir = self.temp.path().join(".ceylon-offline");
        fs::create_dir_all(&dir).expect("Failed to create config dir");
        fs::write(dir.join("config.toml"), contents).expect("Failed to write config");
    }
}

impl Drop for HomeGuard {
    fn drop(&mut self) {
        match self.prev.take() {
            Some(val) => std::env::set_var("HOME", val),
            None => std::env::remove_var("HOME"),
        }
    }
}

#[test]
#[serial]
fn test_load_from_file_not_exists() {
    let home = HomeGuard::new();

    let config = WorkerConfig::load_from_file().expect("missing file means defaults");
    assert_eq!(config.version, 1);
    assert_eq!(config.store_prefix, "ceylon-gems");
    assert_eq!(config.data_dir, home.temp.path().join(".ceylon-offline"));
    assert_eq!(config.precache.len(), DEFAULT_PRECACHE.len());
}

#[test]
#[serial]
fn test_load_from_file_valid_config() {
    let home = HomeGuard::new();
    home.write_config(
        r#"
[worker]
origin = "https://ceylongems.example"
version = 4
store_prefix = "cg"
precache = ["/", "/offline.html"]
storage_quota = 1048576
"#,
    );

    let config = WorkerConfig::load_from_file().unwrap();
    assert_eq!(config.origin.as_str(), "https://ceylongems.example/");
    assert_eq!(config.version, 4);
    assert_eq!(config.store_prefix, "cg");
    assert_eq!(config.precache, vec!["/", "/offline.html"]);
    assert_eq!(config.storage_quota, 1_048_576);
}

#[test]
#[serial]
fn test_load_from_file_invalid_values_fallback() {
    let home = HomeGuard::new();
    home.write_config(
        r#"
[worker]
origin = "not a url"
version = -3
store_prefix = "gems"
precache = [1, 2]
"#,
    );

    let config = WorkerConfig::load_from_file().unwrap();
    assert_eq!(config.origin.as_str(), "http://localhost:5173/");
    assert_eq!(config.version, 1);
    assert_eq!(config.store_prefix, "gems");
    assert_eq!(config.precache.len(), DEFAULT_PRECACHE.len());
}

#[test]
#[serial]
fn test_other_sections_are_ignored() {
    let home = HomeGuard::new();
    home.write_config(
        r#"
[cache]
ttl = 3600
"#,
    );

    let config = WorkerConfig::load_from_file().unwrap();
    assert_eq!(config.version, 1);
}

#[test]
#[serial]
fn test_unparseable_file_is_an_error() {
    let home = HomeGuard::new();
    home.write_config("[worker\nversion = ");

    assert!(WorkerConfig::load_from_file().is_err());
    // from_options falls back to defaults instead
    assert_eq!(WorkerConfig::from_options(ConfigOptions::new()).version, 1);
}

#[test]
#[serial]
fn test_options_override_file() {
    let home = HomeGuard::new();
    home.write_config(
        r#"
[worker]
version = 4
data_dir = "/var/lib/ceylon"
"#,
    );

    let config = WorkerConfig::from_options(
        ConfigOptions::new()
            .with_version(5)
            .with_data_dir(PathBuf::from("/tmp/ceylon-test")),
    );
    assert_eq!(config.version, 5);
    assert_eq!(config.data_dir, PathBuf::from("/tmp/ceylon-test"));
}

#[test]
#[serial]
fn test_ensure_data_dir_creates_directory() {
    let home = HomeGuard::new();
    let target = home.temp.path().join("nested").join("data");

    let config = WorkerConfig::from_options(ConfigOptions::new().with_data_dir(target.clone()));
    config.ensure_data_dir().unwrap();
    assert!(target.is_dir());
}
