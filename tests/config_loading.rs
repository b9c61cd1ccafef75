mod common;

use std::fs;
use std::time::Duration;

use common::builders::ConfigFileBuilder;
use common::TestResult;
use tempfile::tempdir;
use watchpool::config::{load_and_validate, load_from_path, load_or_default, ConfigFile};
use watchpool::{ManagerConfig, WatchpoolError};

#[test]
fn empty_file_uses_defaults() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("Watchpool.toml");
    fs::write(&path, "")?;

    let cfg = load_and_validate(&path)?;
    assert_eq!(cfg, ConfigFile::default());
    assert_eq!(cfg.debounce(), Duration::from_millis(100));
    assert_eq!(cfg.watcher.max_handles, None);
    Ok(())
}

#[test]
fn watcher_section_is_read() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("Watchpool.toml");
    fs::write(
        &path,
        r#"
[watcher]
debounce_ms = 250
max_handles = 8
"#,
    )?;

    let cfg = load_and_validate(&path)?;
    assert_eq!(cfg.watch_options().debounce, Duration::from_millis(250));

    let manager = ManagerConfig::from(&cfg);
    assert_eq!(manager.max_handles, Some(8));
    assert_eq!(manager.default_options.debounce, Duration::from_millis(250));
    Ok(())
}

#[test]
fn out_of_range_debounce_is_rejected() -> TestResult {
    let dir = tempdir()?;
    for bad in ["0", "60001"] {
        let path = dir.path().join(format!("bad-{bad}.toml"));
        fs::write(&path, format!("[watcher]\ndebounce_ms = {bad}\n"))?;

        // Deserializes fine; validation is what fails.
        load_from_path(&path)?;
        let err = load_and_validate(&path).unwrap_err();
        assert!(matches!(err, WatchpoolError::ConfigError(ref msg) if msg.contains("debounce_ms")));
    }
    Ok(())
}

#[test]
fn zero_max_handles_is_rejected() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("Watchpool.toml");
    fs::write(&path, "[watcher]\nmax_handles = 0\n")?;

    let err = load_and_validate(&path).unwrap_err();
    assert!(matches!(err, WatchpoolError::ConfigError(_)));
    Ok(())
}

#[test]
fn malformed_toml_is_a_toml_error() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("Watchpool.toml");
    fs::write(&path, "[watcher\ndebounce_ms = ")?;

    assert!(matches!(load_from_path(&path), Err(WatchpoolError::TomlError(_))));
    Ok(())
}

#[test]
fn missing_explicit_path_is_an_io_error() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("nope.toml");
    assert!(matches!(
        load_or_default(Some(&path)),
        Err(WatchpoolError::IoError(_))
    ));
    Ok(())
}

#[test]
fn builder_produces_validated_config() {
    let cfg = ConfigFileBuilder::new().debounce_ms(40).max_handles(2).build();
    assert_eq!(cfg.debounce(), Duration::from_millis(40));
    assert_eq!(cfg.watcher.max_handles, Some(2));
}
