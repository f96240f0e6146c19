use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use levin_config::{ConfigError, LevinConfig, SettingsHandle, load, to_toml};

#[test]
fn missing_file_falls_back_to_defaults() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = load(Some(&dir.path().join("absent.toml")))?;
    assert_eq!(config.settings, LevinConfig::default().settings);
    assert!(!config.paths.data_dir.to_string_lossy().starts_with('~'));
    Ok(())
}

#[test]
fn parses_partial_file_and_keeps_defaults_elsewhere() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("levin.toml");
    fs::write(
        &path,
        r#"
[paths]
watch_dir = "/srv/levin/watch"
data_dir = "/srv/levin/data"
state_dir = "/srv/levin/state"

[settings]
upload_limit_kbps = 512
max_storage_gb = 1.5
run_on_battery = true
"#,
    )?;

    let config = load(Some(&path))?;
    assert_eq!(config.paths.watch_dir, PathBuf::from("/srv/levin/watch"));
    assert_eq!(config.settings.upload_limit_kbps, 512);
    assert!(config.settings.run_on_battery);
    assert!(!config.settings.run_on_cellular);
    assert_eq!(config.fetch.max_attempts, 3);

    let engine = config.settings.engine_settings();
    assert_eq!(engine.max_storage_bytes, 1_610_612_736);
    assert_eq!(engine.min_free_bytes, 2_147_483_648);
    Ok(())
}

#[test]
fn unknown_keys_and_invalid_values_are_rejected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("levin.toml");

    fs::write(&path, "[settings]\nturbo = true\n")?;
    assert!(matches!(load(Some(&path)), Err(ConfigError::Parse { .. })));

    fs::write(&path, "[settings]\nmin_free_percentage = 2.0\n")?;
    assert!(matches!(
        load(Some(&path)),
        Err(ConfigError::InvalidField {
            field: "min_free_percentage",
            ..
        })
    ));
    Ok(())
}

#[test]
fn rendered_toml_loads_back_identically() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("levin.toml");
    let mut config = LevinConfig::default();
    config.paths.watch_dir = dir.path().join("watch");
    config.paths.data_dir = dir.path().join("data");
    config.paths.state_dir = dir.path().join("state");
    config.settings.download_limit_kbps = 64;
    fs::write(&path, to_toml(&config)?)?;

    assert_eq!(load(Some(&path))?, config);
    Ok(())
}

#[tokio::test]
async fn reload_publishes_changed_settings() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("levin.toml");
    fs::write(&path, "[settings]\ndownload_limit_kbps = 100\n")?;

    let handle = SettingsHandle::load(Some(&path))?;
    let mut stream = handle.subscribe();
    assert!(!handle.reload()?);

    fs::write(&path, "[settings]\ndownload_limit_kbps = 200\n")?;
    assert!(handle.reload()?);
    let next = stream.next().await.expect("reload delivered");
    assert_eq!(next.settings.download_limit_kbps, 200);

    fs::write(&path, "[settings]\ndownload_limit_kbps = -5\n")?;
    assert!(handle.reload().is_err());
    assert_eq!(handle.current().settings.download_limit_kbps, 200);
    Ok(())
}
