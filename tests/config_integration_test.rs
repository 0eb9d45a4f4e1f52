//! Config integration tests - building a merged filesystem from a config file

use std::fs;
use std::io::Read;

use anyhow::Result;
use mergefs::config::{Config, ConfigError};
use mergefs::{OpenMode, Operations};
use serial_test::serial;
use tempfile::TempDir;

#[test]
#[serial]
fn test_config_file_builds_layered_filesystem() -> Result<()> {
    let upper = TempDir::new()?;
    let lower = TempDir::new()?;
    fs::write(upper.path().join("app.toml"), "upper")?;
    fs::write(lower.path().join("app.toml"), "lower")?;
    fs::write(lower.path().join("defaults.toml"), "defaults")?;

    let dir = TempDir::new()?;
    let config_path = dir.path().join("mergefs.toml");
    fs::write(
        &config_path,
        format!(
            r#"
[[backends]]
name = "overrides"
kind = "local"
path = "{}"

[[backends]]
name = "defaults"
kind = "local"
path = "{}"
operations = ["read"]

[[backends]]
name = "scratch"
kind = "memory"
operations = ["create", "write"]
"#,
            upper.path().display(),
            lower.path().display()
        ),
    )?;

    let config = Config::load(Some(&config_path))?;
    let merged = config.build_filesystem()?;

    assert_eq!(merged.backend_names(), vec!["overrides", "defaults", "scratch"]);
    assert_eq!(merged.supported_operations(), Operations::all());

    let root = merged.root_entry();
    assert_eq!(root.num_children()?, 2);

    let mut content = String::new();
    root.get_child("app.toml")?
        .expect("app.toml should exist")
        .open(OpenMode::READ)?
        .read_to_string(&mut content)?;
    assert_eq!(content, "upper");

    Ok(())
}

#[test]
fn test_invalid_config_is_rejected_before_opening() {
    let config = Config::from_toml_str(
        r#"
        [[backends]]
        name = "disk"
        kind = "local"
        "#,
    )
    .unwrap();

    let err = config.build_filesystem().unwrap_err();
    assert!(matches!(err, ConfigError::MissingPath(ref name) if name == "disk"));
    assert!(err.to_string().contains("disk"));
}

#[test]
fn test_unknown_backend_kind_fails_to_parse() {
    let result = Config::from_toml_str(
        r#"
        [[backends]]
        name = "net"
        kind = "nfs"
        "#,
    );
    assert!(result.is_err());
}
