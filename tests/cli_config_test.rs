use std::process::Command;
use tempfile::TempDir;

fn bin() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_psalm-supervisor"));
    command.env_remove("PSALM_SUPERVISOR_CONFIG");
    command.env_remove("RUST_LOG");
    command
}

#[test]
fn test_init_command() {
    let temp_dir = TempDir::new().unwrap();
    let temp_path = temp_dir.path();

    let output = bin()
        .arg("init")
        .current_dir(temp_path)
        .output()
        .expect("Failed to run init command");
    assert!(output.status.success());

    let config_path = temp_path.join(".psalm-supervisor/settings.toml");
    assert!(config_path.exists());

    let content = std::fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("version = 1"));
    assert!(content.contains("[psalm]"));
    assert!(content.contains("[supervisor]"));

    // Second init without --force refuses to overwrite
    let output = bin()
        .arg("init")
        .current_dir(temp_path)
        .output()
        .expect("Failed to run init command");
    assert!(!output.status.success());
}

#[test]
fn test_config_command() {
    let temp_dir = TempDir::new().unwrap();
    let temp_path = temp_dir.path();

    let config_dir = temp_path.join(".psalm-supervisor");
    std::fs::create_dir_all(&config_dir).unwrap();
    let config_content = r#"
version = 2
[supervisor]
shutdown_timeout_ms = 1234
"#;
    std::fs::write(config_dir.join("settings.toml"), config_content).unwrap();

    let output = bin()
        .arg("config")
        .current_dir(temp_path)
        .output()
        .expect("Failed to run config command");
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("version = 2"));
    assert!(stdout.contains("shutdown_timeout_ms = 1234"));
}

#[test]
fn test_resolve_command() {
    let temp_dir = TempDir::new().unwrap();
    let repo = temp_dir.path().join("repo");
    std::fs::create_dir_all(repo.join("sub")).unwrap();
    std::fs::write(repo.join("psalm.xml"), "<psalm/>").unwrap();
    std::fs::write(repo.join("sub/psalm.xml"), "<psalm/>").unwrap();

    let output = bin()
        .arg("resolve")
        .arg("--root")
        .arg(&repo)
        .current_dir(temp_dir.path())
        .output()
        .expect("Failed to run resolve command");
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let selected = repo.join("psalm.xml");
    assert!(stdout.contains(&format!("Selected: {}", selected.display())));
}

#[test]
fn test_resolve_without_matches_fails() {
    let temp_dir = TempDir::new().unwrap();

    let output = bin()
        .arg("resolve")
        .arg("--root")
        .arg(temp_dir.path())
        .current_dir(temp_dir.path())
        .output()
        .expect("Failed to run resolve command");
    assert!(!output.status.success());

    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("No Config file found in: psalm.xml,psalm.xml.dist"));
}
