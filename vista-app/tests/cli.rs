use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;

fn shipped_data() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("data")
}

/// 在临时目录中运行，屏蔽外部环境变量。
fn vista(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("vista").unwrap();
    cmd.current_dir(dir)
        .env_remove("VISTA_CONFIG")
        .env_remove("VISTA_HOST_SNAPSHOT")
        .env_remove("VISTA_DATA_ROOTS")
        .env("VISTA_DATA_SOURCE", shipped_data());
    cmd
}

fn write_config(dir: &Path) -> PathBuf {
    let config = dir.join("vista.toml");
    let plugin = dir.join("plugin");
    fs::write(
        &config,
        format!(
            "[paths]\nplugin_root = {:?}\n\n[logging]\nlevel = \"warn\"\n",
            plugin.display().to_string()
        ),
    )
    .unwrap();
    config
}

#[test]
fn lists_registered_commands() {
    let dir = tempfile::tempdir().unwrap();
    vista(dir.path())
        .arg("commands")
        .assert()
        .success()
        .stdout(predicate::str::contains("levels.add"))
        .stdout(predicate::str::contains("sections.duplicate"))
        .stdout(predicate::str::contains("scenes.apply_entry"));
}

#[test]
fn quiet_start_seeds_default_data() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    vista(dir.path())
        .arg("--config")
        .arg(&config)
        .arg("--quiet")
        .assert()
        .success();

    let plans = dir
        .path()
        .join("plugin")
        .join("plans")
        .join("json_data")
        .join("plans_data.json");
    assert!(plans.is_file());

    vista(dir.path())
        .args(["exec", "plans.catalog", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"Layout\""))
        .stdout(predicate::str::contains("\"loaded\": true"));
}

#[test]
fn exec_round_trips_through_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let snapshot = dir.path().join("host.json");

    vista(dir.path())
        .args(["exec", "levels.add", r#"{ "height": 2.9 }"#, "--snapshot"])
        .arg(&snapshot)
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"success\": true"));
    assert!(snapshot.is_file());

    vista(dir.path())
        .args(["exec", "levels.create_base", r#"{ "number": 1 }"#, "--snapshot"])
        .arg(&snapshot)
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"Base\""));

    vista(dir.path())
        .args(["exec", "levels.list", "--snapshot"])
        .arg(&snapshot)
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"has_base\": true"));
}

#[test]
fn failed_command_exits_with_error_envelope() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    vista(dir.path())
        .args(["exec", "levels.create_base", r#"{ "number": 9 }"#, "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"success\": false"))
        .stdout(predicate::str::contains("not_found"));

    vista(dir.path())
        .args(["exec", "nothing.here", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stdout(predicate::str::contains("未知命令"));
}

#[test]
fn demo_prints_summary() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    vista(dir.path())
        .arg("demo")
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("=== Vista 演示 ==="))
        .stdout(predicate::str::contains("失败 0 条"))
        .stdout(predicate::str::contains("支持的命令"));
}

#[test]
fn unreadable_config_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    vista(dir.path())
        .args(["--config", "missing.toml", "--quiet"])
        .assert()
        .success()
        .stderr(predicate::str::contains("使用默认配置"));
}
