use std::{
    io::Write as _,
    process::{Command, Stdio},
};

use eyre::Context as _;
use serde_json::{json, Value};

fn bridge_cmd(cfg_dir: &tempfile::TempDir, data_dir: &tempfile::TempDir) -> Command {
    let exe = assert_cmd::cargo::cargo_bin!("agoric-bridge");
    let mut cmd = Command::new(exe);
    cmd.env("AGORIC_BRIDGE_CONFIG_DIR", cfg_dir.path())
        .env("AGORIC_BRIDGE_DATA_DIR", data_dir.path())
        .env_remove("AGORIC_BRIDGE_MNEMONIC")
        .env_remove("AGORIC_BRIDGE_NETWORK");
    cmd
}

#[test]
fn paths_reports_the_override_dirs() -> eyre::Result<()> {
    let cfg_dir = tempfile::tempdir()?;
    let data_dir = tempfile::tempdir()?;
    let out = bridge_cmd(&cfg_dir, &data_dir)
        .arg("paths")
        .output()
        .context("run agoric-bridge paths")?;
    assert!(
        out.status.success(),
        "paths exited non-zero: {}",
        String::from_utf8_lossy(&out.stderr)
    );

    let v: Value = serde_json::from_slice(&out.stdout).context("parse paths json")?;
    assert_eq!(
        v.get("config_dir").and_then(Value::as_str),
        cfg_dir.path().to_str()
    );
    assert!(v
        .get("log_file")
        .and_then(Value::as_str)
        .is_some_and(|p| p.ends_with("agoric-bridge.log.jsonl")));
    Ok(())
}

#[test]
fn networks_lists_every_profile() -> eyre::Result<()> {
    let cfg_dir = tempfile::tempdir()?;
    let data_dir = tempfile::tempdir()?;
    let out = bridge_cmd(&cfg_dir, &data_dir)
        .arg("networks")
        .output()
        .context("run agoric-bridge networks")?;
    assert!(out.status.success(), "networks exited non-zero");

    let v: Value = serde_json::from_slice(&out.stdout).context("parse networks json")?;
    let names: Vec<&str> = v
        .as_array()
        .map(|a| a.iter().filter_map(|p| p.get("name")?.as_str()).collect())
        .unwrap_or_default();
    assert_eq!(names, ["mainnet", "devnet", "emerynet", "local"]);
    Ok(())
}

#[test]
fn serve_answers_status_and_writes_default_config() -> eyre::Result<()> {
    let cfg_dir = tempfile::tempdir()?;
    let data_dir = tempfile::tempdir()?;
    let mut child = bridge_cmd(&cfg_dir, &data_dir)
        .env("AGORIC_BRIDGE_SETTLE_DELAY_MS", "60000")
        .args(["serve", "--network", "local"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .context("spawn agoric-bridge serve")?;

    {
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| eyre::eyre!("no stdin"))?;
        writeln!(stdin, r#"{{"type":"GET_STATUS","id":"r1"}}"#)?;
        writeln!(stdin, r#"{{"type":"NOT_A_REQUEST","id":"r2"}}"#)?;
    }
    let out = child.wait_with_output().context("wait for serve")?;
    assert!(out.status.success(), "serve exited non-zero");

    let frames: Vec<Value> = String::from_utf8(out.stdout)?
        .lines()
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()
        .context("parse output frames")?;
    assert_eq!(frames.len(), 1, "frames: {frames:?}");
    let reply = frames.first().cloned().unwrap_or_default();
    assert_eq!(reply.get("type"), Some(&json!("AGORIC_RESPONSE")));
    assert_eq!(reply.get("id"), Some(&json!("r1")));
    assert_eq!(reply.pointer("/data/initialized"), Some(&json!(false)));
    assert_eq!(reply.pointer("/data/connected"), Some(&json!(false)));
    assert_eq!(reply.pointer("/data/network"), Some(&json!("local")));

    assert!(cfg_dir.path().join("config.toml").exists());
    Ok(())
}
