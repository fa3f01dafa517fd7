use std::path::Path;
use std::process::{Command, Output};

use hoard::record::GenericRecord;

fn hoard(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_hoard"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env("HOARD_LOG_LEVEL", "warn")
        .output()
        .unwrap()
}

fn write_config(dir: &Path) -> std::path::PathBuf {
    let history = dir.join("history");
    std::fs::write(&history, ": 1709280000:0;cargo build\n: 1709280060:0;git status\n").unwrap();

    let config = dir.join("config.toml");
    std::fs::write(
        &config,
        format!(
            r#"
[[sources]]
name = "laptop"
type = "shell_history"

[sources.settings]
path = "{}"
"#,
            history.display()
        ),
    )
    .unwrap();
    config
}

#[test]
fn fetch_writes_json_lines() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    let output = hoard(&config, &["fetch"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8(output.stdout).unwrap();
    let records: Vec<GenericRecord> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.header.origin == "laptop"));
    assert_eq!(records[0].header.text, "git status");
}

#[test]
fn show_reads_back_fetched_records() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    let fetched = hoard(&config, &["fetch"]);
    assert!(fetched.status.success());
    let export = dir.path().join("records.jsonl");
    std::fs::write(&export, &fetched.stdout).unwrap();

    let export_arg = export.to_string_lossy().into_owned();
    let shown = hoard(
        &config,
        &["show", &export_arg, "--type", "shell_history", "--summary"],
    );
    assert!(shown.status.success(), "{}", String::from_utf8_lossy(&shown.stderr));

    let stdout = String::from_utf8(shown.stdout).unwrap();
    assert!(stdout.contains("$ git status"));
    assert!(stdout.contains("$ cargo build"));
}
