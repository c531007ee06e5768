//! Integration tests for the instance lock as seen through the `refbot` binary.

use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const TOKEN: &str = "123456:integration-test-token";

fn refbot(temp_path: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_refbot"));
    cmd.args(args)
        .current_dir(temp_path)
        .env_remove("REFBOT_TELEGRAM_BOT_TOKEN")
        .env_remove("TELEGRAM_BOT_TOKEN")
        .env_remove("DATABASE_URL")
        .env("RUST_LOG", "info");
    cmd
}

fn output(cmd: &mut Command) -> Output {
    cmd.output().expect("Failed to execute refbot")
}

fn status_json(temp_path: &Path, lock_file: &Path) -> serde_json::Value {
    let out = output(&mut refbot(
        temp_path,
        &[
            "status",
            "--lock-file",
            lock_file.to_str().unwrap(),
            "--format",
            "json",
        ],
    ));
    assert!(
        out.status.success(),
        "status failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    serde_json::from_slice(&out.stdout).expect("parse status json")
}

#[test]
fn test_status_without_lock_reports_not_running() {
    let temp_dir = TempDir::new().expect("temp dir");
    let lock_file = temp_dir.path().join("bot.lock");

    let status = status_json(temp_dir.path(), &lock_file);
    assert_eq!(status["running"], false);
    assert!(status["pid"].is_null());
}

#[test]
fn test_status_reports_holder_pid() {
    let temp_dir = TempDir::new().expect("temp dir");
    let lock_file = temp_dir.path().join("bot.lock");
    let pid = std::process::id();
    std::fs::write(
        &lock_file,
        format!(r#"{{"pid": {pid}, "started": "2026-01-01T00:00:00Z"}}"#),
    )
    .unwrap();

    let status = status_json(temp_dir.path(), &lock_file);
    assert_eq!(status["running"], true);
    assert_eq!(status["pid"], pid);
    assert_eq!(status["holder"], "alive");
}

#[test]
fn test_status_uses_lock_file_from_config() {
    let temp_dir = TempDir::new().expect("temp dir");
    let lock_file = temp_dir.path().join("configured.lock");
    std::fs::write(
        temp_dir.path().join("refbot.yml"),
        format!("lock_file: {}\n", lock_file.display()),
    )
    .unwrap();
    std::fs::write(&lock_file, "locked").unwrap();

    let out = output(&mut refbot(
        temp_dir.path(),
        &["status", "--format", "json"],
    ));
    assert!(out.status.success());
    let status: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(status["running"], true);
    assert_eq!(status["holder"], "unknown");
}

#[test]
fn test_run_refuses_when_lock_present() {
    let temp_dir = TempDir::new().expect("temp dir");
    let lock_file = temp_dir.path().join("bot.lock");
    std::fs::write(&lock_file, "locked").unwrap();

    let out = output(
        refbot(
            temp_dir.path(),
            &["run", "--lock-file", lock_file.to_str().unwrap()],
        )
        .env("REFBOT_TELEGRAM_BOT_TOKEN", TOKEN)
        .env("DATABASE_URL", "postgres://refbot@127.0.0.1:9/refbot"),
    );

    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert_eq!(
        stderr.matches("already running").count(),
        1,
        "error reported more than once: {stderr}"
    );
    assert_eq!(std::fs::read_to_string(&lock_file).unwrap(), "locked");
}

#[test]
fn test_run_with_bad_database_url_exits_and_removes_lock() {
    let temp_dir = TempDir::new().expect("temp dir");
    let lock_file = temp_dir.path().join("bot.lock");

    let out = output(
        refbot(
            temp_dir.path(),
            &["run", "--lock-file", lock_file.to_str().unwrap()],
        )
        .env("REFBOT_TELEGRAM_BOT_TOKEN", TOKEN)
        .env("DATABASE_URL", "not a database url"),
    );

    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("database"), "stderr: {stderr}");
    assert!(!lock_file.exists());
}

#[test]
fn test_run_with_multibyte_token_fails_cleanly() {
    let temp_dir = TempDir::new().expect("temp dir");
    let lock_file = temp_dir.path().join("bot.lock");

    let out = output(
        refbot(
            temp_dir.path(),
            &["run", "--lock-file", lock_file.to_str().unwrap()],
        )
        .env("REFBOT_TELEGRAM_BOT_TOKEN", "日本語日本語")
        .env("DATABASE_URL", "not a database url"),
    );

    // 101 would mean a panic while masking the token
    assert_eq!(out.status.code(), Some(1));
    assert!(!lock_file.exists());
}

#[test]
fn test_run_rejects_invalid_api_url() {
    let temp_dir = TempDir::new().expect("temp dir");
    let lock_file = temp_dir.path().join("bot.lock");
    std::fs::write(
        temp_dir.path().join("refbot.yml"),
        "telegram:\n  api_url: \"not a url\"\n",
    )
    .unwrap();

    let out = output(
        refbot(
            temp_dir.path(),
            &["run", "--lock-file", lock_file.to_str().unwrap()],
        )
        .env("REFBOT_TELEGRAM_BOT_TOKEN", TOKEN)
        .env("DATABASE_URL", "postgres://refbot@127.0.0.1:9/refbot"),
    );

    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("invalid API URL"), "stderr: {stderr}");
    assert!(!lock_file.exists());
}

#[test]
fn test_malformed_dotenv_is_reported() {
    let temp_dir = TempDir::new().expect("temp dir");
    let lock_file = temp_dir.path().join("bot.lock");
    std::fs::write(temp_dir.path().join(".env"), "this line is not an assignment\n").unwrap();

    let out = output(&mut refbot(
        temp_dir.path(),
        &["status", "--lock-file", lock_file.to_str().unwrap()],
    ));

    assert!(out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("Failed to load .env file"), "stderr: {stderr}");
}

#[test]
fn test_missing_dotenv_is_silent() {
    let temp_dir = TempDir::new().expect("temp dir");
    let lock_file = temp_dir.path().join("bot.lock");

    let out = output(&mut refbot(
        temp_dir.path(),
        &["status", "--lock-file", lock_file.to_str().unwrap()],
    ));

    assert!(out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(!stderr.contains(".env"), "stderr: {stderr}");
}

#[test]
fn test_run_without_token_fails_before_locking() {
    let temp_dir = TempDir::new().expect("temp dir");
    let lock_file = temp_dir.path().join("bot.lock");

    let out = output(
        refbot(
            temp_dir.path(),
            &["run", "--lock-file", lock_file.to_str().unwrap()],
        )
        .env("DATABASE_URL", "postgres://refbot@127.0.0.1:9/refbot"),
    );

    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("TELEGRAM_BOT_TOKEN"), "stderr: {stderr}");
    assert!(!lock_file.exists());
}

#[test]
fn test_unlock_removes_marker_of_dead_process() {
    let temp_dir = TempDir::new().expect("temp dir");
    let lock_file = temp_dir.path().join("bot.lock");
    // Above the Linux pid_max ceiling, so no such process exists
    std::fs::write(
        &lock_file,
        r#"{"pid": 2147483647, "started": "2026-01-01T00:00:00Z"}"#,
    )
    .unwrap();

    let out = output(&mut refbot(
        temp_dir.path(),
        &["unlock", "--lock-file", lock_file.to_str().unwrap()],
    ));

    assert!(
        out.status.success(),
        "unlock failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    assert!(!lock_file.exists());
}

#[cfg(unix)]
#[test]
fn test_unlock_refuses_live_holder_without_force() {
    let temp_dir = TempDir::new().expect("temp dir");
    let lock_file = temp_dir.path().join("bot.lock");
    let pid = std::process::id();
    std::fs::write(
        &lock_file,
        format!(r#"{{"pid": {pid}, "started": "2026-01-01T00:00:00Z"}}"#),
    )
    .unwrap();
    let lock_arg = lock_file.to_str().unwrap();

    let out = output(&mut refbot(
        temp_dir.path(),
        &["unlock", "--lock-file", lock_arg],
    ));
    assert_eq!(out.status.code(), Some(1));
    assert!(lock_file.exists());

    let out = output(&mut refbot(
        temp_dir.path(),
        &["unlock", "--lock-file", lock_arg, "--force"],
    ));
    assert!(out.status.success());
    assert!(!lock_file.exists());
}

#[test]
fn test_unlock_without_marker_is_noop() {
    let temp_dir = TempDir::new().expect("temp dir");
    let lock_file = temp_dir.path().join("bot.lock");

    let out = output(&mut refbot(
        temp_dir.path(),
        &["unlock", "--lock-file", lock_file.to_str().unwrap()],
    ));
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("No lock file"), "stdout: {stdout}");
}
