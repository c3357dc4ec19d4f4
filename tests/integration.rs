use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn convo_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("convo");
    path
}

const THREAD: &str = concat!(
    r#"{"date":"2025/9/23(火)","time":"21:00","speaker":"partner","text":"おやすみなさい"}"#,
    "\n",
    r#"{"date":"2025/9/24(水)","time":"06:15既読","speaker":"self","text":"おはよう！"}"#,
    "\n",
    r#"{"date":"2025/9/24(水)","time":"07:30","speaker":"partner","text":"週末どうする？"}"#,
    "\n",
    r#"{"date":"不明","time":"??","speaker":"partner","text":"broken timestamp"}"#,
    "\n",
);

const SNAPSHOT: &str = r#"<html><body>
<div id="container">
  <p class="talkDate">2025/9/24(水)</p>
  <div><div class="talkTime">07:30</div><div class="talkBalloonColor2">週末どうする？</div></div>
  <div><div class="talkTime">07:45既読</div><div class="talkBalloonColor1">海に行きたい！</div></div>
</div>
</body></html>"#;

/// Temp workspace with a config pointing at `source_kind`/`source_file`.
fn setup_test_env(source_kind: &str, source_file: &str, source_body: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(root.join(source_file), source_body).unwrap();

    let config_content = format!(
        r#"[data]
dir = "{root}/data"

[source]
kind = "{kind}"
path = "{root}/{file}"

[reset]
backoff_ms = 10
"#,
        root = root.display(),
        kind = source_kind,
        file = source_file,
    );

    let config_path = config_dir.join("convo.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_convo(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = convo_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("OPENAI_API_KEY")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run convo binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_status_without_index() {
    let (_tmp, config_path) = setup_test_env("jsonl", "thread.jsonl", THREAD);

    let (stdout, stderr, success) = run_convo(&config_path, &["status"]);
    assert!(success, "status failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("status partner_only"));
    assert!(stdout.contains("exists:        false"));
    assert!(stdout.contains("message count: 0"));
    assert!(stdout.contains("never"));
}

#[test]
fn test_reset_is_idempotent() {
    let (tmp, config_path) = setup_test_env("jsonl", "thread.jsonl", THREAD);

    let index_dir = tmp.path().join("data/.db_full_conversation");
    fs::create_dir_all(index_dir.join("leftover")).unwrap();
    fs::write(tmp.path().join("data/.db_full_conversation_metadata.json"), "{}").unwrap();

    let (stdout, stderr, success) =
        run_convo(&config_path, &["reset", "--data-type", "full_conversation"]);
    assert!(success, "reset failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("attempts: 1"));
    assert!(!index_dir.exists());
    assert!(!tmp.path().join("data/.db_full_conversation_metadata.json").exists());

    let (stdout, _, success) =
        run_convo(&config_path, &["reset", "--data-type", "full_conversation"]);
    assert!(success, "second reset failed (not idempotent)");
    assert!(stdout.contains("nothing to delete"));
}

#[test]
fn test_context_from_jsonl() {
    let (_tmp, config_path) = setup_test_env("jsonl", "thread.jsonl", THREAD);

    let (stdout, stderr, success) = run_convo(&config_path, &["context", "-n", "3"]);
    assert!(success, "context failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("--- Recent (3) ---"));
    assert!(stdout.contains("latest partner: 2025/9/24(水) 07:30 週末どうする？"));
    assert!(stdout.contains("latest self:    2025/9/24(水) 06:15既読 おはよう！"));
    // Unparsable timestamps sort last and fall off the window.
    assert!(!stdout.contains("broken timestamp"));
}

#[test]
fn test_context_from_html_snapshot() {
    let (_tmp, config_path) = setup_test_env("html", "talk.html", SNAPSHOT);

    let (stdout, stderr, success) = run_convo(&config_path, &["context"]);
    assert!(success, "context failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("--- Recent (2) ---"));
    let first = stdout.lines().nth(1).unwrap_or_default();
    assert!(first.contains("海に行きたい！"), "newest message should come first: {}", stdout);
}

#[test]
fn test_ensure_with_empty_source_creates_nothing() {
    let (tmp, config_path) = setup_test_env("jsonl", "thread.jsonl", "");

    let (stdout, stderr, success) = run_convo(&config_path, &["ensure"]);
    assert!(success, "ensure failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("No messages found for partner_only"));
    assert!(!tmp.path().join("data/.db_partner_only").exists());
}

#[test]
fn test_ensure_with_embedding_disabled_fails_cleanly() {
    let (tmp, config_path) = setup_test_env("jsonl", "thread.jsonl", THREAD);

    let (_, stderr, success) = run_convo(&config_path, &["ensure"]);
    assert!(!success, "ensure should fail without an embedding provider");
    assert!(stderr.contains("disabled"), "stderr={}", stderr);
    assert!(!tmp.path().join("data/.db_partner_only").exists());
}

#[test]
fn test_sync_dry_run_without_index() {
    let (_tmp, config_path) = setup_test_env("jsonl", "thread.jsonl", THREAD);

    let (stdout, stderr, success) = run_convo(&config_path, &["sync", "--dry-run"]);
    assert!(success, "dry run failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("index: absent"));
    // partner_only keeps the three partner messages.
    assert!(stdout.contains("would bootstrap: 3 messages"));
}

#[test]
fn test_unknown_data_type_rejected() {
    let (_tmp, config_path) = setup_test_env("jsonl", "thread.jsonl", THREAD);

    let (_, stderr, success) = run_convo(&config_path, &["status", "--data-type", "everything"]);
    assert!(!success);
    assert!(stderr.contains("everything"));
}

#[test]
fn test_missing_config_fails() {
    let (_, stderr, success) = run_convo(Path::new("/nonexistent/convo.toml"), &["status"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
