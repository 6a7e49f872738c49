use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn motocare_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_motocare"))
}

fn setup_test_env(extra: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/motocare.sqlite"

[server]
bind = "127.0.0.1:7332"
uploads_dir = "{root}/uploads"

[auth]
jwt_secret = "integration-secret"

[embedding]
api_key_env = "MOTOCARE_INTEGRATION_UNSET_KEY"
max_retries = 0
{extra}
"#,
        root = root.display(),
        extra = extra
    );

    let config_path = config_dir.join("motocare.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_motocare(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = motocare_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("JWT_SECRET")
        .env_remove("MOTOCARE_INTEGRATION_UNSET_KEY")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run motocare binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env("");

    let (stdout, stderr, success) = run_motocare(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/motocare.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env("");

    let (_, _, success1) = run_motocare(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_motocare(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_stats_on_empty_database() {
    let (_tmp, config_path) = setup_test_env("");
    run_motocare(&config_path, &["init"]);

    let (stdout, stderr, success) = run_motocare(&config_path, &["stats"]);
    assert!(success, "stats failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("users:"));
    assert!(stdout.contains("fred_chunks:"));
    assert!(stdout.contains("not loaded"));
}

#[test]
fn test_fred_load_without_api_key_names_variable() {
    let (_tmp, config_path) = setup_test_env("");
    run_motocare(&config_path, &["init"]);

    let (_, stderr, success) = run_motocare(&config_path, &["fred", "load"]);
    assert!(!success, "load should fail without an API key");
    assert!(
        stderr.contains("MOTOCARE_INTEGRATION_UNSET_KEY is not configured"),
        "stderr={}",
        stderr
    );
}

#[test]
fn test_fred_load_disabled_provider_fails() {
    let (_tmp, config_path) = setup_test_env("provider = \"disabled\"");

    let (_, stderr, success) = run_motocare(&config_path, &["fred", "load"]);
    assert!(!success);
    assert!(stderr.contains("disabled"), "stderr={}", stderr);
}

#[test]
fn test_fred_load_rejects_bad_corpus_file() {
    let (tmp, config_path) = setup_test_env("");
    let corpus = tmp.path().join("corpus.toml");
    fs::write(&corpus, "[[chunks]]\ntopic = \"Oil\"\n").unwrap();

    let (_, stderr, success) = run_motocare(
        &config_path,
        &["fred", "load", "--file", corpus.to_str().unwrap()],
    );
    assert!(!success);
    assert!(stderr.contains("Failed to parse corpus file"), "stderr={}", stderr);
}

#[test]
fn test_invalid_config_is_rejected() {
    let (_tmp, config_path) = setup_test_env("provider = \"magic\"");

    let (_, stderr, success) = run_motocare(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("Unknown embedding provider"), "stderr={}", stderr);
}

#[test]
fn test_missing_config_file() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope.toml");

    let (_, stderr, success) = run_motocare(&missing, &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"), "stderr={}", stderr);
}
