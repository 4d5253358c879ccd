use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn testgen_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_testgen"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[store]
backend = "sqlite"
path = "{root}/data/testgen.sqlite"

[chunking]
chunk_size = 1024
chunk_overlap = 20

[generation]
api_key_env = "TESTGEN_IT_OPENAI_KEY"

[embedding]
api_key_env = "TESTGEN_IT_OPENAI_KEY"

[pipeline]
output_dir = "{root}/out"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("testgen.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_testgen(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = testgen_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("TESTGEN_IT_OPENAI_KEY")
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run testgen binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_creates_both_collections() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_testgen(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("BusinessDocs: created"));
    assert!(stdout.contains("CodeFiles: created"));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_init_idempotent_under_skip() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_testgen(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (stdout, _, success2) = run_testgen(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
    assert!(stdout.contains("BusinessDocs: existing"));
}

#[test]
fn test_init_fail_policy_conflicts() {
    let (_tmp, config_path) = setup_test_env();

    run_testgen(&config_path, &["init"]);
    let (_, stderr, success) = run_testgen(&config_path, &["init", "--on-existing", "fail"]);
    assert!(!success, "init with fail policy should refuse existing collections");
    assert!(stderr.contains("already exists"), "stderr={}", stderr);
}

#[test]
fn test_recreate_drops_indexed_chunks() {
    let (_tmp, config_path) = setup_test_env();

    run_testgen(&config_path, &["index"]);
    let (stdout, _, success) = run_testgen(&config_path, &["init", "--on-existing", "recreate"]);
    assert!(success);
    assert!(stdout.contains("CodeFiles: recreated"));

    let (stdout, _, _) = run_testgen(&config_path, &["status"]);
    assert!(stdout.contains("CodeFiles: 0 chunks"), "stdout={}", stdout);
}

#[test]
fn test_index_and_reindex() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_testgen(&config_path, &["index"]);
    assert!(success, "index failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("BusinessDocs (srs_doc_1): 6 chunks, 6 written, 0 unchanged"));
    assert!(stdout.contains("CodeFiles (codefile.rs): 2 chunks, 2 written, 0 unchanged"));

    let (stdout, _, success) = run_testgen(&config_path, &["index"]);
    assert!(success);
    assert!(stdout.contains("BusinessDocs (srs_doc_1): 6 chunks, 0 written, 6 unchanged"));

    let (stdout, _, _) = run_testgen(&config_path, &["status"]);
    assert!(stdout.contains("ready:     true"));
    assert!(stdout.contains("BusinessDocs: 6 chunks"));
    assert!(stdout.contains("CodeFiles: 2 chunks"));
}

#[test]
fn test_search_finds_target_function() {
    let (_tmp, config_path) = setup_test_env();
    run_testgen(&config_path, &["index"]);

    let (stdout, stderr, success) =
        run_testgen(&config_path, &["search", "calculate_discounted_price"]);
    assert!(success, "search failed: stderr={}", stderr);
    assert!(stdout.starts_with("1. ["));
    assert!(stdout.contains("CodeFiles / codefile.rs"));
    assert!(stdout.contains("pub fn calculate_discounted_price"));

    let (stdout, _, success) = run_testgen(
        &config_path,
        &[
            "search",
            "calculate_discounted_price",
            "--collection",
            "requirements",
        ],
    );
    assert!(success);
    assert!(stdout.contains("BusinessDocs / srs_doc_1"));
    assert!(stdout.contains("`calculate_discounted_price` Function"));
}

#[test]
fn test_search_is_deterministic() {
    let (_tmp, config_path) = setup_test_env();
    run_testgen(&config_path, &["index"]);

    let args = ["search", "price", "--collection", "requirements", "--limit", "3"];
    let (first, _, _) = run_testgen(&config_path, &args);
    let (second, _, _) = run_testgen(&config_path, &args);
    assert_eq!(first, second);
}

#[test]
fn test_search_no_results() {
    let (_tmp, config_path) = setup_test_env();
    run_testgen(&config_path, &["index"]);

    let (stdout, _, success) = run_testgen(&config_path, &["search", "xylophone"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_semantic_search_requires_embeddings() {
    let (_tmp, config_path) = setup_test_env();
    run_testgen(&config_path, &["index"]);

    let (_, stderr, success) =
        run_testgen(&config_path, &["search", "price", "--mode", "semantic"]);
    assert!(!success);
    assert!(stderr.contains("requires embeddings"));
}

#[test]
fn test_generate_without_key_fails_before_any_request() {
    let (tmp, config_path) = setup_test_env();
    run_testgen(&config_path, &["index"]);

    let (_, stderr, success) = run_testgen(&config_path, &["generate"]);
    assert!(!success);
    assert!(stderr.contains("TESTGEN_IT_OPENAI_KEY"), "stderr={}", stderr);
    assert!(!tmp.path().join("out").exists());
}

#[test]
fn test_dotenv_log_filter_applies() {
    let (tmp, config_path) = setup_test_env();
    fs::write(tmp.path().join(".env"), "RUST_LOG=info\n").unwrap();

    let output = Command::new(testgen_binary())
        .current_dir(tmp.path())
        .arg("--config")
        .arg(&config_path)
        .arg("index")
        .env_remove("TESTGEN_IT_OPENAI_KEY")
        .env_remove("RUST_LOG")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("document indexed"), "stderr={}", stderr);

    // Without .env the default filter is warn.
    let (_, stderr, _) = run_testgen(&config_path, &["index"]);
    assert!(!stderr.contains("document indexed"), "stderr={}", stderr);
}

#[test]
fn test_invalid_config_rejected() {
    let (tmp, _) = setup_test_env();
    let bad = tmp.path().join("config").join("bad.toml");
    fs::write(&bad, "[chunking]\nchunk_size = 10\nchunk_overlap = 10\n").unwrap();

    let (_, stderr, success) = run_testgen(&bad, &["status"]);
    assert!(!success);
    assert!(stderr.contains("chunk_overlap"));
}
