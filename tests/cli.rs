use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use axum::{routing::post, Json, Router};
use serde_json::{json, Value};
use tempfile::TempDir;

fn vault_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_vault"))
}

/// Writes a config pointing at `provider_url` and a two-note vault.
fn setup_test_env(provider_url: &str) -> (TempDir, PathBuf, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let vault = root.join("notes");
    fs::create_dir_all(vault.join(".obsidian")).unwrap();
    fs::write(vault.join("a.md"), "# Weather\n\nThe sky is blue.").unwrap();
    fs::write(vault.join("b.md"), "# Lawn\n\nGrass is green.").unwrap();
    fs::write(vault.join(".obsidian").join("workspace.md"), "sky sky sky").unwrap();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let config_content = format!(
        r#"[store]
data_dir = "{root}/data"

[indexer]
batch_size = 5
batch_delay_secs = 1
requests_per_minute = 60

[embedding]
provider = "ollama"
model = "test-embed"
url = "{url}"

[chat]
provider = "ollama"
model = "test-chat"
url = "{url}"
"#,
        root = root.display(),
        url = provider_url,
    );
    let config_path = config_dir.join("vault.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path, vault)
}

fn run_vault(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = vault_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("OPENAI_API_KEY")
        .env_remove("GEMINI_API_KEY")
        .env_remove("GOOGLE_API_KEY")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run vault binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

/// Minimal Ollama stand-in: embeddings are keyword indicators, chat echoes
/// whether the sky note reached the prompt.
async fn spawn_fake_ollama() -> String {
    let app = Router::new()
        .route(
            "/api/embed",
            post(|Json(body): Json<Value>| async move {
                let inputs = body["input"].as_array().cloned().unwrap_or_default();
                let embeddings: Vec<Vec<f32>> = inputs
                    .iter()
                    .map(|t| {
                        let t = t.as_str().unwrap_or_default().to_lowercase();
                        vec![
                            if t.contains("sky") { 1.0 } else { 0.0 },
                            if t.contains("grass") { 1.0 } else { 0.0 },
                        ]
                    })
                    .collect();
                Json(json!({ "embeddings": embeddings }))
            }),
        )
        .route(
            "/api/chat",
            post(|Json(body): Json<Value>| async move {
                let prompt = body["messages"][0]["content"].as_str().unwrap_or_default();
                let reply = if prompt.contains("The sky is blue.") {
                    "The sky is blue."
                } else {
                    "I could not find that in your notes."
                };
                Json(json!({ "message": { "role": "assistant", "content": reply } }))
            }),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{}", addr)
}

/// Run the binary off the async runtime so the fake provider keeps serving.
async fn run_vault_async(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let config_path = config_path.to_path_buf();
    let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
    tokio::task::spawn_blocking(move || {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        run_vault(&config_path, &args)
    })
    .await
    .unwrap()
}

#[test]
fn test_ask_before_index_fails() {
    let (_tmp, config, vault) = setup_test_env("http://127.0.0.1:9");
    let (_, stderr, success) = run_vault(
        &config,
        &["ask", "--vault", vault.to_str().unwrap(), "What color is the sky?"],
    );
    assert!(!success);
    assert!(stderr.contains("not been initialized"), "stderr: {stderr}");
}

#[test]
fn test_index_empty_vault_fails() {
    let (tmp, config, _) = setup_test_env("http://127.0.0.1:9");
    let empty = tmp.path().join("empty");
    fs::create_dir_all(&empty).unwrap();
    let (_, stderr, success) = run_vault(&config, &["index", empty.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("no documents found"), "stderr: {stderr}");
}

#[test]
fn test_index_missing_root_fails() {
    let (tmp, config, _) = setup_test_env("http://127.0.0.1:9");
    let missing = tmp.path().join("nope");
    let (_, stderr, success) = run_vault(&config, &["index", missing.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("not a directory"), "stderr: {stderr}");
}

#[test]
fn test_missing_api_key_is_reported() {
    let (tmp, _, vault) = setup_test_env("http://127.0.0.1:9");
    let config_path = tmp.path().join("config").join("openai.toml");
    fs::write(
        &config_path,
        format!(
            "[store]\ndata_dir = \"{}/data\"\n\n[embedding]\nprovider = \"openai\"\n\n[chat]\nprovider = \"openai\"\n",
            tmp.path().display()
        ),
    )
    .unwrap();
    let (_, stderr, success) = run_vault(&config_path, &["index", vault.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("OPENAI_API_KEY"), "stderr: {stderr}");
}

#[test]
fn test_invalid_chunking_config_fails() {
    let (tmp, _, vault) = setup_test_env("http://127.0.0.1:9");
    let config_path = tmp.path().join("config").join("bad.toml");
    fs::write(
        &config_path,
        "[chunking]\nchunk_size = 100\nchunk_overlap = 100\n",
    )
    .unwrap();
    let (_, stderr, success) = run_vault(&config_path, &["status", "--vault", vault.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("chunk_overlap"), "stderr: {stderr}");
}

#[test]
fn test_status_before_index() {
    let (_tmp, config, vault) = setup_test_env("http://127.0.0.1:9");
    let (stdout, _, success) = run_vault(&config, &["status", "--vault", vault.to_str().unwrap()]);
    assert!(success);
    assert!(stdout.contains("Not indexed yet"), "stdout: {stdout}");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_index_then_ask() {
    let url = spawn_fake_ollama().await;
    let (_tmp, config, vault) = setup_test_env(&url);
    let vault_arg = vault.to_str().unwrap();

    let (stdout, stderr, success) = run_vault_async(&config, &["index", vault_arg]).await;
    assert!(success, "stderr: {stderr}");
    assert!(stdout.contains("documents: 2"), "stdout: {stdout}");

    let (stdout, _, success) = run_vault_async(&config, &["status", "--vault", vault_arg]).await;
    assert!(success);
    assert!(stdout.contains("Vectors: 2"), "stdout: {stdout}");
    assert!(stdout.contains("Embedding model: test-embed"), "stdout: {stdout}");

    let (stdout, stderr, success) = run_vault_async(
        &config,
        &["ask", "--vault", vault_arg, "What color is the sky?"],
    )
    .await;
    assert!(success, "stderr: {stderr}");
    assert!(stdout.contains("The sky is blue."), "stdout: {stdout}");
    assert!(stdout.contains("- a.md"), "stdout: {stdout}");
    assert!(!stdout.contains("b.md"), "stdout: {stdout}");
    assert!(!stdout.contains("workspace.md"), "stdout: {stdout}");
}
