//! End-to-end tests of the index → ask pipeline through the public
//! [`Session`] API, with in-process fake providers.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use vault_harness::chat::ChatProvider;
use vault_harness::config::Config;
use vault_harness::embedding::EmbeddingProvider;
use vault_harness::error::VaultError;
use vault_harness::ratelimit::ManualClock;
use vault_harness::session::{Session, SessionStatus};

const VOCABULARY: &[&str] = &["sky", "grass", "ocean", "garden"];

/// One axis per vocabulary word; deterministic and network-free.
struct KeywordEmbedder {
    model: String,
    calls: AtomicUsize,
    cancel_on_first_call: Option<CancellationToken>,
}

impl KeywordEmbedder {
    fn new(model: &str) -> Arc<Self> {
        Arc::new(Self {
            model: model.to_string(),
            calls: AtomicUsize::new(0),
            cancel_on_first_call: None,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> Option<usize> {
        Some(VOCABULARY.len())
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            if let Some(token) = &self.cancel_on_first_call {
                token.cancel();
            }
        }
        Ok(texts
            .iter()
            .map(|text| {
                let text = text.to_lowercase();
                VOCABULARY
                    .iter()
                    .map(|word| if text.contains(word) { 1.0 } else { 0.0 })
                    .collect()
            })
            .collect())
    }
}

#[derive(Default)]
struct EchoChat {
    prompts: Mutex<Vec<String>>,
}

impl EchoChat {
    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatProvider for EchoChat {
    fn model_name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String> {
        assert!((temperature - 0.2).abs() < f32::EPSILON);
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok("The sky is blue.".to_string())
    }
}

fn config(data_dir: &Path) -> Config {
    let mut config = Config::default();
    config.store.data_dir = data_dir.to_path_buf();
    config
}

fn sky_grass_vault(tmp: &TempDir) -> PathBuf {
    let vault = tmp.path().join("vault");
    fs::create_dir_all(&vault).unwrap();
    fs::write(vault.join("a.md"), "The sky is blue.").unwrap();
    fs::write(vault.join("b.md"), "Grass is green.").unwrap();
    vault
}

fn session_with(
    tmp: &TempDir,
    embedder: Arc<KeywordEmbedder>,
    chat: Arc<EchoChat>,
) -> (Session, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let session = Session::with_providers(config(&tmp.path().join("data")), embedder, chat)
        .with_clock(clock.clone());
    (session, clock)
}

#[tokio::test]
async fn test_sky_question_cites_only_sky_note() {
    let tmp = TempDir::new().unwrap();
    let vault = sky_grass_vault(&tmp);
    let chat = Arc::new(EchoChat::default());
    let (session, _) = session_with(&tmp, KeywordEmbedder::new("kw"), chat.clone());

    let summary = session.initialize_index(&vault).await.unwrap();
    assert_eq!(summary.documents, 2);
    assert_eq!(summary.chunks, 2);

    let answer = session.answer_query("What color is the sky?").await.unwrap();
    assert_eq!(answer.text, "The sky is blue.");
    assert_eq!(answer.sources, vec!["a.md".to_string()]);

    let prompts = chat.prompts.lock().unwrap();
    assert!(prompts[0].contains("The sky is blue."));
    assert!(prompts[0].contains("What color is the sky?"));
}

#[tokio::test]
async fn test_query_before_setup_makes_no_provider_calls() {
    let tmp = TempDir::new().unwrap();
    let embedder = KeywordEmbedder::new("kw");
    let chat = Arc::new(EchoChat::default());
    let (session, _) = session_with(&tmp, embedder.clone(), chat.clone());

    let err = session.answer_query("What color is the sky?").await.unwrap_err();
    assert!(matches!(err, VaultError::Uninitialized));
    assert_eq!(embedder.calls(), 0);
    assert_eq!(chat.calls(), 0);
}

#[tokio::test]
async fn test_empty_vault_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let vault = tmp.path().join("empty");
    fs::create_dir_all(&vault).unwrap();
    fs::write(vault.join("image.png"), [0u8, 1, 2]).unwrap();
    let embedder = KeywordEmbedder::new("kw");
    let (session, _) = session_with(&tmp, embedder.clone(), Arc::new(EchoChat::default()));

    let err = session.initialize_index(&vault).await.unwrap_err();
    assert!(matches!(err, VaultError::NoDocuments(_)));
    assert_eq!(session.status(), SessionStatus::Uninitialized);
    assert_eq!(embedder.calls(), 0);
}

#[tokio::test]
async fn test_indexing_respects_request_pacing() {
    let tmp = TempDir::new().unwrap();
    let vault = tmp.path().join("vault");
    fs::create_dir_all(&vault).unwrap();
    for i in 0..12 {
        fs::write(vault.join(format!("note{i:02}.md")), format!("garden note {i}")).unwrap();
    }
    let embedder = KeywordEmbedder::new("kw");
    let (session, clock) = session_with(&tmp, embedder.clone(), Arc::new(EchoChat::default()));

    let summary = session.initialize_index(&vault).await.unwrap();

    // 12 chunks in batches of 5: three requests, two 25s gaps.
    assert_eq!(summary.chunks, 12);
    assert_eq!(summary.batches, 3);
    assert_eq!(embedder.calls(), 3);
    assert!(clock.total_slept() >= Duration::from_secs(50));
    for pause in clock.sleeps() {
        assert!(pause <= Duration::from_secs(25));
    }
}

#[tokio::test]
async fn test_reindex_does_not_duplicate() {
    let tmp = TempDir::new().unwrap();
    let vault = sky_grass_vault(&tmp);
    let (session, _) = session_with(&tmp, KeywordEmbedder::new("kw"), Arc::new(EchoChat::default()));

    let first = session.initialize_index(&vault).await.unwrap();
    let second = session.initialize_index(&vault).await.unwrap();
    assert_eq!(first.inserted, 2);
    assert_eq!(second.inserted, 0);
    assert_eq!(second.total_vectors, 2);
}

#[tokio::test]
async fn test_index_survives_restart() {
    let tmp = TempDir::new().unwrap();
    let vault = sky_grass_vault(&tmp);
    {
        let (session, _) =
            session_with(&tmp, KeywordEmbedder::new("kw"), Arc::new(EchoChat::default()));
        session.initialize_index(&vault).await.unwrap();
    }

    let embedder = KeywordEmbedder::new("kw");
    let (restarted, _) = session_with(&tmp, embedder.clone(), Arc::new(EchoChat::default()));
    assert_eq!(restarted.open_existing(&vault).await.unwrap(), 2);
    // Resuming re-embeds nothing; only the question is embedded.
    assert_eq!(embedder.calls(), 0);

    let answer = restarted.answer_query("Tell me about the sky").await.unwrap();
    assert_eq!(answer.sources, vec!["a.md".to_string()]);
    assert_eq!(embedder.calls(), 1);
}

#[tokio::test]
async fn test_embedding_model_change_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let vault = sky_grass_vault(&tmp);
    let (first, _) = session_with(&tmp, KeywordEmbedder::new("model-a"), Arc::new(EchoChat::default()));
    first.initialize_index(&vault).await.unwrap();

    let other = KeywordEmbedder::new("model-b");
    let (second, _) = session_with(&tmp, other.clone(), Arc::new(EchoChat::default()));
    match second.initialize_index(&vault).await {
        Err(VaultError::EmbeddingMismatch { stored, configured }) => {
            assert_eq!(stored, "model-a");
            assert_eq!(configured, "model-b");
        }
        other => panic!("expected embedding mismatch, got {other:?}"),
    }
    assert!(matches!(
        second.open_existing(&vault).await,
        Err(VaultError::EmbeddingMismatch { .. })
    ));
    assert_eq!(other.calls(), 0);
}

#[tokio::test]
async fn test_cancellation_stops_between_batches() {
    let tmp = TempDir::new().unwrap();
    let vault = tmp.path().join("vault");
    fs::create_dir_all(&vault).unwrap();
    for i in 0..10 {
        fs::write(vault.join(format!("n{i}.md")), format!("ocean note {i}")).unwrap();
    }
    let cancel = CancellationToken::new();
    let embedder = Arc::new(KeywordEmbedder {
        model: "kw".into(),
        calls: AtomicUsize::new(0),
        cancel_on_first_call: Some(cancel.clone()),
    });
    let (session, _) = session_with(&tmp, embedder.clone(), Arc::new(EchoChat::default()));

    let err = session
        .initialize_index_with_cancel(&vault, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::Cancelled));
    assert_eq!(embedder.calls(), 1);
    assert_eq!(session.status(), SessionStatus::Uninitialized);
}

#[tokio::test]
async fn test_interrupted_index_is_not_resumed() {
    let tmp = TempDir::new().unwrap();
    let vault = tmp.path().join("vault");
    fs::create_dir_all(&vault).unwrap();
    for i in 0..10 {
        fs::write(vault.join(format!("n{i}.md")), format!("ocean note {i}")).unwrap();
    }
    let cancel = CancellationToken::new();
    let embedder = Arc::new(KeywordEmbedder {
        model: "kw".into(),
        calls: AtomicUsize::new(0),
        cancel_on_first_call: Some(cancel.clone()),
    });
    {
        let (session, _) = session_with(&tmp, embedder, Arc::new(EchoChat::default()));
        let err = session
            .initialize_index_with_cancel(&vault, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::Cancelled));
    }

    // First batch of five landed on disk, but the run never finished.
    let (restarted, _) = session_with(&tmp, KeywordEmbedder::new("kw"), Arc::new(EchoChat::default()));
    assert!(matches!(
        restarted.open_existing(&vault).await,
        Err(VaultError::Uninitialized)
    ));
    assert_eq!(restarted.status(), SessionStatus::Uninitialized);

    restarted.initialize_index(&vault).await.unwrap();
    let (resumed, _) = session_with(&tmp, KeywordEmbedder::new("kw"), Arc::new(EchoChat::default()));
    assert_eq!(resumed.open_existing(&vault).await.unwrap(), 10);
    assert!(resumed.is_ready());
}

#[tokio::test]
async fn test_failed_reinit_keeps_previous_index() {
    let tmp = TempDir::new().unwrap();
    let vault = sky_grass_vault(&tmp);
    let empty = tmp.path().join("empty");
    fs::create_dir_all(&empty).unwrap();
    let (session, _) = session_with(&tmp, KeywordEmbedder::new("kw"), Arc::new(EchoChat::default()));

    session.initialize_index(&vault).await.unwrap();
    let err = session.initialize_index(&empty).await.unwrap_err();
    assert!(matches!(err, VaultError::NoDocuments(_)));

    assert_eq!(
        session.status(),
        SessionStatus::Ready {
            vault: vault.canonicalize().unwrap(),
            chunks: 2,
        }
    );
    let answer = session.answer_query("sky?").await.unwrap();
    assert_eq!(answer.sources, vec!["a.md".to_string()]);
}

#[tokio::test]
async fn test_vaults_do_not_mix() {
    let tmp = TempDir::new().unwrap();
    let sky = sky_grass_vault(&tmp);
    let ocean = tmp.path().join("ocean");
    fs::create_dir_all(ocean.join("sub")).unwrap();
    fs::write(ocean.join("sub").join("tides.md"), "The ocean has tides.").unwrap();
    let (session, _) = session_with(&tmp, KeywordEmbedder::new("kw"), Arc::new(EchoChat::default()));

    session.initialize_index(&sky).await.unwrap();
    session.initialize_index(&ocean).await.unwrap();

    let sky_answer = session.answer_query("What about the sky?").await.unwrap();
    assert!(sky_answer.sources.is_empty());
    let ocean_answer = session.answer_query("ocean").await.unwrap();
    assert_eq!(ocean_answer.sources, vec!["sub/tides.md".to_string()]);
}
