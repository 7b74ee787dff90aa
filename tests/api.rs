// Drives the chat API over real HTTP with in-process fake collaborators.

use anyhow::Result;
use async_trait::async_trait;
use healthbot_rag::api::{router, AppState};
use healthbot_rag::domain_gate::REFUSAL_REPLY;
use healthbot_rag::embedding::Embedder;
use healthbot_rag::generation::generator::EMERGENCY_REFERRAL;
use healthbot_rag::generation::{AnswerGenerator, GenerationParams};
use healthbot_rag::index::FlatIndex;
use healthbot_rag::language::{LanguageRouter, Translator};
use healthbot_rag::retrieval::Retriever;
use healthbot_rag::store::IndexArtifacts;
use healthbot_rag::{ChatPipeline, ChatReply, ChunkMeta, ErrorBody, HealthStatus};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

struct EchoTranslator;

#[async_trait]
impl Translator for EchoTranslator {
    async fn detect(&self, text: &str) -> Result<String> {
        Ok(if text.is_ascii() { "en" } else { "hi" }.to_string())
    }

    async fn translate(&self, text: &str, target: &str) -> Result<String> {
        Ok(format!("({}) {}", target, text))
    }
}

struct DiseaseEmbedder;

#[async_trait]
impl Embedder for DiseaseEmbedder {
    fn model_id(&self) -> &str {
        "disease"
    }

    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let t = t.to_lowercase();
                vec![
                    if t.contains("fever") { 1.0 } else { 0.0 },
                    if t.contains("water") { 1.0 } else { 0.0 },
                ]
            })
            .collect())
    }
}

fn pipeline() -> ChatPipeline {
    let index = FlatIndex::build(2, &[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
    let artifacts = IndexArtifacts::new(
        Box::new(index),
        vec![
            "The patient has a high fever. Rest and fluids are advised.".to_string(),
            "Boil drinking water for one minute.".to_string(),
        ],
        vec![
            ChunkMeta { source: "fever.txt".into(), part: 0 },
            ChunkMeta { source: "water.txt".into(), part: 0 },
        ],
        "disease",
    )
    .unwrap();

    ChatPipeline::new(
        LanguageRouter::new(Arc::new(EchoTranslator), vec!["en".into(), "hi".into(), "kn".into()]),
        Retriever::new(Arc::new(DiseaseEmbedder), Some(Arc::new(artifacts))),
        AnswerGenerator::new(None, GenerationParams::default(), 3),
    )
    .with_top_k(1)
}

async fn spawn_app() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(AppState::new(Arc::new(pipeline())));
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    addr
}

async fn post_chat(addr: SocketAddr, body: reqwest::Body) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("http://{}/chat", addr))
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn chat_requires_query() {
    let addr = spawn_app().await;

    for body in [json!({"query": ""}), json!({"lang": "hi"}), json!({})] {
        let response = post_chat(addr, body.to_string().into()).await;
        assert_eq!(response.status(), 400);
        let error: ErrorBody = response.json().await.unwrap();
        assert_eq!(error.error, "query required");
    }
}

#[tokio::test]
async fn chat_malformed_body_is_bad_request() {
    let addr = spawn_app().await;
    let response = post_chat(addr, "not json".into()).await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn chat_refuses_off_topic() {
    let addr = spawn_app().await;
    let response = post_chat(addr, json!({"query": "tell me a joke", "lang": "hi"}).to_string().into()).await;
    assert_eq!(response.status(), 200);
    let reply: ChatReply = response.json().await.unwrap();
    assert_eq!(reply.reply, REFUSAL_REPLY);
    assert_eq!(reply.lang, "en");
}

#[tokio::test]
async fn chat_refuses_blank_query() {
    let addr = spawn_app().await;
    let response = post_chat(addr, json!({"query": "   "}).to_string().into()).await;
    assert_eq!(response.status(), 200);
    let reply: ChatReply = response.json().await.unwrap();
    assert_eq!(reply.reply, REFUSAL_REPLY);
}

#[tokio::test]
async fn chat_answers_from_index() {
    let addr = spawn_app().await;
    let response = post_chat(addr, json!({"query": "What should I do for a fever?", "lang": "auto"}).to_string().into()).await;
    assert_eq!(response.status(), 200);

    let reply: ChatReply = response.json().await.unwrap();
    assert_eq!(reply.lang, "en");
    assert_eq!(
        reply.reply,
        format!("The patient has a high fever. Rest and fluids are advised. {}", EMERGENCY_REFERRAL)
    );
}

#[tokio::test]
async fn chat_replies_in_requested_language() {
    let addr = spawn_app().await;
    let response = post_chat(addr, json!({"query": "fever remedies", "lang": "Hindi"}).to_string().into()).await;
    let reply: ChatReply = response.json().await.unwrap();
    assert_eq!(reply.lang, "hi");
    assert!(reply.reply.starts_with("(hi) The patient has a high fever."));
}

#[tokio::test]
async fn health_reports_index_state() {
    let addr = spawn_app().await;
    let response = reqwest::get(format!("http://{}/health", addr)).await.unwrap();
    assert_eq!(response.status(), 200);

    let health: HealthStatus = response.json().await.unwrap();
    assert_eq!(health.status, "healthy");
    assert!(!health.llm_configured);
    assert!(health.index_loaded);
    assert_eq!(health.index_texts_count, 2);
}

#[tokio::test]
async fn metrics_count_requests() {
    let addr = spawn_app().await;
    post_chat(addr, json!({"query": "fever"}).to_string().into()).await;

    let snapshot: serde_json::Value = reqwest::get(format!("http://{}/metrics", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(snapshot["counters"]["chat.requests"].as_u64() >= Some(1));
    assert!(snapshot["gauges"]["retrieval.results"].as_f64().is_some());
}

#[tokio::test]
async fn cors_allows_any_origin() {
    let addr = spawn_app().await;
    let response = reqwest::Client::new()
        .get(format!("http://{}/health", addr))
        .header("origin", "http://localhost:8501")
        .send()
        .await
        .unwrap();
    assert_eq!(
        response.headers().get("access-control-allow-origin").map(|v| v.as_bytes()),
        Some(&b"*"[..])
    );
}
