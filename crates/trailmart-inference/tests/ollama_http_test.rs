//! Ollama backend against a mock HTTP server.

use trailmart_core::{EmbeddingBackend, Error, GenerationBackend, InferenceBackend};
use trailmart_inference::OllamaBackend;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn backend(server: &MockServer) -> OllamaBackend {
    OllamaBackend::with_config(server.uri(), "embed-m".into(), "chat-m".into(), 3)
}

#[tokio::test]
async fn test_embed_texts_posts_batch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(serde_json::json!({
            "model": "embed-m",
            "input": ["tent", "stove"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "embeddings": [[0.1, 0.2, 0.3], [0.3, 0.2, 0.1]]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let vectors = backend(&server)
        .embed_texts(&["tent".to_string(), "stove".to_string()])
        .await
        .unwrap();

    assert_eq!(vectors.len(), 2);
    assert_eq!(vectors[0].as_slice(), &[0.1, 0.2, 0.3]);
}

#[tokio::test]
async fn test_embed_count_mismatch_is_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "embeddings": [] })),
        )
        .mount(&server)
        .await;

    let err = backend(&server)
        .embed_texts(&["tent".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Embedding(_)));
}

#[tokio::test]
async fn test_embed_server_error_carries_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
        .mount(&server)
        .await;

    let err = backend(&server)
        .embed_texts(&["tent".to_string()])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("model not loaded"));
}

#[tokio::test]
async fn test_generate_sends_system_and_user_messages() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(serde_json::json!({
            "model": "chat-m",
            "stream": false,
            "messages": [
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "best tent?"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "message": {"role": "assistant", "content": "<think>hm</think>The dome."}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let out = backend(&server)
        .generate_with_system("be brief", "best tent?")
        .await
        .unwrap();
    assert_eq!(out, "<think>hm</think>The dome.");
}

#[tokio::test]
async fn test_generate_json_requests_json_format_without_thinking() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(serde_json::json!({
            "format": "json",
            "think": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "message": {"role": "assistant", "content": "[\"tent\"]"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let out = backend(&server)
        .generate_json_with_system("", "tags please")
        .await
        .unwrap();
    assert_eq!(out, "[\"tent\"]");
}

#[tokio::test]
async fn test_generate_failure_maps_to_inference_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = backend(&server)
        .generate_with_system("", "x")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Inference(_)));
}

#[tokio::test]
async fn test_health_check() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"models": []})))
        .mount(&server)
        .await;

    assert!(backend(&server).health_check().await.unwrap());
}
