use super::*;
use crate::config::EmbeddingConfig;

fn test_config(port: u16) -> EmbeddingConfig {
    EmbeddingConfig {
        protocol: "http".to_string(),
        host: "127.0.0.1".to_string(),
        port,
        model: "embed-test".to_string(),
        api_key: "test-key".to_string(),
        dimension: 4,
        max_input_chars: 25_000,
        pacing_ms: 0,
    }
}

#[test]
fn client_configuration() {
    let config = test_config(1234);
    let client = GeminiClient::new(&config).expect("Failed to create client");

    assert_eq!(client.model, "embed-test");
    assert_eq!(client.dimension(), 4);
    assert_eq!(client.base_url.host_str(), Some("127.0.0.1"));
    assert_eq!(client.base_url.port(), Some(1234));
    assert_eq!(client.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
}

#[test]
fn client_builder_methods() {
    let config = test_config(1234);
    let client = GeminiClient::new(&config)
        .expect("Failed to create client")
        .with_timeout(Duration::from_secs(60))
        .with_retry_attempts(5);

    assert_eq!(client.retry_attempts, 5);
}

#[test]
fn task_api_strings() {
    assert_eq!(EmbeddingTask::Document.as_api_str(), "RETRIEVAL_DOCUMENT");
    assert_eq!(EmbeddingTask::Query.as_api_str(), "RETRIEVAL_QUERY");
}

#[test]
fn empty_batch_is_noop() {
    let config = test_config(1);
    let client = GeminiClient::new(&config).expect("Failed to create client");

    let vectors = client
        .embed_batch(&[], EmbeddingTask::Document)
        .expect("empty batch");
    assert!(vectors.is_empty());
}

mod integration_tests {
    use super::*;
    use serial_test::serial;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const EMBED_PATH: &str = "/v1beta/models/embed-test:embedContent";

    fn client_for(server: &MockServer) -> GeminiClient {
        let config = test_config(server.address().port());
        GeminiClient::new(&config).expect("client should build")
    }

    fn embedding_body(values: &[f32]) -> serde_json::Value {
        serde_json::json!({ "embedding": { "values": values } })
    }

    #[tokio::test]
    async fn embed_returns_vector() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(EMBED_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(embedding_body(&[0.1, 0.2, 0.3, 0.4])),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let vector = client
            .embed("hello world", EmbeddingTask::Document)
            .expect("embed should succeed");

        assert_eq!(vector, vec![0.1, 0.2, 0.3, 0.4]);
    }

    // Serialized against the config test that mutates GEMINI_API_KEY; the
    // header matcher below depends on the configured key winning.
    #[tokio::test]
    #[serial]
    async fn request_carries_task_and_dimension() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(EMBED_PATH))
            .and(body_string_contains("RETRIEVAL_DOCUMENT"))
            .and(body_string_contains("\"outputDimensionality\":4"))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(embedding_body(&[0.0, 1.0, 0.0, 0.0])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        client
            .embed("hello", EmbeddingTask::Document)
            .expect("embed should succeed");
    }

    #[tokio::test]
    async fn query_task_is_transmitted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(EMBED_PATH))
            .and(body_string_contains("RETRIEVAL_QUERY"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(embedding_body(&[0.0, 1.0, 0.0, 0.0])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        client
            .embed("find me", EmbeddingTask::Query)
            .expect("embed should succeed");
    }

    #[tokio::test]
    async fn dimension_mismatch_detected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(EMBED_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(embedding_body(&[0.1, 0.2])))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .embed("hello", EmbeddingTask::Document)
            .expect_err("short vector must be rejected");

        assert!(matches!(
            err,
            RecsyncError::DimensionMismatch {
                expected: 4,
                actual: 2
            }
        ));
    }

    #[tokio::test]
    async fn client_error_rejects_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(EMBED_PATH))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .embed("hello", EmbeddingTask::Document)
            .expect_err("client error must fail");

        assert!(matches!(err, RecsyncError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn rate_limit_reported_after_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(EMBED_PATH))
            .respond_with(ResponseTemplate::new(429))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).with_retry_attempts(1);
        let err = client
            .embed("hello", EmbeddingTask::Document)
            .expect_err("rate limit must surface");

        assert!(matches!(err, RecsyncError::RateLimited(_)));
    }

    #[tokio::test]
    async fn server_error_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(EMBED_PATH))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server).with_retry_attempts(2);
        let err = client
            .embed("hello", EmbeddingTask::Document)
            .expect_err("server error must surface after retries");

        assert!(matches!(err, RecsyncError::ProviderUnavailable(_)));
    }

    #[tokio::test]
    async fn batch_preserves_order_with_zero_sentinel() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(EMBED_PATH))
            .and(body_string_contains("good text"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(embedding_body(&[1.0, 0.0, 0.0, 0.0])),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(EMBED_PATH))
            .and(body_string_contains("bad text"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let client = client_for(&server).with_retry_attempts(1);
        let texts = vec![
            "good text".to_string(),
            "bad text".to_string(),
            "good text again".to_string(),
        ];
        let vectors = client
            .embed_batch(&texts, EmbeddingTask::Document)
            .expect("batch should not abort");

        assert_eq!(vectors.len(), 3);
        assert_eq!(vectors[0], vec![1.0, 0.0, 0.0, 0.0]);
        assert!(crate::embeddings::is_zero_vector(&vectors[1]));
        assert_eq!(vectors[1].len(), 4);
        assert_eq!(vectors[2], vec![1.0, 0.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn batch_aborts_on_dimension_mismatch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(EMBED_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(embedding_body(&[1.0, 2.0])))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .embed_batch(
                &["first".to_string(), "second".to_string()],
                EmbeddingTask::Document,
            )
            .expect_err("dimension mismatch must abort the batch");

        assert!(matches!(err, RecsyncError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn long_input_truncated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(EMBED_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(embedding_body(&[0.0, 0.0, 1.0, 0.0])),
            )
            .mount(&server)
            .await;

        let mut config = test_config(server.address().port());
        config.max_input_chars = 10;
        let client = GeminiClient::new(&config).expect("client should build");

        client
            .embed(&"x".repeat(50), EmbeddingTask::Document)
            .expect("embed should succeed");

        let requests = server
            .received_requests()
            .await
            .expect("requests should be recorded");
        let body: serde_json::Value =
            serde_json::from_slice(&requests[0].body).expect("json body");
        let sent = body["content"]["parts"][0]["text"]
            .as_str()
            .expect("text field");
        assert_eq!(sent.chars().count(), 10);
    }

    #[tokio::test]
    async fn health_check_passes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1beta/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": [
                    { "name": "models/embed-test", "displayName": "Embed Test" },
                    { "name": "models/other" }
                ]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        client.health_check().expect("health check should pass");
    }

    #[tokio::test]
    async fn unknown_model_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1beta/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": [{ "name": "models/other" }]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .validate_model()
            .expect_err("unknown model must be rejected");

        assert!(matches!(err, RecsyncError::Config(_)));
    }

    #[test]
    fn unreachable_provider_reported() {
        let config = test_config(1);
        let client = GeminiClient::new(&config)
            .expect("client should build")
            .with_retry_attempts(1)
            .with_timeout(Duration::from_millis(250));

        let err = client.ping().expect_err("ping must fail");
        assert!(!err.to_string().is_empty());
    }
}
