use futures::StreamExt;
use recap_agents::{FallbackOrchestrator, LlmProvider, OpenAiCompatProvider, PromptComposer, SummaryRuntime};
use recap_config::AppConfig;
use recap_db::{SqliteStore, SummaryStore};
use recap_gateway::{AppState, build_router};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn spawn_app(provider: Option<Arc<dyn LlmProvider>>) -> (String, Arc<SqliteStore>) {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let orchestrator = FallbackOrchestrator::new(provider, vec!["m1".into()])
        .with_max_attempts(1)
        .with_retry_delay(Duration::ZERO);
    let runtime = Arc::new(SummaryRuntime::new(
        store.clone(),
        PromptComposer::builtin().unwrap(),
        orchestrator,
    ));
    let state = Arc::new(AppState::new(AppConfig::default(), store.clone(), runtime));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, build_router(state)).await.unwrap();
    });

    (format!("http://{addr}"), store)
}

/// Read an SSE body into its decoded `data:` payloads.
async fn read_events(response: reqwest::Response) -> Vec<Value> {
    let mut body = String::new();
    let mut chunks = response.bytes_stream();
    while let Some(chunk) = chunks.next().await {
        body.push_str(&String::from_utf8_lossy(&chunk.unwrap()));
    }
    body.split("\n\n")
        .filter_map(|event| event.strip_prefix("data: "))
        .map(|data| serde_json::from_str(data).unwrap())
        .collect()
}

#[tokio::test]
async fn test_health_endpoints() {
    let (base, _) = spawn_app(None).await;
    let client = reqwest::Client::new();

    let body = client.get(format!("{base}/health")).send().await.unwrap().text().await.unwrap();
    assert_eq!(body, "ok");

    let upstream: Value = client
        .get(format!("{base}/health/upstream"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(upstream["upstream"], json!(false));
    assert_eq!(upstream["models"], json!(["m1"]));
}

#[tokio::test]
async fn test_status_record_lifecycle() {
    let (base, _) = spawn_app(None).await;
    let client = reqwest::Client::new();

    let created = client
        .post(format!("{base}/api/statuses"))
        .json(&json!({"title": "Learn X", "description": "ch. 3", "type": "planned"}))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), 201);
    let record: Value = created.json().await.unwrap();
    let id = record["id"].as_str().unwrap().to_string();
    assert_eq!(record["type"], json!("planned"));
    assert_eq!(record["aiProcessed"], json!(false));

    let toggled: Value = client
        .post(format!("{base}/api/statuses/{id}/toggle"))
        .json(&json!({}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(toggled["completed"], json!(true));

    let status: Value = client
        .get(format!("{base}/api/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["statusList"].as_array().unwrap().len(), 1);
    assert_eq!(status["summary"], json!(""));
    assert_eq!(status["lastUpdated"], Value::Null);

    let deleted = client
        .delete(format!("{base}/api/statuses/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), 204);

    let missing = client
        .post(format!("{base}/api/statuses/{id}/toggle"))
        .json(&json!({"completed": true}))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
}

#[tokio::test]
async fn test_blank_title_is_rejected() {
    let (base, _) = spawn_app(None).await;
    let response = reqwest::Client::new()
        .post(format!("{base}/api/statuses"))
        .json(&json!({"title": "   "}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_generate_summary_stream_relays_upstream_and_persists() {
    let upstream = MockServer::start().await;
    let body = [
        r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#,
        r#"data: {"choices":[{"delta":{"content":"lo"}}]}"#,
        "data: [DONE]",
    ]
    .iter()
    .map(|line| format!("{line}\n\n"))
    .collect::<String>();
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .mount(&upstream)
        .await;

    let provider: Arc<dyn LlmProvider> = Arc::new(OpenAiCompatProvider::new("test-key", upstream.uri()));
    let (base, store) = spawn_app(Some(provider)).await;
    let record = store.add_record("Learn X", "", recap_common::StatusKind::Ongoing).unwrap();
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/api/generate-summary-stream"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert!(
        response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream")
    );

    let events = read_events(response).await;
    let chars: Vec<&str> = events
        .iter()
        .filter(|e| e["type"] == "content")
        .map(|e| e["content"].as_str().unwrap())
        .collect();
    assert_eq!(chars, vec!["H", "e", "l", "l", "o"]);
    assert!(events.iter().filter(|e| e["type"] == "content").all(|e| e["done"] == json!(false)));
    assert_eq!(
        events.last().unwrap(),
        &json!({"type": "done", "content": "", "summary": "Hello"})
    );

    let status: Value = client
        .get(format!("{base}/api/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["summary"], json!("Hello"));
    assert!(status["lastUpdated"].is_string());
    assert_eq!(status["statusList"][0]["id"], json!(record.id));
    assert_eq!(status["statusList"][0]["aiProcessed"], json!(true));

    let history: Value = client
        .get(format!("{base}/api/history"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history["count"], json!(2));
    assert_eq!(history["history"][1]["role"], json!("assistant"));
    assert_eq!(history["history"][1]["content"], json!("Hello"));

    let cleared = client.delete(format!("{base}/api/history")).send().await.unwrap();
    assert_eq!(cleared.status(), 204);

    let history: Value = client
        .get(format!("{base}/api/history"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history["count"], json!(0));
    assert!(store.load_history(50).unwrap().is_empty());
}

#[tokio::test]
async fn test_generate_without_provider_uses_local_summary() {
    let (base, store) = spawn_app(None).await;
    store.add_record("Learn X", "", recap_common::StatusKind::Ongoing).unwrap();

    let response = reqwest::Client::new()
        .post(format!("{base}/api/generate-summary-stream"))
        .send()
        .await
        .unwrap();
    let events = read_events(response).await;

    let last = events.last().unwrap();
    assert_eq!(last["type"], json!("done"));
    assert!(last["summary"].as_str().unwrap().contains("Learn X"));
    assert_eq!(events.iter().filter(|e| e["type"] != "content").count(), 1);
}
