use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;
use serde_json::json;
use url::Url;
use vidspire_core::{
    Feature, IdeaRequest, JobRepresentation, RemoteJobState, SearchQuery, SortOrder,
    StreamMessage,
};
use vidspire_engine::{
    now_millis, Backend, BackendSettings, EngineEvent, FailureKind, ProgressSink,
    ReqwestBackend,
};
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct TestSink {
    events: Arc<Mutex<Vec<EngineEvent>>>,
}

impl TestSink {
    fn take(&self) -> Vec<EngineEvent> {
        self.events.lock().unwrap().drain(..).collect()
    }
}

impl ProgressSink for TestSink {
    fn emit(&self, event: EngineEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn backend_for(server: &MockServer) -> ReqwestBackend {
    let api_url = Url::parse(&server.uri()).unwrap();
    ReqwestBackend::new(BackendSettings::new(api_url)).unwrap()
}

#[tokio::test]
async fn analyze_returns_job_and_rate_limit_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/video/analyze"))
        .and(body_json(json!({"videoUrl": "https://youtube.com/watch?v=X"})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-RateLimit-Remaining", "1")
                .insert_header("X-RateLimit-Limit", "2")
                .insert_header("X-RateLimit-Reset", "3600")
                .set_body_json(json!({"success": true, "data": {"jobId": "J1", "videoId": "X"}})),
        )
        .mount(&server)
        .await;

    let response = backend_for(&server)
        .analyze("https://youtube.com/watch?v=X")
        .await
        .expect("accepted");

    assert_eq!(response.data.job_id, "J1");
    assert_eq!(response.data.video_id, "X");
    assert_eq!(response.rate_limit.remaining, Some(1));
    assert_eq!(response.rate_limit.limit, Some(2));
    assert_eq!(response.rate_limit.reset, Some(3600));
}

#[tokio::test]
async fn analyze_429_is_rate_limited_and_not_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/video/analyze"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("X-RateLimit-Remaining", "0")
                .insert_header("Retry-After", "120")
                .set_body_json(json!({"success": false})),
        )
        .mount(&server)
        .await;

    let err = backend_for(&server).analyze("u").await.unwrap_err();

    assert_eq!(err.kind, FailureKind::RateLimited);
    assert_eq!(err.message, "Daily limit reached. Try again tomorrow!");
    assert!(!err.is_retryable());
    assert_eq!(err.rate_limit.remaining, Some(0));
    assert_eq!(err.rate_limit.retry_after, Some(120));
}

#[tokio::test]
async fn analyze_failure_surfaces_server_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/video/analyze"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({"success": false, "message": "Invalid YouTube URL"})),
        )
        .mount(&server)
        .await;

    let err = backend_for(&server).analyze("nope").await.unwrap_err();

    assert_eq!(err.kind, FailureKind::HttpStatus(400));
    assert_eq!(err.message, "Invalid YouTube URL");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn job_status_reads_queue_state() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/video/status/J1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            json!({"success": true, "data": {"state": "active", "progress": 40}}),
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/video/status/gone"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": false})))
        .mount(&server)
        .await;

    let backend = backend_for(&server);
    let status = backend.job_status("J1").await.expect("status");
    assert_eq!(status.state, RemoteJobState::Active);
    assert_eq!(status.progress, Some(40.0));

    let err = backend.job_status("gone").await.unwrap_err();
    assert_eq!(err.message, "Job not found");
}

#[tokio::test]
async fn job_classifies_error_bodies_on_any_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/video/J404"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(json!({"success": false, "message": "Job not found"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/video/Jwait"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            json!({"success": true, "data": {"state": "waiting"}}),
        ))
        .mount(&server)
        .await;

    let backend = backend_for(&server);
    assert_eq!(
        backend.job("J404").await,
        Ok(JobRepresentation::Error {
            message: "Job not found".to_string(),
        })
    );

    let err = backend.job("Jwait").await.unwrap_err();
    assert_eq!(err.kind, FailureKind::InvalidResponse);
    assert_eq!(err.message, "Unknown job state: waiting");
}

#[tokio::test]
async fn usage_builds_snapshot() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/usage/comment-analyzer"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "feature": {"remaining": 0, "limit": 2, "resetIn": 7200, "isExhausted": true}
        })))
        .mount(&server)
        .await;

    let before = now_millis();
    let snapshot = backend_for(&server)
        .usage(Feature::CommentAnalyzer)
        .await
        .expect("usage");
    let after = now_millis();

    assert_eq!(snapshot.remaining, 0);
    assert_eq!(snapshot.limit, 2);
    assert_eq!(snapshot.reset_in, Some(7200));
    assert!(snapshot.is_exhausted);
    // Stamped with the same clock the app reads, so the window holds right away.
    assert!((before..=after).contains(&snapshot.observed_at));
    assert!(snapshot.is_limited_at(after));
}

#[tokio::test]
async fn validate_idea_streams_messages_and_skips_malformed_lines() {
    let server = MockServer::start().await;
    let body = concat!(
        "{\"type\":\"log\",\"level\":\"info\",\"message\":\"Starting\"}\n",
        "not json\n",
        "\n",
        "{\"type\":\"progress\",\"percentage\":50}\n",
        "{\"type\":\"final\",\"data\":{\"success\":true,\"data\":{\"verdict\":\"Go\"}}}",
    );
    Mock::given(method("POST"))
        .and(path("/validate-idea"))
        .and(body_json(json!({
            "idea": "Rust tips",
            "targetAudience": "devs",
            "goal": "grow"
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-RateLimit-Remaining", "1")
                .set_body_raw(body, "application/x-ndjson"),
        )
        .mount(&server)
        .await;

    let sink = TestSink::default();
    let request = IdeaRequest {
        idea: "Rust tips".to_string(),
        target_audience: "devs".to_string(),
        goal: "grow".to_string(),
    };
    let headers = backend_for(&server)
        .validate_idea(&request, &sink)
        .await
        .expect("stream");

    assert_eq!(headers.remaining, Some(1));
    let kinds: Vec<&'static str> = sink
        .take()
        .into_iter()
        .map(|event| match event {
            EngineEvent::Idea(StreamMessage::Log(_)) => "log",
            EngineEvent::Idea(StreamMessage::Progress { .. }) => "progress",
            EngineEvent::Idea(StreamMessage::Final { .. }) => "final",
            _ => "other",
        })
        .collect();
    assert_eq!(kinds, vec!["log", "progress", "final"]);
}

#[tokio::test]
async fn validate_idea_rate_limit_uses_server_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/validate-idea"))
        .respond_with(
            ResponseTemplate::new(429)
                .set_body_json(json!({"success": false, "message": "Come back tomorrow"})),
        )
        .mount(&server)
        .await;

    let request = IdeaRequest {
        idea: "a".to_string(),
        target_audience: "b".to_string(),
        goal: "c".to_string(),
    };
    let err = backend_for(&server)
        .validate_idea(&request, &TestSink::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind, FailureKind::RateLimited);
    assert_eq!(err.message, "Come back tomorrow");
}

#[tokio::test]
async fn search_sends_only_set_filters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/topics/search-advanced"))
        .and(query_param("query", "rust"))
        .and(query_param("sort", "topRated"))
        .and(query_param("maxResults", "20"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-RateLimit-Remaining", "4")
                .set_body_json(json!({
                    "success": true,
                    "data": [{"id": "v1", "title": "Clip", "views": 10}]
                })),
        )
        .mount(&server)
        .await;

    let mut query = SearchQuery::new("rust");
    query.sort = Some(SortOrder::TopRated);
    let response = backend_for(&server).search(&query).await.expect("search");

    assert_eq!(response.data.len(), 1);
    assert_eq!(response.data[0].title, "Clip");
    assert_eq!(response.rate_limit.remaining, Some(4));

    let requests = server.received_requests().await.unwrap();
    let query_string = requests[0].url.query().unwrap_or_default().to_string();
    assert!(!query_string.contains("viralScore"));
    assert!(!query_string.contains("minViews"));
}
