use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use url::Url;
use vidspire_core::{ChannelEvent, Feature, JobRepresentation};
use vidspire_engine::{
    BackendSettings, ChannelSettings, EngineDisconnected, EngineEvent, EngineHandle,
    PushConnector, PushError, PushStream, ReqwestBackend,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct RefusingConnector;

#[async_trait::async_trait]
impl PushConnector for RefusingConnector {
    async fn connect(&self, _job_id: &str) -> Result<PushStream, PushError> {
        Err(PushError::Socket("connection refused".to_string()))
    }
}

fn engine_for(server: &MockServer, usage_refresh: Duration) -> EngineHandle {
    let api_url = Url::parse(&server.uri()).unwrap();
    let backend = ReqwestBackend::new(BackendSettings::new(api_url)).unwrap();
    let channel = ChannelSettings {
        watchdog: Duration::from_millis(50),
        poll_intervals: vec![Duration::from_millis(10)],
        max_poll_attempts: 120,
    };
    EngineHandle::with_parts(
        Arc::new(backend),
        Arc::new(RefusingConnector),
        channel,
        usage_refresh,
    )
}

async fn next_event(engine: &EngineHandle) -> EngineEvent {
    for _ in 0..300 {
        if let Some(event) = engine.try_recv().unwrap() {
            return event;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("engine produced no event");
}

#[tokio::test(flavor = "multi_thread")]
async fn submit_and_fetch_report_back_with_their_epoch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/video/analyze"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            json!({"success": true, "data": {"jobId": "J1", "videoId": "X"}}),
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/video/J1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            json!({"success": true, "data": {"status": "failed", "error": "quota exceeded"}}),
        ))
        .mount(&server)
        .await;
    let engine = engine_for(&server, Duration::from_secs(30));

    engine.submit(7, "https://youtube.com/watch?v=X");
    match next_event(&engine).await {
        EngineEvent::Submitted { epoch, result } => {
            assert_eq!(epoch, 7);
            assert_eq!(result.unwrap().data.job_id, "J1");
        }
        other => panic!("unexpected event {other:?}"),
    }

    engine.fetch_job(8, "J1".to_string());
    match next_event(&engine).await {
        EngineEvent::JobLoaded {
            epoch,
            job_id,
            result,
        } => {
            assert_eq!(epoch, 8);
            assert_eq!(job_id, "J1");
            assert_eq!(
                result,
                Ok(JobRepresentation::Error {
                    message: "quota exceeded".to_string(),
                })
            );
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn detach_silences_the_channel() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/video/status/J1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            json!({"success": true, "data": {"state": "active", "progress": 10}}),
        ))
        .mount(&server)
        .await;
    let engine = engine_for(&server, Duration::from_secs(30));

    engine.attach(1, "J1".to_string(), "X".to_string());
    match next_event(&engine).await {
        EngineEvent::Channel(envelope) => assert_eq!(envelope.event, ChannelEvent::Armed),
        other => panic!("unexpected event {other:?}"),
    }

    engine.detach();
    // Anything already queued may still be read; after that the channel is quiet.
    tokio::time::sleep(Duration::from_millis(50)).await;
    while engine.try_recv().unwrap().is_some() {}
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(engine.try_recv().unwrap().map(|_| ()), None);
}

#[tokio::test(flavor = "multi_thread")]
async fn usage_watch_refreshes_until_stopped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/usage/comment-analyzer"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "feature": {"remaining": 1, "limit": 2, "resetIn": 60, "isExhausted": false}
        })))
        .mount(&server)
        .await;
    let engine = engine_for(&server, Duration::from_millis(20));

    engine.watch_usage(Feature::CommentAnalyzer);
    for _ in 0..2 {
        match next_event(&engine).await {
            EngineEvent::UsageRefreshed { feature, result } => {
                assert_eq!(feature, Feature::CommentAnalyzer);
                assert_eq!(result.unwrap().remaining, 1);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    engine.stop_usage_watch();
    tokio::time::sleep(Duration::from_millis(50)).await;
    while engine.try_recv().unwrap().is_some() {}
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(engine.try_recv().unwrap().map(|_| ()), None);
}

#[tokio::test(flavor = "multi_thread")]
async fn zero_usage_refresh_still_watches() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/usage/comment-analyzer"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "feature": {"remaining": 2, "limit": 2, "resetIn": 60, "isExhausted": false}
        })))
        .mount(&server)
        .await;
    let engine = engine_for(&server, Duration::ZERO);

    engine.watch_usage(Feature::CommentAnalyzer);
    for _ in 0..2 {
        assert!(matches!(
            next_event(&engine).await,
            EngineEvent::UsageRefreshed { result: Ok(_), .. }
        ));
    }
    engine.stop_usage_watch();
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_is_reported_once_the_queue_drains() {
    let server = MockServer::start().await;
    let engine = engine_for(&server, Duration::from_secs(30));

    engine.shutdown();
    engine.search(vidspire_core::SearchQuery::new("cats"));

    let mut outcome = Ok(None);
    for _ in 0..40 {
        outcome = engine.recv_timeout(Duration::from_millis(50));
        if outcome.is_err() {
            break;
        }
    }
    assert_eq!(outcome.map(|event| event.is_some()), Err(EngineDisconnected));
    assert_eq!(engine.try_recv().map(|event| event.is_some()), Err(EngineDisconnected));
    assert!(server.received_requests().await.unwrap().is_empty());
}
