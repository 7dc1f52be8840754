// Integration tests for the HTTP control surface
//
// Requests go straight through the router with `tower::ServiceExt::oneshot`; the voice
// session behind it runs on fake devices and a fake Live service.

mod common;

use anyhow::Result;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{session_config, FakeConnector, FakeDevices};
use lex_live::{create_router, AppState, InboundEvent, SessionConfig, VoiceSession};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

fn app(config: SessionConfig) -> (Router, Arc<FakeConnector>) {
    let connector = Arc::new(FakeConnector::new());
    let voice = Arc::new(VoiceSession::new(
        config,
        connector.clone(),
        Arc::new(FakeDevices::new()),
    ));
    (create_router(AppState::new(voice)), connector)
}

async fn call(app: &Router, method: &str, uri: &str) -> Result<(StatusCode, Value)> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())?;
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    Ok((status, body))
}

#[tokio::test]
async fn test_health() -> Result<()> {
    let (app, _) = app(session_config());
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty())?)
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    assert_eq!(&bytes[..], b"OK");
    Ok(())
}

#[tokio::test]
async fn test_start_status_stop() -> Result<()> {
    let (app, connector) = app(session_config());

    let (status, body) = call(&app, "POST", "/voice/start").await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["session_id"].as_str().unwrap_or_default().starts_with("voice-"));
    assert_eq!(body["state"], "listening");

    let (status, body) = call(&app, "POST", "/voice/start").await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "session_active");

    let (_, body) = call(&app, "GET", "/voice/status").await?;
    assert_eq!(body["state"], "listening");
    assert!(body["volume"].as_f64().is_some());

    let remote = connector.take_remote().expect("remote end");
    remote
        .events
        .send(InboundEvent::TranscriptFragment("Bonjour".to_string()))?;
    remote.events.send(InboundEvent::TurnComplete)?;

    let mut body = Value::Null;
    for _ in 0..100 {
        let (status, latest) = call(&app, "GET", "/voice/transcript").await?;
        assert_eq!(status, StatusCode::OK);
        body = latest;
        if body["turns"].as_array().is_some_and(|turns| !turns.is_empty()) {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(body["turns"][0]["text"], "Bonjour");
    assert_eq!(body["turns"][0]["role"], "model");

    let (status, body) = call(&app, "POST", "/voice/stop").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "disconnected");
    assert_eq!(body["stats"]["end_reason"]["kind"], "user_stop");

    // Stopping again is still fine
    let (status, _) = call(&app, "POST", "/voice/stop").await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_start_without_credential_is_bad_request() -> Result<()> {
    let (app, connector) = app(SessionConfig {
        api_key: None,
        ..session_config()
    });

    let (status, body) = call(&app, "POST", "/voice/start").await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "configuration");
    assert_eq!(connector.opens(), 0);

    let (_, body) = call(&app, "GET", "/voice/status").await?;
    assert_eq!(body["state"], "disconnected");
    Ok(())
}

#[tokio::test]
async fn test_refused_connection_is_unavailable() -> Result<()> {
    let voice = Arc::new(VoiceSession::new(
        session_config(),
        Arc::new(FakeConnector::refusing()),
        Arc::new(FakeDevices::new()),
    ));
    let app = create_router(AppState::new(voice));

    let (status, body) = call(&app, "POST", "/voice/start").await?;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["kind"], "connection");
    Ok(())
}

#[tokio::test]
async fn test_unknown_route_is_not_found() -> Result<()> {
    let (app, _) = app(session_config());
    let (status, _) = call(&app, "GET", "/voice/unknown").await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}
