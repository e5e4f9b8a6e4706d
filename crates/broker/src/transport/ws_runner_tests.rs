// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum_test::TestServer;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::config::{BrokerConfig, StoreKind};
use crate::store::MemoryStore;
use crate::transport::build_router;

fn test_config() -> BrokerConfig {
    BrokerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        token_secret: "ws-test-secret".into(),
        runner_secrets: "R1=s1,R2=s2".into(),
        store: StoreKind::Memory,
        redis_url: "redis://127.0.0.1:6379/0".into(),
        cors_origins: Vec::new(),
    }
}

fn test_state() -> Arc<BrokerState> {
    let state = BrokerState::new(
        test_config(),
        Arc::new(MemoryStore::new()),
        CancellationToken::new(),
    )
    .unwrap();
    Arc::new(state)
}

/// Real HTTP transport so WebSocket upgrades actually happen.
fn ws_server(state: Arc<BrokerState>) -> TestServer {
    TestServer::builder().http_transport().build(build_router(state)).unwrap()
}

fn new_handle(state: &BrokerState) -> Handle {
    let (tx, _rx) = mpsc::unbounded_channel();
    state.engine.registry.new_handle(tx)
}

fn frame_value(reply: &str) -> serde_json::Value {
    serde_json::from_str(reply).unwrap()
}

// ── dispatch: registration phases ─────────────────────────────────────

#[tokio::test]
async fn invalid_secret_is_fatal_and_leaves_the_phase_unregistered() {
    let state = test_state();
    let handle = new_handle(&state);
    let mut phase = Phase::AwaitRegister;

    let flow = dispatch(
        &state,
        &handle,
        &mut phase,
        r#"{"event":"runner:register","runner_id":"R1","secret":"wrong"}"#,
    )
    .await;

    match flow {
        Flow::Fatal(reply) => {
            let value = frame_value(&reply);
            assert_eq!(value["event"], "runner:register:error");
            assert_eq!(value["code"], "INVALID_SECRET");
        }
        _ => panic!("expected the connection to close"),
    }
    assert!(matches!(phase, Phase::AwaitRegister));
}

#[tokio::test]
async fn malformed_supplied_code_keeps_the_socket_open_for_a_retry() {
    let state = test_state();
    let handle = new_handle(&state);
    let mut phase = Phase::AwaitRegister;

    let bad = r#"{"event":"runner:register","runner_id":"R1","pairing_code":"abc","secret":"s1"}"#;
    match dispatch(&state, &handle, &mut phase, bad).await {
        Flow::Reply(reply) => {
            let value = frame_value(&reply);
            assert_eq!(value["event"], "runner:register:error");
            assert_eq!(value["code"], "INVALID_FORMAT");
        }
        _ => panic!("expected a non-fatal error reply"),
    }
    assert!(matches!(phase, Phase::AwaitRegister));

    // The runner retries on the same socket and advertises.
    let good = r#"{"event":"runner:register","runner_id":"R1","secret":"s1"}"#;
    match dispatch(&state, &handle, &mut phase, good).await {
        Flow::Reply(reply) => {
            assert_eq!(frame_value(&reply)["event"], "runner:register:success");
        }
        _ => panic!("expected a register success reply"),
    }
    match &phase {
        Phase::Advertised { runner_id } => assert_eq!(runner_id, "R1"),
        Phase::AwaitRegister => panic!("expected the phase to advance"),
    }
}

#[tokio::test]
async fn code_collision_allows_a_retry_on_the_same_socket() {
    let state = test_state();
    let other = new_handle(&state);
    state.engine.runner_register(&other, "R2", Some("AAA-BBB-CCC"), "s2").await.unwrap();

    let handle = new_handle(&state);
    let mut phase = Phase::AwaitRegister;

    let taken =
        r#"{"event":"runner:register","runner_id":"R1","pairing_code":"AAA-BBB-CCC","secret":"s1"}"#;
    match dispatch(&state, &handle, &mut phase, taken).await {
        Flow::Reply(reply) => assert_eq!(frame_value(&reply)["code"], "DUPLICATE_CODE"),
        _ => panic!("expected a non-fatal error reply"),
    }
    assert!(matches!(phase, Phase::AwaitRegister));

    let retry =
        r#"{"event":"runner:register","runner_id":"R1","pairing_code":"DDD-EEE-FFF","secret":"s1"}"#;
    match dispatch(&state, &handle, &mut phase, retry).await {
        Flow::Reply(reply) => {
            let value = frame_value(&reply);
            assert_eq!(value["event"], "runner:register:success");
            assert_eq!(value["pairing_code"], "DDD-EEE-FFF");
        }
        _ => panic!("expected a register success reply"),
    }
    assert!(matches!(phase, Phase::Advertised { .. }));
}

#[tokio::test]
async fn duplicate_register_after_advertising_is_ignored() {
    let state = test_state();
    let handle = new_handle(&state);
    let mut phase = Phase::AwaitRegister;

    let register = r#"{"event":"runner:register","runner_id":"R1","secret":"s1"}"#;
    match dispatch(&state, &handle, &mut phase, register).await {
        Flow::Reply(_) => {}
        _ => panic!("expected a register success reply"),
    }

    match dispatch(&state, &handle, &mut phase, register).await {
        Flow::Continue => {}
        _ => panic!("expected the duplicate register to be ignored"),
    }
    assert!(matches!(phase, Phase::Advertised { .. }));
}

// ── dispatch: pre-registration and junk frames ────────────────────────

#[tokio::test]
async fn heartbeats_before_registration_are_ignored() {
    let state = test_state();
    let handle = new_handle(&state);
    let mut phase = Phase::AwaitRegister;

    let beat = r#"{"event":"runner:heartbeat","runner_id":"R1"}"#;
    assert!(matches!(dispatch(&state, &handle, &mut phase, beat).await, Flow::Continue));
    assert!(matches!(phase, Phase::AwaitRegister));
}

#[tokio::test]
async fn terminal_frames_before_registration_are_dropped() {
    let state = test_state();
    let handle = new_handle(&state);
    let mut phase = Phase::AwaitRegister;

    let output = r#"{"event":"terminal_output","session_id":"s1","data":"x"}"#;
    assert!(matches!(dispatch(&state, &handle, &mut phase, output).await, Flow::Continue));
}

#[tokio::test]
async fn junk_frames_never_error_the_runner_socket() {
    let state = test_state();
    let handle = new_handle(&state);
    let mut phase = Phase::AwaitRegister;

    for text in ["not json", r#"{"data":"no event"}"#, r#"{"event":"runner:register"}"#] {
        assert!(matches!(dispatch(&state, &handle, &mut phase, text).await, Flow::Continue));
    }
    assert!(matches!(phase, Phase::AwaitRegister));
}

// ── socket conversation ───────────────────────────────────────────────

#[tokio::test]
async fn upgrade_needs_no_token_and_register_succeeds_over_the_socket() {
    let server = ws_server(test_state());
    let mut ws = server.get_websocket("/ws/runner").await.into_websocket().await;

    ws.send_text(r#"{"event":"runner:register","runner_id":"R1","secret":"s1"}"#).await;
    let reply: serde_json::Value = serde_json::from_str(&ws.receive_text().await).unwrap();
    assert_eq!(reply["event"], "runner:register:success");
    assert_eq!(reply["runner_id"], "R1");
    assert_eq!(reply["pairing_code"].as_str().map(str::len), Some(11));
}

#[tokio::test]
async fn invalid_secret_over_the_socket_gets_the_error_frame() {
    let server = ws_server(test_state());
    let mut ws = server.get_websocket("/ws/runner").await.into_websocket().await;

    ws.send_text(r#"{"event":"runner:register","runner_id":"R1","secret":"wrong"}"#).await;
    let reply: serde_json::Value = serde_json::from_str(&ws.receive_text().await).unwrap();
    assert_eq!(reply["event"], "runner:register:error");
    assert_eq!(reply["code"], "INVALID_SECRET");
}

#[tokio::test]
async fn plain_get_on_the_runner_route_is_not_an_upgrade() {
    let server = TestServer::new(build_router(test_state())).unwrap();
    let resp = server.get("/ws/runner").await;
    assert_ne!(resp.status_code(), StatusCode::SWITCHING_PROTOCOLS);
}
