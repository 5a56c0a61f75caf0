mod common;

use common::{mock_connector, open_gateway, test_config, wait_for};
use reef_gateway::{ConnectionState, Gateway, GatewayError, GatewayEvent};
use serde::Deserialize;
use serde_json::json;

#[tokio::test(start_paused = true)]
async fn test_tag_new_resolves_with_ack_payload() {
    let (gateway, _server, mut conn, _events) = open_gateway(test_config()).await;

    let reply = gateway
        .send_message("TAG_NEW", &json!({"name": "x", "color": "#ffffff"}))
        .unwrap();
    assert_eq!(gateway.pending_count(), 1);

    let frame = conn.recv_json().await;
    assert_eq!(frame["action"], "TAG_NEW");
    assert_eq!(frame["tagNewParams"], json!({"name": "x", "color": "#ffffff"}));
    assert_eq!(frame["id"], reply.request_id().as_str());

    let payload = json!({"id": 7, "name": "x", "color": "#ffffff"});
    conn.ack(&frame, payload.clone());

    assert_eq!(reply.await.unwrap(), payload);
    assert_eq!(gateway.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_ack_without_id_resolves_oldest_request() {
    let (gateway, _server, mut conn, _events) = open_gateway(test_config()).await;

    let first = gateway.send_message("TAG_NEW", &json!({"name": "a"})).unwrap();
    let second = gateway.send_message("TAG_DELETE", &json!(3)).unwrap();
    conn.recv_json().await;
    conn.recv_json().await;

    conn.push_json(json!({"type": "ACTION_EXECUTED", "payload": {"id": 1}}));
    assert_eq!(first.await.unwrap(), json!({"id": 1}));
    assert_eq!(gateway.pending_count(), 1);

    conn.push_json(json!({"type": "ACTION_EXECUTED", "payload": true}));
    assert_eq!(second.await.unwrap(), json!(true));
}

#[tokio::test(start_paused = true)]
async fn test_same_action_requests_resolve_by_id() {
    let (gateway, _server, mut conn, _events) = open_gateway(test_config()).await;

    let first = gateway
        .send_message("TAG_UPDATE", &json!({"id": 1, "name": "one"}))
        .unwrap();
    let second = gateway
        .send_message("TAG_UPDATE", &json!({"id": 2, "name": "two"}))
        .unwrap();
    let first_frame = conn.recv_json().await;
    let second_frame = conn.recv_json().await;
    assert_ne!(first_frame["id"], second_frame["id"]);

    // Acknowledge out of order.
    conn.ack(&second_frame, json!({"id": 2}));
    conn.ack(&first_frame, json!({"id": 1}));

    assert_eq!(first.await.unwrap(), json!({"id": 1}));
    assert_eq!(second.await.unwrap(), json!({"id": 2}));
}

#[tokio::test(start_paused = true)]
async fn test_error_status_rejects_with_remote_error() {
    let (gateway, _server, mut conn, _events) = open_gateway(test_config()).await;

    let reply = gateway.send_message("TAG_NEW", &json!({"name": ""})).unwrap();
    let frame = conn.recv_json().await;
    conn.push_json(json!({
        "id": frame["id"],
        "type": "ACTION_EXECUTED",
        "status": "ERROR",
        "payload": "tag name cannot be empty",
    }));

    match reply.await {
        Err(GatewayError::Remote { action, message }) => {
            assert_eq!(action, "TAG_NEW");
            assert_eq!(message, "tag name cannot be empty");
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(gateway.state().is_open());
}

#[tokio::test(start_paused = true)]
async fn test_unmatched_ack_is_dropped() {
    let (gateway, _server, mut conn, mut events) = open_gateway(test_config()).await;

    let reply = gateway.send_message("TAG_NEW", &json!({"name": "x"})).unwrap();
    let frame = conn.recv_json().await;

    conn.push_json(json!({"id": "nobody", "type": "ACTION_EXECUTED", "payload": {}}));
    wait_for(&mut events, |e| e.message().is_some()).await;
    assert_eq!(gateway.pending_count(), 1);

    conn.ack(&frame, json!({"id": 9}));
    assert_eq!(reply.await.unwrap(), json!({"id": 9}));
}

#[tokio::test(start_paused = true)]
async fn test_closure_rejects_all_pending_requests() {
    let (gateway, _server, mut conn, mut events) = open_gateway(test_config()).await;

    let replies: Vec<_> = (0..3)
        .map(|n| gateway.send_message("TAG_NEW", &json!({"name": n})).unwrap())
        .collect();
    for _ in 0..3 {
        conn.recv_json().await;
    }
    assert_eq!(gateway.pending_count(), 3);

    drop(conn);
    let closed = wait_for(&mut events, |e| matches!(e, GatewayEvent::Closed { .. })).await;
    assert!(matches!(closed, GatewayEvent::Closed { countdown: 5, .. }));
    assert_eq!(gateway.state(), ConnectionState::Closed { countdown: 5 });
    assert_eq!(gateway.pending_count(), 0);

    for reply in replies {
        assert!(matches!(
            reply.await,
            Err(GatewayError::ConnectionLost { .. })
        ));
    }
}

#[tokio::test(start_paused = true)]
async fn test_send_while_closed_fails_fast() {
    let (gateway, server, conn, mut events) = open_gateway(test_config()).await;
    server.set_accepting(false);
    drop(conn);
    wait_for(&mut events, |e| matches!(e, GatewayEvent::Closed { .. })).await;

    let err = gateway.send_message("TAG_LIST", &json!({})).unwrap_err();
    assert!(matches!(err, GatewayError::NotConnected));
    assert!(err.is_recoverable());
    assert_eq!(gateway.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_pending_capacity_limit() {
    let (gateway, _server, mut conn, _events) =
        open_gateway(test_config().max_pending_requests(2)).await;

    let first = gateway.send_message("TAG_NEW", &json!({"name": "a"})).unwrap();
    let _second = gateway.send_message("TAG_NEW", &json!({"name": "b"})).unwrap();
    let err = gateway
        .send_message("TAG_NEW", &json!({"name": "c"}))
        .unwrap_err();
    assert!(matches!(err, GatewayError::CapacityExceeded { limit: 2 }));

    let frame = conn.recv_json().await;
    conn.ack(&frame, json!({}));
    first.await.unwrap();
    assert!(gateway.send_message("TAG_NEW", &json!({"name": "c"})).is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_request_as_deserializes_payload() {
    #[derive(Debug, Deserialize, PartialEq)]
    struct Tag {
        id: u64,
        name: String,
        color: String,
    }

    let (gateway, _server, mut conn, _events) = open_gateway(test_config()).await;

    let server = tokio::spawn(async move {
        let frame = conn.recv_json().await;
        conn.ack(&frame, json!({"id": 7, "name": "x", "color": "#ffffff"}));
        conn
    });

    let tag: Tag = gateway
        .request_as("TAG_NEW", &json!({"name": "x", "color": "#ffffff"}))
        .await
        .unwrap();
    assert_eq!(
        tag,
        Tag {
            id: 7,
            name: "x".to_string(),
            color: "#ffffff".to_string()
        }
    );
    let _conn = server.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_request_without_params_omits_field() {
    let (gateway, _server, mut conn, _events) = open_gateway(test_config()).await;

    let _reply = gateway.send_message("TAG_LIST", &()).unwrap();
    let frame = conn.recv_json().await;
    assert_eq!(frame["action"], "TAG_LIST");
    assert!(frame.get("tagListParams").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_empty_action_is_rejected() {
    let (gateway, _server, _conn, _events) = open_gateway(test_config()).await;
    assert!(matches!(
        gateway.send_message("", &json!({})),
        Err(GatewayError::Config { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_not_connected_takes_precedence_over_bad_arguments() {
    let (connector, _server) = mock_connector();
    let gateway = Gateway::new(test_config(), connector).unwrap();

    assert!(matches!(
        gateway.send_message("", &json!({})),
        Err(GatewayError::NotConnected)
    ));
    assert!(matches!(
        gateway.request("TAG_NEW", &json!({"name": "x"})).await,
        Err(GatewayError::NotConnected)
    ));
}
