//! Routing behaviour against the in-process transport: endpoint dispatch,
//! per-message deduplication, twin-triggered recording, error containment.

use blc::recording::RECORDING_OUTPUT;
use blc::transport::{InboundMessage, MemoryTransport, TransportEvent};
use blc::twin::TwinCell;
use blc::{EndpointHandler, RouteOutcome, RouteTable, Router};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;

fn router_with(transport: &Arc<MemoryTransport>) -> (Router, Arc<TwinCell>) {
    let twin = Arc::new(TwinCell::new());
    let router = Router::new(RouteTable::standard(), transport.clone(), twin.clone());
    (router, twin)
}

fn message(endpoint: &str, body: &str) -> TransportEvent {
    TransportEvent::Message(InboundMessage::new(endpoint, body))
}

/// (configId, state) pairs across every recorded output.
async fn commands(transport: &MemoryTransport) -> Vec<(String, bool)> {
    let mut out = Vec::new();
    for msg in transport.sent().await {
        assert_eq!(msg.output, RECORDING_OUTPUT);
        let body = msg.json().expect("output body is json");
        for entry in body["startRecording"].as_array().expect("startRecording list") {
            out.push((
                entry["configId"].as_str().expect("configId").to_string(),
                entry["state"].as_bool().expect("state"),
            ));
        }
    }
    out
}

#[tokio::test]
async fn inference_emits_one_start_command_per_unique_pipeline() {
    let transport = Arc::new(MemoryTransport::new());
    let (router, _) = router_with(&transport);

    let outcome = router
        .route(message(
            "inferenceInput",
            r#"[{"pipelineId":"p1"},{"pipelineId":"p2"},{"pipelineId":"p1"},
                {"pipelineId":"p3"},{"pipelineId":"p2"}]"#,
        ))
        .await;
    assert_eq!(outcome, RouteOutcome::Emitted { sent: 3, failed: 0 });

    let sent = transport.sent().await;
    assert_eq!(sent.len(), 3);
    for msg in &sent {
        assert_eq!(msg.json().unwrap()["startRecording"].as_array().unwrap().len(), 1);
    }
    let cmds = commands(&transport).await;
    let ids: BTreeSet<_> = cmds.iter().map(|(id, _)| id.clone()).collect();
    assert_eq!(
        ids,
        ["p1", "p2", "p3"]
            .iter()
            .map(|s| s.to_string())
            .collect::<BTreeSet<String>>()
    );
    assert!(cmds.iter().all(|(_, state)| *state));
}

#[tokio::test]
async fn empty_inference_list_emits_nothing() {
    let transport = Arc::new(MemoryTransport::new());
    let (router, _) = router_with(&transport);

    let outcome = router.route(message("inferenceInput", "[]")).await;
    assert_eq!(outcome, RouteOutcome::Emitted { sent: 0, failed: 0 });
    assert!(transport.sent().await.is_empty());
}

#[tokio::test]
async fn regions_of_interest_are_discarded() {
    let transport = Arc::new(MemoryTransport::new());
    let (router, _) = router_with(&transport);

    let outcome = router
        .route(message(
            "inputRegionsOfInterest",
            r#"[{"pipelineId":"p1","roi":[0,0,10,10]}]"#,
        ))
        .await;
    assert_eq!(outcome, RouteOutcome::Discarded);
    assert!(transport.sent().await.is_empty());
}

#[tokio::test]
async fn unknown_endpoint_is_dropped_and_routing_continues() {
    let transport = Arc::new(MemoryTransport::new());
    let (router, _) = router_with(&transport);

    assert_eq!(
        router.route(message("telemetry", r#"[{"pipelineId":"p9"}]"#)).await,
        RouteOutcome::Unrouted
    );
    assert_eq!(
        router.route(message("InferenceInput", r#"[{"pipelineId":"p9"}]"#)).await,
        RouteOutcome::Unrouted
    );
    assert!(transport.sent().await.is_empty());

    router.route(message("inferenceInput", r#"[{"pipelineId":"p1"}]"#)).await;
    assert_eq!(commands(&transport).await, vec![("p1".to_string(), true)]);
}

#[tokio::test]
async fn deduplication_is_per_message() {
    let transport = Arc::new(MemoryTransport::new());
    let (router, _) = router_with(&transport);

    router.route(message("inferenceInput", r#"[{"pipelineId":"p1"}]"#)).await;
    router.route(message("inferenceInput", r#"[{"pipelineId":"p1"}]"#)).await;
    assert_eq!(
        commands(&transport).await,
        vec![("p1".to_string(), true), ("p1".to_string(), true)]
    );
}

#[tokio::test]
async fn malformed_inference_is_dropped_and_next_message_still_works() {
    let transport = Arc::new(MemoryTransport::new());
    let (router, _) = router_with(&transport);

    assert_eq!(
        router.route(message("inferenceInput", "{not json")).await,
        RouteOutcome::Dropped
    );
    assert_eq!(
        router
            .route(message("inferenceInput", r#"[{"pipelineId":"p1"},{"score":1}]"#))
            .await,
        RouteOutcome::Dropped
    );
    assert!(transport.sent().await.is_empty());

    assert_eq!(
        router.route(message("inferenceInput", r#"[{"pipelineId":"p2"}]"#)).await,
        RouteOutcome::Emitted { sent: 1, failed: 0 }
    );
    assert_eq!(commands(&transport).await, vec![("p2".to_string(), true)]);
}

#[tokio::test]
async fn twin_patch_forwards_recording_list_verbatim() {
    let transport = Arc::new(MemoryTransport::new());
    let (router, twin) = router_with(&transport);

    let patch: serde_json::Value =
        serde_json::from_str(r#"{"startRecording":[{"configId":"p1","state":false}],"$version":2}"#)
            .unwrap();
    let outcome = router.route(TransportEvent::TwinPatch(patch)).await;
    assert_eq!(outcome, RouteOutcome::Emitted { sent: 1, failed: 0 });

    let sent = transport.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].output, "recordingOutput");
    assert_eq!(
        sent[0].text(),
        r#"{"startRecording":[{"configId":"p1","state":false}]}"#
    );

    let snap = twin.snapshot().await;
    assert_eq!(snap.version, Some(2));
    assert_eq!(
        snap.get("startRecording"),
        Some(&json!([{"configId": "p1", "state": false}]))
    );
}

#[tokio::test]
async fn twin_patch_batch_is_one_message() {
    let transport = Arc::new(MemoryTransport::new());
    let (router, _) = router_with(&transport);

    let patch = json!({"startRecording": [
        {"configId": "a", "state": true},
        {"configId": "b", "state": false}
    ]});
    router.route(TransportEvent::TwinPatch(patch)).await;

    assert_eq!(transport.sent().await.len(), 1);
    assert_eq!(
        commands(&transport).await,
        vec![("a".to_string(), true), ("b".to_string(), false)]
    );
}

#[tokio::test]
async fn twin_patch_without_trigger_only_updates_twin() {
    let transport = Arc::new(MemoryTransport::new());
    let (router, twin) = router_with(&transport);

    let outcome = router
        .route(TransportEvent::TwinPatch(json!({"logLevel": "debug"})))
        .await;
    assert_eq!(outcome, RouteOutcome::TwinApplied);
    assert!(transport.sent().await.is_empty());
    assert_eq!(twin.snapshot().await.get("logLevel"), Some(&json!("debug")));

    let outcome = router
        .route(TransportEvent::TwinPatch(json!({"startRecording": null})))
        .await;
    assert_eq!(outcome, RouteOutcome::TwinApplied);
    assert!(transport.sent().await.is_empty());
}

#[tokio::test]
async fn twin_trigger_that_is_not_a_list_is_dropped() {
    let transport = Arc::new(MemoryTransport::new());
    let (router, _) = router_with(&transport);

    let outcome = router
        .route(TransportEvent::TwinPatch(json!({"startRecording": "p1"})))
        .await;
    assert_eq!(outcome, RouteOutcome::Dropped);
    assert!(transport.sent().await.is_empty());
}

#[tokio::test]
async fn twin_patch_that_is_not_an_object_is_dropped() {
    let transport = Arc::new(MemoryTransport::new());
    let (router, twin) = router_with(&transport);

    for patch in [json!([1, 2]), json!("startRecording"), json!(7)] {
        let outcome = router.route(TransportEvent::TwinPatch(patch)).await;
        assert_eq!(outcome, RouteOutcome::Dropped);
    }
    assert!(transport.sent().await.is_empty());
    assert!(twin.snapshot().await.is_empty());

    let outcome = router
        .route(TransportEvent::TwinPatch(json!({"mode": "armed"})))
        .await;
    assert_eq!(outcome, RouteOutcome::TwinApplied);
}

#[tokio::test]
async fn send_failures_are_counted_and_do_not_stop_routing() {
    let transport = Arc::new(MemoryTransport::new());
    let (router, _) = router_with(&transport);

    transport.set_fail_sends(true);
    let outcome = router
        .route(message("inferenceInput", r#"[{"pipelineId":"p1"},{"pipelineId":"p2"}]"#))
        .await;
    assert_eq!(outcome, RouteOutcome::Emitted { sent: 0, failed: 2 });

    transport.set_fail_sends(false);
    let outcome = router
        .route(message("inferenceInput", r#"[{"pipelineId":"p3"}]"#))
        .await;
    assert_eq!(outcome, RouteOutcome::Emitted { sent: 1, failed: 0 });
    assert_eq!(commands(&transport).await, vec![("p3".to_string(), true)]);
}

#[tokio::test]
async fn custom_twin_route_applies_patch_from_message_body() {
    let transport = Arc::new(MemoryTransport::new());
    let twin = Arc::new(TwinCell::new());
    let mut table = RouteTable::standard();
    table.register("manualTrigger", EndpointHandler::TriggerFromTwin);
    let router = Router::new(table, transport.clone(), twin.clone());

    let outcome = router
        .route(message(
            "manualTrigger",
            r#"{"startRecording":[{"configId":"cam","state":true}]}"#,
        ))
        .await;
    assert_eq!(outcome, RouteOutcome::Emitted { sent: 1, failed: 0 });
    assert_eq!(commands(&transport).await, vec![("cam".to_string(), true)]);

    assert_eq!(
        router.route(message("manualTrigger", "nope")).await,
        RouteOutcome::Dropped
    );
}
