mod common;

use axum::http::StatusCode;
use common::*;
use serde_json::json;
use statmon_common::types::MetricValue;
use statmon_common::{crypto, sign};

#[tokio::test]
async fn batch_update_then_counter_accumulates() {
    let ctx = build_test_context(None);

    let batch = json!([
        {"id": "HeapAlloc", "type": "gauge", "value": 100.5},
        {"id": "PollCount", "type": "counter", "delta": 1},
    ]);
    let (status, body) = request_json(&ctx.app, "POST", "/updates/", None, Some(batch.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, _) = request_json(&ctx.app, "POST", "/updates/", None, Some(batch)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, value) = request_json(
        &ctx.app,
        "POST",
        "/value/",
        None,
        Some(json!({"id": "PollCount", "type": "counter"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["delta"], 2);
}

#[tokio::test]
async fn gauge_last_write_wins() {
    let ctx = build_test_context(None);

    for value in [100.5, 200.25] {
        let (status, _) = request_json(
            &ctx.app,
            "POST",
            "/updates/",
            None,
            Some(json!([{"id": "HeapAlloc", "type": "gauge", "value": value}])),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, value) = request_json(
        &ctx.app,
        "POST",
        "/value/",
        None,
        Some(json!({"id": "HeapAlloc", "type": "gauge"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["value"], 200.25);
}

#[tokio::test]
async fn unknown_kind_rejects_whole_batch() {
    let ctx = build_test_context(None);

    let batch = json!([
        {"id": "first", "type": "counter", "delta": 1},
        {"id": "second", "type": "histogram", "value": 1.0},
        {"id": "third", "type": "counter", "delta": 1},
    ]);
    let (status, body) = request_json(&ctx.app, "POST", "/updates/", None, Some(batch)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");

    // Nothing was applied at the HTTP boundary.
    for id in ["first", "third"] {
        let (status, _) = request_json(
            &ctx.app,
            "POST",
            "/value/",
            None,
            Some(json!({"id": id, "type": "counter"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

#[tokio::test]
async fn empty_batch_rejected() {
    let ctx = build_test_context(None);
    let (status, _) = request_json(&ctx.app, "POST", "/updates/", None, Some(json!([]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn signed_batch_accepted_and_tampered_rejected() {
    let ctx = build_test_context(Some("k1"));

    let value = MetricValue::Counter(1);
    let sig = sign::sign_hex("PollCount", &value, "k1");
    let (status, _) = request_json(
        &ctx.app,
        "POST",
        "/updates/",
        None,
        Some(json!([{"id": "PollCount", "type": "counter", "delta": 1, "hash": sig}])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Flip one hex digit of the signature.
    let sig = sign::sign_hex("PollCount", &value, "k1");
    let mut tampered = sig.into_bytes();
    tampered[0] = if tampered[0] == b'0' { b'1' } else { b'0' };
    let tampered = String::from_utf8(tampered).unwrap();

    let (status, body) = request_json(
        &ctx.app,
        "POST",
        "/updates/",
        None,
        Some(json!([
            {"id": "other", "type": "counter", "delta": 1,
             "hash": sign::sign_hex("other", &value, "k1")},
            {"id": "PollCount", "type": "counter", "delta": 1, "hash": tampered},
        ])),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");

    // Whole payload rejected: the correctly signed entry was not applied.
    let (status, _) = request_json(
        &ctx.app,
        "POST",
        "/value/",
        None,
        Some(json!({"id": "other", "type": "counter"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn missing_signature_rejected_when_key_configured() {
    let ctx = build_test_context(Some("k1"));
    let (status, _) = request_json(
        &ctx.app,
        "POST",
        "/updates/",
        None,
        Some(json!([{"id": "PollCount", "type": "counter", "delta": 1}])),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn single_update_echoes_signature() {
    let ctx = build_test_context(Some("k1"));

    let value = MetricValue::Gauge(42.5);
    let sig = sign::sign_hex("Temp", &value, "k1");
    let (status, body) = request_json(
        &ctx.app,
        "POST",
        "/update/",
        None,
        Some(json!({"id": "Temp", "type": "gauge", "value": 42.5, "hash": sig})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["hash"], sign::sign_hex("Temp", &value, "k1"));

    // The query response is signed too.
    let (status, metric) = request_json(
        &ctx.app,
        "POST",
        "/value/",
        None,
        Some(json!({"id": "Temp", "type": "gauge"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let returned = metric["hash"].as_str().unwrap();
    assert!(sign::verify_hex("Temp", &value, "k1", returned));
}

#[tokio::test]
async fn legacy_path_update_and_read() {
    let ctx = build_test_context(None);

    let (status, body) =
        request_json(&ctx.app, "POST", "/update/counter/PollCount/5", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, text) =
        request_json(&ctx.app, "GET", "/value/counter/PollCount", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, 5);

    let (status, _) =
        request_json(&ctx.app, "POST", "/update/histogram/x/1", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = request_json(&ctx.app, "POST", "/update/counter/x/1.5", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn values_dump_lists_both_kinds() {
    let ctx = build_test_context(None);

    let batch = json!([
        {"id": "HeapAlloc", "type": "gauge", "value": 1.25},
        {"id": "PollCount", "type": "counter", "delta": 3},
    ]);
    request_json(&ctx.app, "POST", "/updates/", None, Some(batch)).await;

    let (status, dump) = request_json(&ctx.app, "GET", "/values/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dump["gauge"]["HeapAlloc"]["value"], 1.25);
    assert_eq!(dump["counter"]["PollCount"]["delta"], 3);
}

#[tokio::test]
async fn ping_reports_backend_liveness() {
    let ctx = build_test_context(None);
    let (status, body) = request_json(&ctx.app, "GET", "/ping", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn trusted_subnet_gates_submissions() {
    let ctx = build_test_context_with(None, Some("10.0.0.0/8"), None);
    let batch = json!([{"id": "PollCount", "type": "counter", "delta": 1}]);

    let (status, _) =
        request_json(&ctx.app, "POST", "/updates/", None, Some(batch.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = request_json(
        &ctx.app,
        "POST",
        "/updates/",
        Some("192.168.1.1"),
        Some(batch.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) =
        request_json(&ctx.app, "POST", "/updates/", Some("10.1.2.3"), Some(batch.clone())).await;
    assert_eq!(status, StatusCode::OK);

    // Queries are not gated.
    let (status, _) = request_json(
        &ctx.app,
        "POST",
        "/value/",
        None,
        Some(json!({"id": "PollCount", "type": "counter"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn encrypted_batch_roundtrip() {
    let mut rng = rand::thread_rng();
    let private = rsa::RsaPrivateKey::new(&mut rng, 2048).unwrap();
    let public = rsa::RsaPublicKey::from(&private);
    let ctx = build_test_context_with(None, None, Some(private));

    let plaintext = serde_json::to_vec(&json!([{"id": "c", "type": "counter", "delta": 1}]))
        .unwrap();
    let ciphertext = crypto::encrypt(&plaintext, &public).unwrap();

    let (status, body) = request_raw(&ctx.app, "POST", "/updates/", ciphertext).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, value) = request_json(
        &ctx.app,
        "POST",
        "/value/",
        None,
        Some(json!({"id": "c", "type": "counter"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["delta"], 1);

    // A payload the key cannot decrypt is rejected before JSON decoding.
    let (status, _) = request_raw(&ctx.app, "POST", "/updates/", b"garbage".to_vec()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
