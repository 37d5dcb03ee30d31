mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use httpmock::prelude::*;
use serde_json::{json, Value};
use tempfile::tempdir;

use civhelp::catalog::{info_path, ModelType};
use civhelp::versions::{check_for_new_version, check_models_new_version};
use civhelp::HelperContext;

use common::{test_context, test_settings, write_model};

fn local_model(ctx: &HelperContext, name: &str, version_id: u64) -> PathBuf {
    let model = write_model(ctx, ModelType::Lora, name, b"x");
    fs::write(
        info_path(&model),
        json!({ "id": version_id, "modelId": 45 }).to_string(),
    )
    .unwrap();
    model
}

async fn remote_model(server: &MockServer, latest: Value) {
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/models/45");
            then.status(200).json_body(json!({
                "id": 45,
                "name": "Foo",
                "type": "LORA",
                "modelVersions": [latest, { "id": 123, "name": "v1" }]
            }));
        })
        .await;
}

#[tokio::test]
async fn reports_a_newer_remote_version() {
    let server = MockServer::start_async().await;
    remote_model(
        &server,
        json!({
            "id": 456,
            "name": "v2",
            "description": "better",
            "downloadUrl": "https://example.invalid/dl/456",
            "images": [{ "url": "https://example.invalid/img/1.png" }]
        }),
    )
    .await;

    let dir = tempdir().unwrap();
    let ctx = test_context(dir.path(), &server.url("/api/v1/"));
    let model = local_model(&ctx, "foo.safetensors", 123);

    let found = check_for_new_version(&ctx, &model, ModelType::Lora)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(found.model_path, model);
    assert_eq!(found.model_id, "45");
    assert_eq!(found.model_name, "Foo");
    assert_eq!(found.version_id, "456");
    assert_eq!(found.version_name, "v2");
    assert_eq!(found.description, "better");
    assert_eq!(found.download_url.as_deref(), Some("https://example.invalid/dl/456"));
    assert_eq!(found.img_url.as_deref(), Some("https://example.invalid/img/1.png"));
    assert_eq!(found.model_type, ModelType::Lora);
}

#[tokio::test]
async fn unchanged_version_is_not_reported() {
    let server = MockServer::start_async().await;
    remote_model(&server, json!({ "id": 123, "name": "v1" })).await;

    let dir = tempdir().unwrap();
    let ctx = test_context(dir.path(), &server.url("/api/v1/"));
    let model = local_model(&ctx, "foo.safetensors", 123);

    assert!(check_for_new_version(&ctx, &model, ModelType::Lora)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn version_downloaded_under_another_name_is_not_reported() {
    let server = MockServer::start_async().await;
    remote_model(&server, json!({ "id": 456, "name": "v2" })).await;

    let dir = tempdir().unwrap();
    let ctx = test_context(dir.path(), &server.url("/api/v1/"));
    let model = local_model(&ctx, "foo.safetensors", 123);
    local_model(&ctx, "foo_v2.safetensors", 456);

    assert!(check_for_new_version(&ctx, &model, ModelType::Lora)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn missing_download_url_is_not_fatal() {
    let server = MockServer::start_async().await;
    remote_model(&server, json!({ "id": 456, "name": "v2", "images": [] })).await;

    let dir = tempdir().unwrap();
    let ctx = test_context(dir.path(), &server.url("/api/v1/"));
    let model = local_model(&ctx, "foo.safetensors", 123);

    let found = check_for_new_version(&ctx, &model, ModelType::Lora)
        .await
        .unwrap()
        .unwrap();
    assert!(found.download_url.is_none());
    assert!(found.img_url.is_none());
}

#[tokio::test]
async fn models_without_sidecar_ids_are_skipped() {
    let dir = tempdir().unwrap();
    let ctx = test_context(dir.path(), "http://127.0.0.1:9/api/v1/");
    let model = write_model(&ctx, ModelType::Lora, "skeleton.safetensors", b"x");
    fs::write(info_path(&model), r#"{"id": "", "modelId": ""}"#).unwrap();
    let bare = write_model(&ctx, ModelType::Lora, "bare.safetensors", b"x");

    for path in [model.as_path(), bare.as_path()] {
        assert!(check_for_new_version(&ctx, path, ModelType::Lora)
            .await
            .unwrap()
            .is_none());
    }
    assert!(check_for_new_version(&ctx, Path::new("notes.txt"), ModelType::Lora)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn sweep_reports_each_version_once() {
    let server = MockServer::start_async().await;
    remote_model(&server, json!({ "id": 456, "name": "v2" })).await;

    let dir = tempdir().unwrap();
    let ctx = test_context(dir.path(), &server.url("/api/v1/"));
    local_model(&ctx, "foo.safetensors", 123);
    local_model(&ctx, "foo_copy.safetensors", 123);

    let found = check_models_new_version(&ctx, &[ModelType::Lora]).await;

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].version_id, "456");
    assert_eq!(found[0].model_type, ModelType::Lora);
}

#[tokio::test]
async fn failed_lookups_still_wait_between_requests() {
    let server = MockServer::start_async().await;
    let lookup = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/models/45");
            then.status(401);
        })
        .await;

    let dir = tempdir().unwrap();
    let mut settings = test_settings(dir.path(), &server.url("/api/v1/"));
    settings.network.request_delay_ms = 100;
    let ctx = HelperContext::new(settings).unwrap();
    for name in ["a.safetensors", "b.safetensors", "c.safetensors"] {
        local_model(&ctx, name, 123);
    }

    let started = Instant::now();
    let found = check_models_new_version(&ctx, &[ModelType::Lora]).await;

    assert!(found.is_empty());
    lookup.assert_hits_async(3).await;
    assert!(started.elapsed() >= Duration::from_millis(300));
}
