mod common;

use std::fs;

use futures::StreamExt;
use httpmock::prelude::*;
use serde_json::{json, Value};
use tempfile::tempdir;

use civhelp::catalog::{
    download_model_version, fetch_model_info, host_path, info_path, metadata_needed,
    preview_path, process_model_info, scan_models, ModelType, ScanEvent, VersionDownload,
    PROVENANCE_KEY,
};
use civhelp::download::{DownloadEvent, DuplicatePolicy};
use civhelp::Error;

use common::{test_context, write_model, HELLO_WORLD_SHA256};

fn read_json(path: &std::path::Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

fn parent_model() -> Value {
    json!({
        "id": 45,
        "name": "Foo",
        "type": "LORA",
        "description": "<p>About Foo</p>",
        "tags": ["character"],
        "creator": { "username": "someone" },
        "modelVersions": [{ "id": 99 }]
    })
}

#[tokio::test]
async fn scan_attaches_remote_metadata_and_preview() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path(format!("/api/v1/model-versions/by-hash/{}", HELLO_WORLD_SHA256));
            then.status(200).json_body(json!({
                "id": 123,
                "modelId": 45,
                "name": "v1",
                "baseModel": "SD 1.5",
                "description": "<p>Version notes</p>",
                "trainedWords": ["foo", "bar"],
                "files": [{
                    "name": "foo.safetensors",
                    "type": "Model",
                    "hashes": { "SHA256": HELLO_WORLD_SHA256.to_uppercase() }
                }],
                "images": [
                    { "url": server.url("/img/hot.png"), "type": "image", "nsfwLevel": 16 },
                    { "url": server.url("/img/safe.png"), "type": "image", "nsfwLevel": 1 }
                ]
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/models/45");
            then.status(200).json_body(parent_model());
        })
        .await;
    let safe_image = server
        .mock_async(|when, then| {
            when.method(GET).path("/img/safe.png");
            then.status(200).body("png");
        })
        .await;
    let hot_image = server
        .mock_async(|when, then| {
            when.method(GET).path("/img/hot.png");
            then.status(200).body("png");
        })
        .await;

    let dir = tempdir().unwrap();
    let ctx = test_context(dir.path(), &server.url("/api/v1/"));
    let model = write_model(&ctx, ModelType::Lora, "foo.safetensors", b"hello world");

    let events: Vec<ScanEvent> = scan_models(&ctx, vec![ModelType::Lora], false)
        .collect()
        .await;

    match events.last() {
        Some(ScanEvent::Finished(summary)) => {
            assert_eq!(summary.scanned, 1);
            assert_eq!(summary.message, "Done. Successfully scanned 1 of 1 models.");
        }
        other => panic!("unexpected final event: {:?}", other),
    }

    let info = read_json(&info_path(&model));
    assert_eq!(info["id"], 123);
    assert_eq!(info["modelId"], 45);
    assert_eq!(info["model"]["tags"], json!(["character"]));
    assert_eq!(info["creator"]["username"], "someone");
    assert_eq!(info["extensions"][PROVENANCE_KEY]["skeleton_file"], false);
    assert!(info["model"]["description"]
        .as_str()
        .unwrap()
        .starts_with("<!--"));

    let host = read_json(&host_path(&model));
    assert_eq!(host["activation text"], "foo, bar");
    assert_eq!(host["sd version"], "SD1");
    assert_eq!(host["preferred weight"], 0);

    assert!(preview_path(&model).is_file());
    safe_image.assert_hits_async(1).await;
    hot_image.assert_hits_async(0).await;

    // Nothing is needed on a second pass
    assert!(!metadata_needed(&model, false, true));
}

#[tokio::test]
async fn unknown_hash_gets_skeleton_metadata() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path_includes("/api/v1/model-versions/by-hash/");
            then.status(404);
        })
        .await;

    let dir = tempdir().unwrap();
    let ctx = test_context(dir.path(), &server.url("/api/v1/"));
    let model = write_model(&ctx, ModelType::Checkpoint, "local.ckpt", b"hello world");

    let events: Vec<ScanEvent> = scan_models(&ctx, vec![ModelType::Checkpoint], false)
        .collect()
        .await;
    assert!(matches!(events.last(), Some(ScanEvent::Finished(s)) if s.scanned == 1));

    let info = read_json(&info_path(&model));
    assert_eq!(info["id"], "");
    assert_eq!(info["model"]["name"], "local.ckpt");
    assert_eq!(info["files"][0]["hashes"]["SHA256"], HELLO_WORLD_SHA256.to_uppercase());
    assert_eq!(info["extensions"][PROVENANCE_KEY]["skeleton_file"], true);
}

#[tokio::test]
async fn empty_type_list_finishes_immediately() {
    let dir = tempdir().unwrap();
    let ctx = test_context(dir.path(), "http://127.0.0.1:9/api/v1/");

    let events: Vec<ScanEvent> = scan_models(&ctx, Vec::new(), false).collect().await;

    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], ScanEvent::Finished(s) if s.message.contains("can not scan")));
}

#[tokio::test]
async fn refetch_guards_against_a_different_version() {
    let dir = tempdir().unwrap();
    let ctx = test_context(dir.path(), "http://127.0.0.1:9/api/v1/");
    let model = write_model(&ctx, ModelType::Lora, "foo.safetensors", b"x");
    let original = json!({ "id": 111, "modelId": 45, "description": "kept" });
    fs::write(info_path(&model), original.to_string()).unwrap();

    let incoming = json!({ "id": 222, "modelId": 45, "description": "new" });
    let err = process_model_info(&ctx, &model, incoming.clone(), ModelType::Lora, true)
        .await
        .unwrap_err();

    assert!(matches!(
        &err,
        Error::VersionMismatch { new_id, old_id } if new_id == "222" && old_id == "111"
    ));
    assert_eq!(read_json(&info_path(&model)), original);

    let outcome = process_model_info(&ctx, &model, incoming, ModelType::Lora, false)
        .await
        .unwrap();
    assert!(outcome.info_written);
    assert_eq!(read_json(&info_path(&model))["id"], 222);
}

#[tokio::test]
async fn host_sidecar_is_left_alone_without_refetch() {
    let dir = tempdir().unwrap();
    let ctx = test_context(dir.path(), "http://127.0.0.1:9/api/v1/");
    let model = write_model(&ctx, ModelType::Lora, "foo.safetensors", b"x");
    fs::write(host_path(&model), r#"{"activation text": "hand edited"}"#).unwrap();

    let incoming = json!({ "id": 1, "modelId": 2, "trainedWords": ["remote"] });
    let outcome = process_model_info(&ctx, &model, incoming, ModelType::Lora, false)
        .await
        .unwrap();

    assert!(outcome.info_written);
    assert!(!outcome.host_written);
    assert_eq!(read_json(&host_path(&model))["activation text"], "hand edited");
}

#[tokio::test]
async fn downloads_a_version_and_refuses_it_twice() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/model-versions/99");
            then.status(200).json_body(json!({
                "id": 99,
                "modelId": 45,
                "name": "v2",
                "baseModel": "SDXL 1.0",
                "files": [
                    { "name": "remote.safetensors", "type": "Model", "downloadUrl": server.url("/dl/model") },
                    { "name": "remote.yaml", "type": "Config", "downloadUrl": server.url("/dl/config") }
                ],
                "images": []
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/models/45");
            then.status(200).json_body(parent_model());
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/dl/model");
            then.status(200).body("weights");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/dl/config");
            then.status(200).body("config");
        })
        .await;

    let dir = tempdir().unwrap();
    let ctx = test_context(dir.path(), &server.url("/api/v1/"));
    let request = VersionDownload {
        model_type: ModelType::Lora,
        subfolder: String::new(),
        version_id: "99".to_string(),
        filename: Some("mine".to_string()),
        file_types: civhelp::civitai::FILE_TYPES.iter().map(|t| t.to_string()).collect(),
        download_all: false,
        duplicate: DuplicatePolicy::Skip,
        preferred_preview: None,
    };

    let events: Vec<DownloadEvent> = download_model_version(&ctx, request.clone()).collect().await;
    let folder = ctx.folders.folder(ModelType::Lora).to_path_buf();
    let model = folder.join("mine.safetensors");

    match events.last() {
        Some(DownloadEvent::Finished(outcome)) => {
            assert!(outcome.success, "{}", outcome.message);
            assert_eq!(outcome.path.as_deref(), Some(model.as_path()));
        }
        other => panic!("unexpected final event: {:?}", other),
    }
    assert_eq!(fs::read(&model).unwrap(), b"weights");
    assert_eq!(fs::read(folder.join("mine.yaml")).unwrap(), b"config");
    assert_eq!(read_json(&info_path(&model))["id"], 99);

    let again: Vec<DownloadEvent> = download_model_version(&ctx, request).collect().await;
    match again.last() {
        Some(DownloadEvent::Finished(outcome)) => {
            assert!(!outcome.success);
            assert!(outcome.message.contains("already exists"));
        }
        other => panic!("unexpected final event: {:?}", other),
    }
}

#[tokio::test]
async fn fetches_info_for_a_named_model() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/models/45");
            then.status(200).json_body(parent_model());
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/model-versions/99");
            then.status(200).json_body(json!({
                "id": 99,
                "modelId": 45,
                "name": "v2",
                "trainedWords": ["1girl, solo", "smile"]
            }));
        })
        .await;

    let dir = tempdir().unwrap();
    let ctx = test_context(dir.path(), &server.url("/api/v1/"));
    let model = write_model(&ctx, ModelType::Lora, "named.safetensors", b"x");

    let (path, outcome) = fetch_model_info(
        &ctx,
        ModelType::Lora,
        "named.safetensors",
        "https://civitai.com/models/45/foo?modelVersionId=1",
    )
    .await
    .unwrap();

    assert_eq!(path, model);
    assert!(outcome.info_written);
    assert_eq!(read_json(&info_path(&model))["id"], 99);
    assert_eq!(
        read_json(&host_path(&model))["activation text"],
        "1girl, solo || smile"
    );
}
