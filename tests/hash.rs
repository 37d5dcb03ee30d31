mod common;

use std::fs;
use std::sync::Arc;

use futures::StreamExt;
use tempfile::tempdir;

use civhelp::hash::{cache_key, HashCache, HashEngine, HashEvent, HashMode, SECTION_HASHES};
use civhelp::Error;

use common::{safetensors_bytes, HELLO_WORLD_SHA256};

#[tokio::test]
async fn full_digest_matches_known_value() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("hello.bin");
    fs::write(&path, b"hello world").unwrap();

    let engine = HashEngine::with_cache(true, Arc::new(HashCache::in_memory()));
    let digest = engine.hash_file(&path, None, HashMode::Full).await.unwrap();

    assert_eq!(digest, HELLO_WORLD_SHA256);
}

#[tokio::test]
async fn cache_hit_skips_reading_the_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("model.safetensors");
    fs::write(&path, b"hello world").unwrap();
    let cache_file = dir.path().join("cache").join("hashes.json");

    let engine = HashEngine::with_cache(true, Arc::new(HashCache::load(&cache_file)));
    let key = cache_key("lora", &path);
    assert_eq!(key, "lora/model");

    let first: Vec<_> = engine
        .hash(path.clone(), Some(key.clone()), HashMode::Full)
        .collect()
        .await;
    assert!(first
        .iter()
        .any(|e| matches!(e, Ok(HashEvent::Progress { .. }))));
    assert!(cache_file.is_file());

    // A fresh engine over the persisted cache answers without progress
    let reloaded = HashEngine::with_cache(true, Arc::new(HashCache::load(&cache_file)));
    let second: Vec<_> = reloaded
        .hash(path.clone(), Some(key.clone()), HashMode::Full)
        .collect()
        .await;
    assert_eq!(second.len(), 1);
    assert!(matches!(&second[0], Ok(HashEvent::Digest(d)) if d == HELLO_WORLD_SHA256));

    let stored: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&cache_file).unwrap()).unwrap();
    assert_eq!(stored[SECTION_HASHES][&key]["sha256"], HELLO_WORLD_SHA256);
}

#[tokio::test]
async fn offset_mode_hashes_only_tensor_data() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("net.safetensors");
    fs::write(&path, safetensors_bytes(r#"{"__metadata__":{}}"#, b"hello world")).unwrap();

    let engine = HashEngine::with_cache(true, Arc::new(HashCache::in_memory()));
    let offset = engine
        .hash_file(&path, None, HashMode::SafetensorsOffset)
        .await
        .unwrap();
    let full = engine.hash_file(&path, None, HashMode::Full).await.unwrap();

    assert_eq!(offset, HELLO_WORLD_SHA256);
    assert_ne!(full, HELLO_WORLD_SHA256);
}

#[tokio::test]
async fn offset_mode_rejects_oversized_header() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.safetensors");
    let mut bytes = 1_000u64.to_le_bytes().to_vec();
    bytes.extend_from_slice(b"{}");
    fs::write(&path, bytes).unwrap();

    let engine = HashEngine::with_cache(true, Arc::new(HashCache::in_memory()));
    let err = engine
        .hash_file(&path, None, HashMode::SafetensorsOffset)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidFormat(_)));
}

#[tokio::test]
async fn disabled_engine_reports_capability_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("hello.bin");
    fs::write(&path, b"hello world").unwrap();

    let engine = HashEngine::with_cache(false, Arc::new(HashCache::in_memory()));
    let err = engine.hash_file(&path, None, HashMode::Full).await.unwrap_err();

    assert!(matches!(err, Error::HashingDisabled));
}
