mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use clipforge_client::http::{ClientError, HttpTransport, Method, RequestBody, TransportError};
use clipforge_client::upload::{AssetUploader, LocalAsset, UPLOAD_PATH};
use clipforge_core::config::ClientConfig;
use clipforge_core::error::CoreError;
use common::*;
use serde_json::json;

const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";
const JPEG_MAGIC: &[u8] = b"\xFF\xD8\xFF\xE0";

fn png(len: usize) -> Vec<u8> {
    let mut bytes = PNG_MAGIC.to_vec();
    bytes.resize(len.max(PNG_MAGIC.len()), 0);
    bytes
}

fn uploader(transport: &Arc<ScriptedTransport>, max_upload_bytes: u64) -> AssetUploader {
    let config = ClientConfig {
        max_upload_bytes,
        ..test_config(3)
    };
    AssetUploader::new(Arc::clone(transport) as Arc<dyn HttpTransport>, &config)
}

fn uploaded(url: &str) -> clipforge_client::http::Outcome<serde_json::Value> {
    Ok(json!({ "success": true, "image_url": url, "message": "图片上传成功" }))
}

#[tokio::test]
async fn oversized_asset_fails_without_network_call() {
    let transport = ScriptedTransport::new(vec![uploaded("https://cdn/a.png")]);
    let uploader = uploader(&transport, 1024);

    let result = uploader.upload(LocalAsset::new("big.png", png(1025))).await;

    assert_matches!(result, Err(ClientError::Validation(CoreError::Validation(_))));
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn asset_at_exact_limit_is_sent() {
    let transport = ScriptedTransport::new(vec![uploaded("https://cdn/a.png")]);
    let uploader = uploader(&transport, 1024);

    let result = uploader.upload(LocalAsset::new("edge.png", png(1024))).await;

    assert_eq!(result.unwrap(), "https://cdn/a.png");
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn non_image_is_rejected_locally() {
    let transport = ScriptedTransport::new(vec![uploaded("https://cdn/a.png")]);
    let uploader = uploader(&transport, 1024);

    let result = uploader
        .upload(LocalAsset::new("notes.txt", b"just some text".to_vec()))
        .await;

    assert_matches!(result, Err(ClientError::Validation(_)));
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn png_is_sent_as_single_multipart_file_field() {
    let transport = ScriptedTransport::new(vec![uploaded("https://cdn/product.png")]);
    let uploader = uploader(&transport, 5 * 1024 * 1024);

    let url = uploader
        .upload(LocalAsset::new("product.png", png(64)))
        .await
        .unwrap();

    assert_eq!(url, "https://cdn/product.png");
    let calls = transport.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].method, Method::Post);
    assert_eq!(calls[0].path, UPLOAD_PATH);
    assert_eq!(calls[0].timeout, test_config(3).upload_timeout());
    assert_matches!(
        &calls[0].body,
        RequestBody::File(part)
            if part.field == "file"
                && part.file_name == "product.png"
                && part.mime == "image/png"
                && part.bytes.len() == 64
    );
}

#[tokio::test]
async fn jpeg_gets_jpeg_mime_type() {
    let transport = ScriptedTransport::new(vec![]);
    let uploader = uploader(&transport, 1024);

    let mime = uploader
        .check(&LocalAsset::new("photo.jpg", JPEG_MAGIC.to_vec()))
        .unwrap();

    assert_eq!(mime, "image/jpeg");
}

#[tokio::test]
async fn response_without_image_url_is_malformed() {
    let transport = ScriptedTransport::new(vec![Ok(json!({ "success": true, "message": "ok" }))]);
    let uploader = uploader(&transport, 1024);

    let result = uploader.upload(LocalAsset::new("a.png", png(16))).await;

    assert_matches!(
        result,
        Err(ClientError::Transport(TransportError::MalformedBody(_)))
    );
}

#[tokio::test]
async fn backend_rejection_is_returned_unchanged() {
    let transport = ScriptedTransport::new(vec![
        app_error(400, "只支持JPG和PNG格式的图片"),
        uploaded("https://cdn/a.png"),
    ]);
    let uploader = uploader(&transport, 1024);

    let result = uploader.upload(LocalAsset::new("a.png", png(16))).await;

    assert_matches!(result, Err(ClientError::App { code: 400, .. }));
    assert_eq!(transport.call_count(), 1, "uploads are never retried");
}

#[tokio::test]
async fn asset_is_read_from_disk_with_its_file_name() {
    let path = std::env::temp_dir().join(format!("clipforge-upload-{}.png", std::process::id()));
    tokio::fs::write(&path, png(32)).await.unwrap();

    let asset = LocalAsset::from_path(&path).await.unwrap();
    tokio::fs::remove_file(&path).await.unwrap();

    assert_eq!(asset.len(), 32);
    assert!(asset.file_name.starts_with("clipforge-upload-"));
}

#[tokio::test]
async fn missing_file_is_a_validation_error() {
    let result = LocalAsset::from_path("/definitely/not/here.png").await;
    assert_matches!(result, Err(ClientError::Validation(_)));
}
