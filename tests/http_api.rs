use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use chunk_share::{
    gateway::{CachedGateway, MemoryGateway},
    routes,
    services::{FileService, upload::UploadPolicy},
};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

fn app(share_on_upload: bool) -> Router {
    let policy = UploadPolicy {
        chunk_size: 16,
        ..UploadPolicy::default()
    };
    let service = FileService::new(
        Arc::new(CachedGateway::new(Arc::new(MemoryGateway::new()))),
        policy,
        "http://localhost:3000",
        share_on_upload,
    );
    routes::routes::routes().with_state(service)
}

fn png_bytes(len: usize) -> Vec<u8> {
    let mut data = PNG_MAGIC.to_vec();
    data.extend((0..len - PNG_MAGIC.len()).map(|i| i as u8));
    data
}

fn request(method: Method, uri: &str, principal: Option<&str>, body: Body) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(principal) = principal {
        builder = builder.header("x-principal", principal);
    }
    builder.body(body).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn upload(app: &Router, principal: &str, name: &str, data: Vec<u8>) -> Value {
    let req = Request::builder()
        .method(Method::POST)
        .uri(format!("/api/uploads?filename={}", name))
        .header("x-principal", principal)
        .header(header::CONTENT_TYPE, "image/png")
        .body(Body::from(data))
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    json_body(response).await
}

#[tokio::test]
async fn healthz_is_ok() {
    let response = app(true)
        .oneshot(request(Method::GET, "/healthz", None, Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app(true)
        .oneshot(request(Method::GET, "/readyz", None, Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn shared_upload_previews_for_anyone() {
    let app = app(true);
    let data = png_bytes(40);
    let receipt = upload(&app, "alice", "cat.png", data.clone()).await;
    assert_eq!(receipt["chunk_count"], 3);
    assert_eq!(receipt["shared"], true);
    let id = receipt["id"].as_str().unwrap().to_string();
    assert_eq!(
        receipt["share_url"].as_str().unwrap(),
        format!("http://localhost:3000/share/{}", id)
    );

    let response = app
        .clone()
        .oneshot(request(Method::GET, &format!("/share/{}", id), None, Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    assert_eq!(response.headers()["x-metadata-source"], "reconstructed");
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body.as_ref(), data.as_slice());

    let response = app
        .clone()
        .oneshot(request(
            Method::GET,
            &format!("/api/files/{}", id),
            Some("bob"),
            Body::empty(),
        ))
        .await
        .unwrap();
    let meta = json_body(response).await;
    assert_eq!(meta["source"], "reconstructed");
    assert_eq!(meta["metadata"]["filename"], "cat.png");
    assert_eq!(meta["metadata"]["size"], 40);
}

#[tokio::test]
async fn unshared_upload_is_forbidden_to_others() {
    let app = app(false);
    let receipt = upload(&app, "alice", "private.png", png_bytes(20)).await;
    let id = receipt["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(request(
            Method::GET,
            &format!("/api/files/{}/download", id),
            Some("bob"),
            Body::empty(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .clone()
        .oneshot(request(
            Method::GET,
            "/share/nobody.png_1",
            Some("bob"),
            Body::empty(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // The owner still downloads it, and the download is counted.
    let response = app
        .clone()
        .oneshot(request(
            Method::GET,
            &format!("/api/files/{}/download", id),
            Some("alice"),
            Body::empty(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-metadata-source"], "authoritative");
    assert!(
        response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .starts_with("attachment;")
    );

    let response = app
        .clone()
        .oneshot(request(Method::GET, "/api/uploads", Some("alice"), Body::empty()))
        .await
        .unwrap();
    let list = json_body(response).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["download_count"], 1);
    assert_eq!(list[0]["is_shared"], false);
}

#[tokio::test]
async fn anonymous_callers_cannot_mutate() {
    let app = app(true);
    let response = app
        .clone()
        .oneshot(request(Method::GET, "/api/uploads", None, Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/api/uploads?filename=a.png",
            None,
            Body::from(png_bytes(10)),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // The chunk protocol answers anonymous callers the same way.
    let declare = Request::builder()
        .method(Method::POST)
        .uri("/api/files")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            r#"{"filename":"a.png","content_type":"image/png","size":1,"chunk_count":1}"#,
        ))
        .unwrap();
    let response = app.clone().oneshot(declare).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/api/files/a.png_1/finalize",
            None,
            Body::empty(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn stats_count_all_and_own_uploads() {
    let app = app(true);
    upload(&app, "alice", "one.png", png_bytes(20)).await;
    upload(&app, "alice", "two.png", png_bytes(20)).await;
    upload(&app, "bob", "three.png", png_bytes(20)).await;

    let response = app
        .clone()
        .oneshot(request(Method::GET, "/api/stats", Some("alice"), Body::empty()))
        .await
        .unwrap();
    let stats = json_body(response).await;
    assert_eq!(stats["total_uploads"], 3);
    assert_eq!(stats["your_uploads"], 2);

    let response = app
        .clone()
        .oneshot(request(Method::GET, "/api/stats", None, Body::empty()))
        .await
        .unwrap();
    let stats = json_body(response).await;
    assert_eq!(stats["total_uploads"], 3);
    assert!(stats.get("your_uploads").is_none());
}

#[tokio::test]
async fn disallowed_type_is_a_bad_request() {
    let app = app(true);
    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/uploads?filename=notes.txt")
        .header("x-principal", "alice")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("hello"))
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["status"], 400);
}

#[tokio::test]
async fn chunk_protocol_over_http() {
    let app = app(true);
    let declare = Request::builder()
        .method(Method::POST)
        .uri("/api/files")
        .header("x-principal", "alice")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            r#"{"filename":"clip.mp4","content_type":"video/mp4","size":6,"chunk_count":2}"#,
        ))
        .unwrap();
    let response = app.clone().oneshot(declare).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let id = json_body(response).await["id"].as_str().unwrap().to_string();

    // Only the first chunk: the object is incomplete.
    let write = |index: u32, body: &'static [u8]| {
        Request::builder()
            .method(Method::PUT)
            .uri(format!("/api/files/{}/chunks/{}", id, index))
            .header("x-principal", "alice")
            .header("x-total-chunks", "2")
            .body(Body::from(body))
            .unwrap()
    };
    let response = app.clone().oneshot(write(0, b"abc")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .clone()
        .oneshot(request(
            Method::GET,
            &format!("/api/files/{}/download", id),
            Some("alice"),
            Body::empty(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app.clone().oneshot(write(1, b"def")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .clone()
        .oneshot(request(
            Method::GET,
            &format!("/api/files/{}/chunk-info", id),
            None,
            Body::empty(),
        ))
        .await
        .unwrap();
    let info = json_body(response).await;
    assert_eq!(info["size"], 6);
    assert_eq!(info["chunk_count"], 2);

    let response = app
        .clone()
        .oneshot(request(
            Method::GET,
            &format!("/api/files/{}/chunks", id),
            Some("alice"),
            Body::empty(),
        ))
        .await
        .unwrap();
    let chunks = json_body(response).await;
    assert_eq!(chunks["chunks"][0]["data"], "YWJj");
    assert_eq!(chunks["chunks"][1]["data"], "ZGVm");

    let missing_header = Request::builder()
        .method(Method::PUT)
        .uri(format!("/api/files/{}/chunks/0", id))
        .header("x-principal", "alice")
        .body(Body::from("abc"))
        .unwrap();
    let response = app.clone().oneshot(missing_header).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
