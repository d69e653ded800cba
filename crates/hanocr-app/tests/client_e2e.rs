//! End-to-end specs for the API client and workflow against an in-process
//! mock of the ASCDC endpoints.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Form, Multipart, State};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::TcpListener;

use hanocr_app::naming::RenameMap;
use hanocr_app::services::{
    ApiError, AscdcClient, BookCache, BookSpec, CachedToken, ClientOptions, PollPolicy,
    ResultIdentifier, SaveOptions, TokenCache, UploadOptions, UploadUnit, now_epoch_secs,
    resolve_book,
};
use hanocr_app::workflow::{self, PacingPolicy, RunOptions};

#[derive(Default)]
struct MockState {
    login_calls: usize,
    create_calls: usize,
    upload_calls: usize,
    queue_calls: usize,
    query_calls: usize,
    image_calls: usize,
    /// Envelopes returned by `queue.php`, in order; the last entry repeats.
    queue_script: Vec<Value>,
}

type Shared = Arc<Mutex<MockState>>;

async fn auth(State(state): State<Shared>, Form(fields): Form<HashMap<String, String>>) -> Json<Value> {
    let mut state = state.lock().expect("mock state");
    state.login_calls += 1;
    assert!(fields.contains_key("account"));
    assert!(fields.contains_key("password"));
    Json(json!({"status": 200, "access_token": "tok-1"}))
}

async fn create_book(
    State(state): State<Shared>,
    Form(fields): Form<HashMap<String, String>>,
) -> Json<Value> {
    let mut state = state.lock().expect("mock state");
    state.create_calls += 1;
    assert_eq!(fields.get("token").map(String::as_str), Some("tok-1"));
    assert!(fields.contains_key("title"));
    assert!(fields.contains_key("author"));
    Json(json!({"status": 200, "bookid": 77}))
}

async fn upload(State(state): State<Shared>, mut multipart: Multipart) -> Json<Value> {
    let mut fields = HashMap::new();
    let mut saw_page = false;
    while let Some(field) = multipart.next_field().await.expect("multipart field") {
        let name = field.name().unwrap_or_default().to_string();
        if name == "page" {
            saw_page = true;
            let _ = field.bytes().await.expect("page bytes");
        } else {
            fields.insert(name, field.text().await.expect("field text"));
        }
    }
    assert!(saw_page, "upload must carry a `page` file part");
    assert_eq!(fields.get("token").map(String::as_str), Some("tok-1"));
    assert_eq!(fields.get("block_order").map(String::as_str), Some("TBRL"));
    assert!(fields.contains_key("bookid"));
    assert!(fields.contains_key("language"));

    let mut state = state.lock().expect("mock state");
    state.upload_calls += 1;
    Json(json!({"status": 200, "queue_id": 9001}))
}

async fn queue(State(state): State<Shared>, Form(fields): Form<HashMap<String, String>>) -> Json<Value> {
    assert!(fields.contains_key("queue_id"));
    let mut state = state.lock().expect("mock state");
    state.queue_calls += 1;
    let envelope = if state.queue_script.len() > 1 {
        state.queue_script.remove(0)
    } else if let Some(last) = state.queue_script.first() {
        last.clone()
    } else {
        json!({"status": 200, "guids": [{"guid": 555}]})
    };
    Json(envelope)
}

async fn query(State(state): State<Shared>, Form(fields): Form<HashMap<String, String>>) -> Json<Value> {
    assert!(fields.contains_key("guid"));
    let mut state = state.lock().expect("mock state");
    state.query_calls += 1;
    Json(json!({
        "status": 200,
        "result": [
            {"text": "天下", "block": 1},
            {"text": "太平", "block": 2}
        ]
    }))
}

async fn get_image(
    State(state): State<Shared>,
    Form(fields): Form<HashMap<String, String>>,
) -> Json<Value> {
    use base64::Engine;

    assert!(fields.contains_key("guid"));
    let mut state = state.lock().expect("mock state");
    state.image_calls += 1;
    let payload = base64::engine::general_purpose::STANDARD.encode(b"fake-jpeg-bytes");
    Json(json!({"status": 200, "result": payload}))
}

async fn spawn_mock(state: Shared) -> String {
    let app = Router::new()
        .route("/auth.php", post(auth))
        .route("/create_book.php", post(create_book))
        .route("/upload.php", post(upload))
        .route("/queue.php", post(queue))
        .route("/query.php", post(query))
        .route("/get_image.php", post(get_image))
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock");
    let addr = listener.local_addr().expect("mock addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve mock");
    });
    format!("http://{addr}/")
}

fn fast_poll(max_attempts: usize) -> PollPolicy {
    PollPolicy::builder()
        .interval(Duration::from_millis(20))
        .max_attempts(max_attempts)
        .build()
}

fn client_for(base_url: &str, cache_dir: &Path, poll: PollPolicy) -> AscdcClient {
    let options = ClientOptions::builder()
        .base_url(base_url)
        .account("tester")
        .password("secret")
        .poll(poll)
        .timeout(Duration::from_secs(5))
        .build();
    AscdcClient::new(options, TokenCache::new(cache_dir.join("token_cache.json")))
        .expect("client builds")
}

#[tokio::test]
async fn cached_token_is_reused_without_login() {
    let temp = TempDir::new().expect("temp dir");
    let state = Shared::default();
    let base = spawn_mock(state.clone()).await;

    let token_cache = TokenCache::new(temp.path().join("token_cache.json"));
    token_cache
        .store(&CachedToken {
            token: "cached-token".to_string(),
            expires_at: now_epoch_secs() + 600,
        })
        .expect("seed token cache");

    let mut client = client_for(&base, temp.path(), fast_poll(5));
    let token = client.ensure_token().await.expect("token");

    assert_eq!(token, "cached-token");
    assert_eq!(state.lock().expect("state").login_calls, 0);
}

#[tokio::test]
async fn expired_token_triggers_fresh_login() {
    let temp = TempDir::new().expect("temp dir");
    let state = Shared::default();
    let base = spawn_mock(state.clone()).await;

    let token_cache = TokenCache::new(temp.path().join("token_cache.json"));
    token_cache
        .store(&CachedToken {
            token: "stale-token".to_string(),
            expires_at: now_epoch_secs().saturating_sub(10),
        })
        .expect("seed token cache");

    let mut client = client_for(&base, temp.path(), fast_poll(5));
    let token = client.ensure_token().await.expect("token");

    assert_eq!(token, "tok-1");
    assert_eq!(state.lock().expect("state").login_calls, 1);

    let refreshed = token_cache
        .load()
        .expect("reload cache")
        .expect("token present");
    assert_eq!(refreshed.token, "tok-1");
    assert!(refreshed.is_valid_at(now_epoch_secs()));
}

#[tokio::test]
async fn book_resolution_is_idempotent_across_calls() {
    let temp = TempDir::new().expect("temp dir");
    let state = Shared::default();
    let base = spawn_mock(state.clone()).await;

    let mut client = client_for(&base, temp.path(), fast_poll(5));
    client.ensure_token().await.expect("token");
    let cache = BookCache::new(temp.path().join("book_cache.json"));
    let spec = BookSpec::builder()
        .title("Test Title")
        .author("Test Author")
        .build();

    let first = resolve_book(&client, &cache, &spec).await.expect("first");
    let second = resolve_book(&client, &cache, &spec).await.expect("second");

    assert_eq!(first.id, 77);
    assert_eq!(first.id, second.id);
    assert_eq!(state.lock().expect("state").create_calls, 1);
}

#[tokio::test]
async fn explicit_book_id_is_backfilled_into_cache() {
    let temp = TempDir::new().expect("temp dir");
    let state = Shared::default();
    let base = spawn_mock(state.clone()).await;

    let mut client = client_for(&base, temp.path(), fast_poll(5));
    client.ensure_token().await.expect("token");
    let cache = BookCache::new(temp.path().join("book_cache.json"));
    let spec = BookSpec::builder()
        .title("Known")
        .author("Author")
        .id(1234)
        .build();

    let book = resolve_book(&client, &cache, &spec).await.expect("resolve");

    assert_eq!(book.id, 1234);
    assert_eq!(state.lock().expect("state").create_calls, 0);
    assert_eq!(
        cache.get("Known::Author").expect("cache read"),
        Some(1234)
    );
}

#[tokio::test]
async fn upload_validation_rejects_before_any_request() {
    let temp = TempDir::new().expect("temp dir");
    let state = Shared::default();
    let base = spawn_mock(state.clone()).await;

    let bad_name = temp.path().join("bad name!.png");
    std::fs::write(&bad_name, b"png-bytes").expect("write file");
    let bad_mime = temp.path().join("ok.exe");
    std::fs::write(&bad_mime, b"exe-bytes").expect("write file");

    let mut client = client_for(&base, temp.path(), fast_poll(5));
    client.ensure_token().await.expect("token");

    let err = client
        .upload_file(&bad_name, 77, &UploadOptions::default())
        .await
        .expect_err("illegal name");
    assert!(matches!(err, ApiError::IllegalFilename { .. }));

    let err = client
        .upload_file(&bad_mime, 77, &UploadOptions::default())
        .await
        .expect_err("disallowed mime");
    assert!(matches!(err, ApiError::UnsupportedMime { .. }));

    assert_eq!(state.lock().expect("state").upload_calls, 0);
}

#[tokio::test]
async fn queue_poll_resolves_after_processing_rounds() {
    let temp = TempDir::new().expect("temp dir");
    let state = Shared::default();
    state.lock().expect("state").queue_script = vec![
        json!({"status": 103}),
        json!({"status": 103}),
        json!({"status": 200, "guids": [{"guid": 555}]}),
    ];
    let base = spawn_mock(state.clone()).await;

    let page = temp.path().join("page_01.png");
    std::fs::write(&page, b"png-bytes").expect("write file");

    let mut client = client_for(&base, temp.path(), fast_poll(10));
    client.ensure_token().await.expect("token");

    let mut unit = UploadUnit::new(page, 77, UploadOptions::default());
    let queue_id = unit.upload(&client).await.expect("upload");
    assert_eq!(queue_id, 9001);

    let identifiers = unit.wait_for_ocr(&client).await.expect("ocr finishes");
    assert_eq!(identifiers.len(), 1);
    assert_eq!(identifiers[0].guid, 555);
    assert_eq!(identifiers[0].original.as_deref(), Some("page_01"));
    assert_eq!(identifiers[0].index, Some(1));

    assert_eq!(state.lock().expect("state").queue_calls, 3);
}

#[tokio::test]
async fn queue_poll_times_out_when_never_finishing() {
    let temp = TempDir::new().expect("temp dir");
    let state = Shared::default();
    state.lock().expect("state").queue_script = vec![json!({"status": 103})];
    let base = spawn_mock(state.clone()).await;

    let mut client = client_for(&base, temp.path(), fast_poll(3));
    client.ensure_token().await.expect("token");

    let err = client.poll_queue(42).await.expect_err("times out");
    assert!(matches!(
        err,
        ApiError::PollTimeout {
            queue_id: 42,
            attempts: 3,
            ..
        }
    ));
    assert_eq!(state.lock().expect("state").queue_calls, 3);
}

#[tokio::test]
async fn queue_failure_status_carries_server_message() {
    let temp = TempDir::new().expect("temp dir");
    let state = Shared::default();
    state.lock().expect("state").queue_script =
        vec![json!({"status": 500, "message": "broken batch"})];
    let base = spawn_mock(state.clone()).await;

    let mut client = client_for(&base, temp.path(), fast_poll(5));
    client.ensure_token().await.expect("token");

    let err = client.poll_queue(42).await.expect_err("fails fast");
    match err {
        ApiError::Api {
            endpoint, status, message,
        } => {
            assert_eq!(endpoint, "queue");
            assert_eq!(status, 500);
            assert_eq!(message, "broken batch");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(state.lock().expect("state").queue_calls, 1);
}

#[tokio::test]
async fn saved_artifacts_land_under_unique_names() {
    let temp = TempDir::new().expect("temp dir");
    let state = Shared::default();
    let base = spawn_mock(state.clone()).await;

    let mut client = client_for(&base, temp.path(), fast_poll(5));
    client.ensure_token().await.expect("token");

    let downloads = temp.path().join("downloads");
    let save = SaveOptions::builder()
        .dir(downloads.clone())
        .template("{original}_guid{guid}")
        .build();

    let identifier = ResultIdentifier::with_origin(555, "page_01".to_string(), 1);
    let saved = identifier
        .save_results(&client, &save)
        .await
        .expect("save results");

    assert_eq!(saved.lines, 2);
    assert_eq!(saved.text_path, downloads.join("page_01_guid555.txt"));
    let text = std::fs::read_to_string(&saved.text_path).expect("read txt");
    assert_eq!(text, "天下\n太平\n");

    let raw = std::fs::read_to_string(&saved.json_path).expect("read json");
    let parsed: Vec<Value> = serde_json::from_str(&raw).expect("json parses");
    assert_eq!(parsed.len(), 2);
    assert_eq!(parsed[0]["text"], "天下");
    assert_eq!(parsed[0]["block"], 1);

    // A second save must not overwrite the first artifacts.
    let again = identifier
        .save_results(&client, &save)
        .await
        .expect("save again");
    assert_eq!(again.text_path, downloads.join("page_01_guid555_1.txt"));

    let image_path = identifier
        .save_image(&client, &save)
        .await
        .expect("save image");
    assert_eq!(image_path, downloads.join("page_01_guid555.jpg"));
    assert_eq!(
        std::fs::read(&image_path).expect("read image"),
        b"fake-jpeg-bytes"
    );
}

#[tokio::test]
async fn rename_map_overrides_template_when_saving() {
    let temp = TempDir::new().expect("temp dir");
    let state = Shared::default();
    let base = spawn_mock(state.clone()).await;

    let mut client = client_for(&base, temp.path(), fast_poll(5));
    client.ensure_token().await.expect("token");

    let save = SaveOptions::builder()
        .dir(temp.path().join("downloads"))
        .template("{original}_guid{guid}")
        .rename_map(RenameMap::from_entries([("555", "chapter one")]))
        .build();

    let identifier = ResultIdentifier::with_origin(555, "page_01".to_string(), 1);
    let saved = identifier
        .save_results(&client, &save)
        .await
        .expect("save results");
    assert!(saved.text_path.ends_with("chapter one.txt"));
}

#[tokio::test]
async fn full_workflow_uploads_polls_and_downloads() {
    let temp = TempDir::new().expect("temp dir");
    let state = Shared::default();
    state.lock().expect("state").queue_script = vec![
        json!({"status": 103}),
        json!({"status": 200, "guids": [{"guid": 555}, {"guid": 556}]}),
    ];
    let base = spawn_mock(state.clone()).await;

    let page = temp.path().join("scroll.jpg");
    std::fs::write(&page, b"jpeg-bytes").expect("write file");

    let mut client = client_for(&base, temp.path(), fast_poll(10));
    let book_cache = BookCache::new(temp.path().join("book_cache.json"));
    let downloads = temp.path().join("downloads");

    let pacing = PacingPolicy::builder()
        .jitter_min(Duration::from_millis(1))
        .jitter_max(Duration::from_millis(2))
        .settle(Duration::from_millis(1))
        .bulk_settle(Duration::from_millis(1))
        .build();
    let options = RunOptions::builder()
        .files(vec![page])
        .guids(vec![900])
        .book(
            BookSpec::builder()
                .title("Test Title")
                .author("Test Author")
                .build(),
        )
        .save(SaveOptions::builder().dir(downloads.clone()).build())
        .download_images(true)
        .pacing(pacing)
        .build();

    let summary = workflow::run(&mut client, &book_cache, options)
        .await
        .expect("workflow");

    assert_eq!(summary.uploaded, 1);
    assert_eq!(summary.guids, 3);
    assert_eq!(summary.saved_results, 3);
    assert_eq!(summary.saved_images, 3);

    let state = state.lock().expect("state");
    assert_eq!(state.login_calls, 1);
    assert_eq!(state.create_calls, 1);
    assert_eq!(state.upload_calls, 1);
    assert_eq!(state.queue_calls, 2);
    assert_eq!(state.query_calls, 3);
    assert_eq!(state.image_calls, 3);

    // Uploaded pages carry the originating stem; direct guids fall back to
    // their guid-derived name.
    assert!(downloads.join("scroll_555.txt").is_file());
    assert!(downloads.join("scroll_556.txt").is_file());
    assert!(downloads.join("guid_900_900.txt").is_file());
    assert!(downloads.join("scroll_555.jpg").is_file());
}
