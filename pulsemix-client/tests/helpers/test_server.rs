//! In-process stand-in for the mixing service
//!
//! Serves `/`, `/tracks`, `/mix-all` and `/adjust-bpm` on an ephemeral port
//! and records every POST body. Multipart bodies are kept raw; tests look for
//! the field names they expect.

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

/// How `/mix-all` answers
#[derive(Debug, Clone)]
pub enum MixBehavior {
    /// NDJSON body sent as the given chunks
    Stream(Vec<String>),
    /// The given chunks, then a broken connection
    Truncated(Vec<String>),
    /// Bare status code
    Status(u16),
    /// Legacy zip archive
    Archive(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl RecordedRequest {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug)]
struct ServerState {
    health_status: u16,
    tracks: serde_json::Value,
    mix: MixBehavior,
    adjust: Result<Vec<u8>, u16>,
    requests: Vec<RecordedRequest>,
}

type Shared = Arc<Mutex<ServerState>>;

pub struct TestServer {
    pub base_url: String,
    state: Shared,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start(mix: MixBehavior) -> Self {
        let state = Arc::new(Mutex::new(ServerState {
            health_status: 200,
            tracks: serde_json::json!({ "tracks": ["calm.mp3", "Night Drive"] }),
            mix,
            adjust: Err(404),
            requests: Vec::new(),
        }));

        let app = Router::new()
            .route("/", get(health))
            .route("/tracks", get(tracks))
            .route("/mix-all", post(mix_all))
            .route("/adjust-bpm", post(adjust_bpm))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
            handle,
        }
    }

    pub fn set_health_status(&self, status: u16) {
        self.state.lock().unwrap().health_status = status;
    }

    pub fn set_tracks_body(&self, body: serde_json::Value) {
        self.state.lock().unwrap().tracks = body;
    }

    pub fn set_adjust_archive(&self, archive: Vec<u8>) {
        self.state.lock().unwrap().adjust = Ok(archive);
    }

    pub fn set_adjust_status(&self, status: u16) {
        self.state.lock().unwrap().adjust = Err(status);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests().into_iter().filter(|r| r.path == path).collect()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn record(state: &Shared, path: &str, headers: &HeaderMap, body: Bytes) {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state.lock().unwrap().requests.push(RecordedRequest {
        path: path.to_string(),
        content_type,
        body,
    });
}

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

async fn health(State(state): State<Shared>) -> StatusCode {
    let code = state.lock().unwrap().health_status;
    status(code)
}

async fn tracks(State(state): State<Shared>) -> Json<serde_json::Value> {
    let body = state.lock().unwrap().tracks.clone();
    Json(body)
}

async fn mix_all(State(state): State<Shared>, headers: HeaderMap, body: Bytes) -> Response {
    record(&state, "/mix-all", &headers, body);
    let behavior = state.lock().unwrap().mix.clone();

    match behavior {
        MixBehavior::Stream(chunks) => {
            let stream = futures::stream::iter(
                chunks
                    .into_iter()
                    .map(|chunk| Ok::<_, std::io::Error>(Bytes::from(chunk))),
            );
            ndjson(Body::from_stream(stream))
        }
        MixBehavior::Truncated(chunks) => {
            let items: Vec<Result<Bytes, std::io::Error>> = chunks
                .into_iter()
                .map(|chunk| Ok(Bytes::from(chunk)))
                .chain(std::iter::once(Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "connection lost",
                ))))
                .collect();
            // Pause before failing so the earlier chunks reach the client
            let stream = futures::stream::iter(items).then(|item| async move {
                if item.is_err() {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
                item
            });
            ndjson(Body::from_stream(stream))
        }
        MixBehavior::Status(code) => (status(code), "mixing failed").into_response(),
        MixBehavior::Archive(archive) => {
            ([(header::CONTENT_TYPE, "application/zip")], archive).into_response()
        }
    }
}

async fn adjust_bpm(State(state): State<Shared>, headers: HeaderMap, body: Bytes) -> Response {
    record(&state, "/adjust-bpm", &headers, body);
    let adjust = state.lock().unwrap().adjust.clone();
    match adjust {
        Ok(archive) => ([(header::CONTENT_TYPE, "application/zip")], archive).into_response(),
        Err(code) => status(code).into_response(),
    }
}

fn ndjson(body: Body) -> Response {
    Response::builder()
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .body(body)
        .unwrap()
}
