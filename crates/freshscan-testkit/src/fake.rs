//! Fake inference service
//!
//! Serves the same routes as the real inference backend (`/`, `/health`,
//! `/predict`) with scriptable status codes, bodies and delays, and counts
//! every call so tests can assert on what actually went over the wire.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// What the fake saw in the last `/predict` request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub field_name: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub len: usize,
}

#[derive(Debug, Clone)]
struct Reply {
    status: u16,
    body: String,
}

#[derive(Debug)]
struct FakeState {
    health_status: u16,
    health_script: VecDeque<u16>,
    health_delay: Option<Duration>,
    root_status: u16,
    prediction: Reply,
    health_calls: usize,
    root_calls: usize,
    predict_calls: usize,
    last_upload: Option<Upload>,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            health_status: 200,
            health_script: VecDeque::new(),
            health_delay: None,
            root_status: 200,
            prediction: Reply {
                status: 200,
                body: json!({"result": "fresh", "confidence": 92.5, "fruitType": "apple"})
                    .to_string(),
            },
            health_calls: 0,
            root_calls: 0,
            predict_calls: 0,
            last_upload: None,
        }
    }
}

impl FakeState {
    fn next_health_status(&mut self) -> u16 {
        self.health_script.pop_front().unwrap_or(self.health_status)
    }
}

type Shared = Arc<Mutex<FakeState>>;

/// A running fake inference service
///
/// The server task is aborted when the value is dropped.
#[derive(Debug)]
pub struct FakeService {
    addr: SocketAddr,
    state: Shared,
    handle: JoinHandle<()>,
}

impl FakeService {
    /// Start the fake on an ephemeral localhost port
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state: Shared = Arc::new(Mutex::new(FakeState::default()));

        let app = Router::new()
            .route("/", get(root_handler).head(root_handler))
            .route("/health", get(health_handler).head(health_handler))
            .route("/predict", post(predict_handler))
            .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
            .with_state(state.clone());

        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            addr,
            state,
            handle,
        })
    }

    /// Base URL of the fake (no trailing slash)
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Status returned by `/health` once any script is exhausted
    pub fn set_health(&self, status: u16) {
        self.state.lock().health_status = status;
    }

    /// Statuses returned by the next `/health` calls, in order
    pub fn script_health(&self, statuses: impl IntoIterator<Item = u16>) {
        self.state.lock().health_script.extend(statuses);
    }

    /// Delay every `/health` response
    pub fn set_health_delay(&self, delay: Duration) {
        self.state.lock().health_delay = Some(delay);
    }

    pub fn set_root(&self, status: u16) {
        self.state.lock().root_status = status;
    }

    /// Reply for `/predict` with a JSON body
    pub fn set_prediction(&self, status: u16, body: serde_json::Value) {
        self.state.lock().prediction = Reply {
            status,
            body: body.to_string(),
        };
    }

    /// Reply for `/predict` with an arbitrary (possibly non-JSON) body
    pub fn set_prediction_raw(&self, status: u16, body: impl Into<String>) {
        self.state.lock().prediction = Reply {
            status,
            body: body.into(),
        };
    }

    pub fn health_calls(&self) -> usize {
        self.state.lock().health_calls
    }

    pub fn root_calls(&self) -> usize {
        self.state.lock().root_calls
    }

    pub fn predict_calls(&self) -> usize {
        self.state.lock().predict_calls
    }

    pub fn last_upload(&self) -> Option<Upload> {
        self.state.lock().last_upload.clone()
    }
}

impl Drop for FakeService {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A localhost URL nothing is listening on
///
/// Connections to it are refused, which is how a stopped backend looks.
pub fn unused_url() -> String {
    let listener =
        std::net::TcpListener::bind("127.0.0.1:0").expect("failed to bind ephemeral port");
    let addr = listener.local_addr().expect("ephemeral port has an address");
    drop(listener);
    format!("http://{addr}")
}

fn status_code(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

async fn root_handler(State(state): State<Shared>) -> Response {
    let status = {
        let mut s = state.lock();
        s.root_calls += 1;
        s.root_status
    };
    (
        status_code(status),
        Json(json!({"message": "Fruit Freshness Scanner API is running"})),
    )
        .into_response()
}

async fn health_handler(State(state): State<Shared>) -> Response {
    let (status, delay) = {
        let mut s = state.lock();
        s.health_calls += 1;
        (s.next_health_status(), s.health_delay)
    };
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    (status_code(status), Json(json!({"status": "healthy"}))).into_response()
}

async fn predict_handler(State(state): State<Shared>, mut multipart: Multipart) -> Response {
    let mut upload = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        let field_name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let len = field.bytes().await.map(|b| b.len()).unwrap_or(0);
        upload = Some(Upload {
            field_name,
            file_name,
            content_type,
            len,
        });
    }

    let reply = {
        let mut s = state.lock();
        s.predict_calls += 1;
        s.last_upload = upload;
        s.prediction.clone()
    };

    (
        status_code(reply.status),
        [(header::CONTENT_TYPE, "application/json")],
        reply.body,
    )
        .into_response()
}
