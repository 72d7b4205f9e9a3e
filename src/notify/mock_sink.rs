//! Scripted in-process webhook sink for tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use parking_lot::Mutex;
use serde_json::{json, Value as JsonValue};
use tokio::sync::oneshot;

/// One scripted reply
#[derive(Debug, Clone)]
pub enum Reply {
    Json(u16, JsonValue),
    Raw(u16, String),
    Slow(Duration, JsonValue),
}

impl Reply {
    pub fn ok() -> Self {
        Reply::Json(200, json!({"code": 0, "msg": "success"}))
    }

    pub fn json(status: u16, body: JsonValue) -> Self {
        Reply::Json(status, body)
    }

    pub fn raw(status: u16, body: &str) -> Self {
        Reply::Raw(status, body.to_string())
    }

    pub fn slow(delay: Duration, body: JsonValue) -> Self {
        Reply::Slow(delay, body)
    }
}

#[derive(Clone)]
struct SinkState {
    script: Arc<Vec<Reply>>,
    next: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<JsonValue>>>,
}

async fn hook(State(state): State<SinkState>, body: String) -> Response {
    let index = state.next.fetch_add(1, Ordering::SeqCst);
    state
        .received
        .lock()
        .push(serde_json::from_str(&body).unwrap_or(JsonValue::String(body)));

    // The last reply repeats once the script runs out
    let reply = state
        .script
        .get(index)
        .or_else(|| state.script.last())
        .cloned()
        .unwrap_or_else(Reply::ok);

    match reply {
        Reply::Json(status, body) => (status_code(status), axum::Json(body)).into_response(),
        Reply::Raw(status, body) => (status_code(status), body).into_response(),
        Reply::Slow(delay, body) => {
            tokio::time::sleep(delay).await;
            (StatusCode::OK, axum::Json(body)).into_response()
        }
    }
}

fn status_code(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// HTTP server on 127.0.0.1 answering `POST /hook` from a script.
///
/// Runs on its own thread and runtime so blocking and async clients can
/// both reach it.
pub struct MockSink {
    url: String,
    received: Arc<Mutex<Vec<JsonValue>>>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl MockSink {
    pub fn start(script: Vec<Reply>) -> Self {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind mock sink");
        listener.set_nonblocking(true).expect("nonblocking listener");
        let addr = listener.local_addr().expect("local addr");

        let received = Arc::new(Mutex::new(Vec::new()));
        let state = SinkState {
            script: Arc::new(script),
            next: Arc::new(AtomicUsize::new(0)),
            received: Arc::clone(&received),
        };
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("sink runtime");
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener).expect("tokio listener");
                let app = Router::new().route("/hook", post(hook)).with_state(state);
                let _ = axum::serve(listener, app)
                    .with_graceful_shutdown(async {
                        let _ = shutdown_rx.await;
                    })
                    .await;
            });
        });

        Self {
            url: format!("http://{}/hook", addr),
            received,
            shutdown: Some(shutdown_tx),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Request bodies in arrival order
    pub fn received(&self) -> Vec<JsonValue> {
        self.received.lock().clone()
    }

    pub fn hits(&self) -> usize {
        self.received.lock().len()
    }
}

impl Drop for MockSink {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}
