#![allow(dead_code)]

use axum::{
    extract::State,
    http::{ header, HeaderMap, StatusCode },
    response::{ IntoResponse, Response },
    routing::post,
    Router,
};
use std::sync::{ Arc, Mutex };
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
pub struct Captured {
    pub body: String,
    pub authorization: Option<String>,
}

struct Fixture {
    status: StatusCode,
    content_type: &'static str,
    body: String,
    captured: Arc<Mutex<Vec<Captured>>>,
}

pub struct FakeServer {
    pub base: String,
    pub captured: Arc<Mutex<Vec<Captured>>>,
}

impl FakeServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn requests(&self) -> Vec<Captured> {
        self.captured.lock().unwrap().clone()
    }

    pub fn json_body(&self, index: usize) -> serde_json::Value {
        serde_json::from_str(&self.requests()[index].body).unwrap()
    }
}

async fn reply(State(fixture): State<Arc<Fixture>>, headers: HeaderMap, body: String) -> Response {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    fixture.captured.lock().unwrap().push(Captured { body, authorization });
    (fixture.status, [(header::CONTENT_TYPE, fixture.content_type)], fixture.body.clone()).into_response()
}

/// Serves a fixed reply for every POST to `path` on a random loopback port.
pub async fn serve(path: &str, status: u16, content_type: &'static str, body: impl Into<String>) -> FakeServer {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let fixture = Arc::new(Fixture {
        status: StatusCode::from_u16(status).unwrap(),
        content_type,
        body: body.into(),
        captured: captured.clone(),
    });
    let app = Router::new().route(path, post(reply)).with_state(fixture);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    FakeServer { base: format!("http://{}", addr), captured }
}

pub fn sse(events: &[&str]) -> String {
    events
        .iter()
        .map(|e| format!("data: {}\n\n", e))
        .collect()
}
