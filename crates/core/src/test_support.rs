//! Scripted local HTTP endpoint for exercising the real clients.

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::Response,
    Router,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub struct SeenRequest {
    /// `METHOD /path?query`
    pub line: String,
    pub headers: HeaderMap,
}

#[derive(Default)]
struct Script {
    responses: VecDeque<(u16, &'static str)>,
    seen: Vec<SeenRequest>,
}

pub struct ScriptedEndpoint {
    pub url: String,
    script: Arc<Mutex<Script>>,
}

impl ScriptedEndpoint {
    /// Answers with `responses` in order, then keeps repeating the last one.
    pub async fn start(responses: Vec<(u16, &'static str)>) -> std::io::Result<Self> {
        let script = Arc::new(Mutex::new(Script {
            responses: responses.into(),
            seen: Vec::new(),
        }));

        let shared = script.clone();
        let app = Router::new().fallback(move |request: Request| {
            let script = shared.clone();
            async move { respond(&script, request) }
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let url = format!("http://{}", listener.local_addr()?);
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self { url, script })
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.script.lock().unwrap().seen.clone()
    }

    pub fn request_lines(&self) -> Vec<String> {
        self.requests().into_iter().map(|request| request.line).collect()
    }
}

fn respond(script: &Mutex<Script>, request: Request) -> Response {
    let mut script = script.lock().unwrap();

    let target = request
        .uri()
        .path_and_query()
        .map(|target| target.to_string())
        .unwrap_or_default();
    script.seen.push(SeenRequest {
        line: format!("{} {}", request.method(), target),
        headers: request.headers().clone(),
    });

    let next = if script.responses.len() > 1 {
        script.responses.pop_front()
    } else {
        script.responses.front().copied()
    };
    let (status, body) = next.unwrap_or((200, "{}"));

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = StatusCode::from_u16(status).unwrap();
    response
        .headers_mut()
        .insert("content-type", HeaderValue::from_static("application/json"));
    response
}
