use crate::server::{ServerRouter, ServerState, routes};
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use postboard_db::memory::MemoryStore;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

/// The full router over a fresh in-memory store.
pub struct TestApp {
    router: Router,
    pub store: Arc<MemoryStore>,
}

impl TestApp {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::default());
        let router: ServerRouter = routes();
        let router = router.with_state(ServerState {
            store: store.clone(),
            token_lifetime: None,
        });

        Self { router, store }
    }

    /// Sends one request and returns the status with the parsed JSON body
    /// (`Value::Null` for an empty body).
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }

        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };

        (status, value)
    }

    /// Registers a user and returns its id and bearer token.
    pub async fn register(&self, name: &str) -> (String, String) {
        let (status, registration) = self
            .request(Method::POST, "/api/users", None, Some(json!({ "name": name })))
            .await;
        assert_eq!(status, StatusCode::OK, "{registration}");

        let user_id = registration["user"]["_id"].as_str().unwrap().to_owned();
        let token = registration["token"].as_str().unwrap().to_owned();
        (user_id, token)
    }
}
