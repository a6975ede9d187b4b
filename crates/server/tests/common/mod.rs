//! Common test utilities for API testing with a mock engine.
//!
//! This module provides a test fixture that creates an in-process server
//! with a controllable execution engine, so batch and review flows can be
//! exercised without a renderer executable.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use pixbatch_core::{testing::MockEngine, Config, ExecutionEngine};
use pixbatch_server::state::AppState;

/// Re-export fixtures for test convenience
pub use pixbatch_core::testing::fixtures;

/// Test fixture for API testing with a mock engine.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_start_batch() {
///     let fixture = TestFixture::new();
///
///     let response = fixture.post("/api/v1/batch", json!({
///         "script": "invert($1)",
///         "output_directory": "/out",
///         "bindings": { "1": ["/in/a.png"] }
///     })).await;
///
///     assert_eq!(response.status, 202);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock engine - control progress, the review queue and submissions
    pub engine: Arc<MockEngine>,
    /// Shared state behind the router
    pub state: Arc<AppState>,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Raw response for non-JSON endpoints
#[derive(Debug)]
pub struct RawResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl TestFixture {
    /// Create a new test fixture with fast batch timings.
    pub fn new() -> Self {
        let engine = Arc::new(MockEngine::new());
        let config = Config {
            batch: fixtures::fast_batch_config(),
            ..Default::default()
        };

        let state = Arc::new(AppState::new(
            config,
            Arc::clone(&engine) as Arc<dyn ExecutionEngine>,
        ));
        let router = pixbatch_server::api::create_router(Arc::clone(&state));

        Self {
            router,
            engine,
            state,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a GET request and keep the body as bytes.
    pub async fn get_raw(&self, path: &str) -> RawResponse {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes()
            .to_vec();

        RawResponse {
            status,
            content_type,
            body,
        }
    }

    /// Poll `GET /api/v1/batch` until `predicate` holds or two seconds pass.
    pub async fn wait_for_batch(&self, predicate: impl Fn(&Value) -> bool) -> Value {
        for _ in 0..200 {
            let response = self.get("/api/v1/batch").await;
            if response.status == StatusCode::OK && predicate(&response.body) {
                return response.body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("batch never reached the expected state");
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = match body {
            Some(json) => {
                request_builder = request_builder.header("Content-Type", "application/json");
                Body::from(serde_json::to_string(&json).unwrap())
            }
            None => Body::empty(),
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}
