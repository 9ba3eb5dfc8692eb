use crate::metrics;
use crate::pipeline::Forwarder;
use crate::record::Input;
use axum::{
    body::Bytes,
    http::{Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Extension, Router,
};
use hyper::Server;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// Health check endpoint. Succeeds regardless of configuration state.
async fn health() -> impl IntoResponse {
    "OK"
}

/// Prometheus metrics in text exposition format
async fn metrics_text() -> impl IntoResponse {
    metrics::render()
}

/// Ingest endpoint: reads the raw body, coerces it to JSON or text, and
/// runs the forwarding pipeline once.
async fn ingest(
    Extension(forwarder): Extension<Arc<Forwarder>>,
    body: Bytes,
) -> impl IntoResponse {
    metrics::ingest::request_received();

    let text = String::from_utf8_lossy(&body);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        metrics::ingest::rejected_empty();
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "Empty payload"})),
        );
    }

    match forwarder.forward(Input::from_text(trimmed)).await {
        Ok(status) => (
            StatusCode::OK,
            Json(serde_json::json!({"status": "sent", "eventstream_status": status})),
        ),
        Err(e) => {
            error!("Forwarding failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": e.to_string()})),
            )
        }
    }
}

/// Fallback for unknown routes
async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"error": "Not found"})),
    )
}

/// Create the HTTP server with all routes
pub fn create_server(forwarder: Arc<Forwarder>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    // Method routers fall back too, so a wrong-method request gets the
    // same JSON 404 as an unknown path rather than a bare 405
    Router::new()
        .route("/health", get(health).fallback(not_found))
        .route("/ingest", post(ingest).fallback(not_found))
        .route("/metrics", get(metrics_text).fallback(not_found))
        .fallback(not_found)
        .layer(Extension(forwarder))
        .layer(ServiceBuilder::new().layer(cors))
}

/// Start the HTTP server on the specified port
pub async fn start_server(forwarder: Arc<Forwarder>, port: u16) -> anyhow::Result<()> {
    let app = create_server(forwarder);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!("HTTP server listening on {}", addr);
    println!("🚀 HTTP server running on http://localhost:{port}");
    println!("💚 Health check: http://localhost:{port}/health");
    println!("📬 Ingest:       http://localhost:{port}/ingest");
    println!("📈 Metrics:      http://localhost:{port}/metrics");

    Server::bind(&addr).serve(app.into_make_service()).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenSource;
    use crate::deliver::EventstreamClient;
    use crate::error::Result;
    use crate::transform::BuiltinNormalizer;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt;

    struct StaticTokens;

    #[async_trait]
    impl TokenSource for StaticTokens {
        async fn access_token(&self) -> Result<String> {
            Ok("test-token".to_string())
        }
    }

    fn test_forwarder(ingest_url: Option<String>) -> Arc<Forwarder> {
        Arc::new(Forwarder::new(
            Box::new(BuiltinNormalizer),
            Box::new(StaticTokens),
            EventstreamClient::new(ingest_url),
            "any".to_string(),
        ))
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_succeeds_without_any_configuration() {
        let app = create_server(test_forwarder(None));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        assert_eq!(&bytes[..], b"OK");
    }

    #[tokio::test]
    async fn test_empty_body_is_rejected_with_400() {
        let app = create_server(test_forwarder(None));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/ingest")
                    .body(Body::from("   "))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Empty payload");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_ingest_forwards_raw_text() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/e1")
            .match_header("authorization", "Bearer test-token")
            .match_body(mockito::Matcher::Json(json!({"payload": "hello", "schema": "any"})))
            .with_status(200)
            .create_async()
            .await;

        let app = create_server(test_forwarder(Some(format!("{}/e1", server.url()))));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/ingest")
                    .body(Body::from("hello"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "sent");
        assert_eq!(body["eventstream_status"], 200);
        mock.assert_async().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_ingest_forwards_json_bodies_as_canonical_json() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/e1")
            .match_body(mockito::Matcher::Json(
                json!({"payload": "{\"a\":1}", "schema": "any"}),
            ))
            .with_status(200)
            .create_async()
            .await;

        let app = create_server(test_forwarder(Some(format!("{}/e1", server.url()))));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/ingest")
                    .body(Body::from(r#"{"a":1}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        mock.assert_async().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_upstream_rejection_maps_to_500_with_the_status_embedded() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/e1")
            .with_status(403)
            .with_body("forbidden")
            .create_async()
            .await;

        let app = create_server(test_forwarder(Some(format!("{}/e1", server.url()))));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/ingest")
                    .body(Body::from("hello"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        let message = body["error"].as_str().unwrap();
        assert!(message.contains("403"), "missing status in: {message}");
    }

    #[tokio::test]
    async fn test_missing_ingest_url_fails_the_request_not_the_server() {
        let app = create_server(test_forwarder(None));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/ingest")
                    .body(Body::from("hello"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        let message = body["error"].as_str().unwrap();
        assert!(message.contains("EVENTSTREAM_INGEST_URL"));
    }

    #[tokio::test]
    async fn test_wrong_method_on_a_known_path_returns_the_json_404() {
        let app = create_server(test_forwarder(None));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/ingest")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Not found");
    }

    #[tokio::test]
    async fn test_unknown_routes_return_a_json_404() {
        let app = create_server(test_forwarder(None));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/definitely-not-a-route")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Not found");
    }
}
