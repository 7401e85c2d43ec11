use std::net::SocketAddr;

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{auth, causes, config::AppConfig, products, state::AppState, users};

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest(
            "/api/v1",
            Router::new()
                .merge(auth::router())
                .merge(users::router())
                .merge(causes::router())
                .merge(products::router())
                .route("/health", get(health)),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: std::time::Duration, span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router, config: &AppConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use tower::ServiceExt;

    async fn call(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(t) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        let req = match body {
            Some(b) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(b.to_string())),
            None => req.body(Body::empty()),
        }
        .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), 1 << 20).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    async fn register(app: &Router, email: &str, entrepreneur: bool) -> (String, String) {
        let (status, body) = call(
            app,
            "POST",
            "/api/v1/auth/register",
            None,
            Some(json!({
                "email": email,
                "password": "secret1",
                "confirmPassword": "secret1",
                "name": email.split('@').next().unwrap(),
                "isEntrepreneur": entrepreneur,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        (
            body["accessToken"].as_str().unwrap().to_string(),
            body["user"]["id"].as_str().unwrap().to_string(),
        )
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = build_app(AppState::fake());
        let (status, body) = call(&app, "GET", "/api/v1/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn contribution_end_to_end() {
        let app = build_app(AppState::fake());
        let (owner, _) = register(&app, "owner@example.com", false).await;
        let (fan, fan_id) = register(&app, "fan@example.com", false).await;

        let (status, cause) = call(
            &app,
            "POST",
            "/api/v1/causes",
            Some(&owner),
            Some(json!({"title": "Well", "goal": 100.0, "tags": ["Water"]})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(cause["status"], "active");
        let id = cause["id"].as_str().unwrap().to_string();
        let uri = format!("/api/v1/causes/{id}/contributions");

        let (status, body) = call(&app, "POST", &uri, Some(&fan), Some(json!({"amount": 60}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cause"]["currentAmount"], 60.0);
        assert_eq!(body["newSupporter"], true);

        let (_, body) = call(&app, "POST", &uri, Some(&fan), Some(json!({"amount": 40}))).await;
        assert_eq!(body["cause"]["status"], "completed");
        assert_eq!(body["completedNow"], true);
        assert_eq!(body["cause"]["supporters"], json!([fan_id]));

        let (_, me) = call(&app, "GET", "/api/v1/me", Some(&fan), None).await;
        assert_eq!(me["causesSupported"], 1);
    }

    #[tokio::test]
    async fn error_mapping() {
        let app = build_app(AppState::fake());
        let (token, user_id) = register(&app, "a@example.com", false).await;

        let (status, body) = call(&app, "GET", "/api/v1/causes/nope", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], "error");

        let (status, _) = call(&app, "POST", "/api/v1/causes/nope/contributions", None, Some(json!({"amount": 5}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(&app, "GET", "/api/v1/me", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(
            &app,
            "POST",
            "/api/v1/causes",
            Some(&token),
            Some(json!({"title": "x", "goal": -1})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            "POST",
            "/api/v1/products",
            Some(&token),
            Some(json!({"title": "Mug", "price": 3, "category": "home"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = call(
            &app,
            "POST",
            "/api/v1/auth/register",
            None,
            Some(json!({"email": "a@example.com", "password": "secret1", "confirmPassword": "secret1", "name": "A"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = call(
            &app,
            "PUT",
            &format!("/api/v1/users/{user_id}x"),
            Some(&token),
            Some(json!({"bio": "hi"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn product_status_is_owner_only() {
        let app = build_app(AppState::fake());
        let (shop, shop_id) = register(&app, "shop@example.com", true).await;
        let (other, _) = register(&app, "other@example.com", false).await;

        let (status, product) = call(
            &app,
            "POST",
            "/api/v1/products",
            Some(&shop),
            Some(json!({"title": "Mug", "price": 3, "category": "Home"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let uri = format!("/api/v1/products/{}/status", product["id"].as_str().unwrap());

        let (status, _) = call(&app, "PUT", &uri, Some(&other), Some(json!({"status": "sold"}))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, body) = call(&app, "PUT", &uri, Some(&shop), Some(json!({"status": "sold"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "sold");

        let (_, listed) = call(&app, "GET", &format!("/api/v1/users/{shop_id}/products"), None, None).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn email_verification_over_http() {
        let app = build_app(AppState::fake());
        let (status, body) = call(
            &app,
            "POST",
            "/api/v1/auth/register",
            None,
            Some(json!({"email": "v@example.com", "password": "secret1", "confirmPassword": "secret1", "name": "V"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body["user"].get("passwordHash").is_none());
        let token = body["verificationToken"].as_str().unwrap().to_string();

        let (status, body) = call(&app, "POST", "/api/v1/auth/verify-email", None, Some(json!({"token": token}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["bonusAwarded"], true);
        assert_eq!(body["user"]["points"], 100);
    }
}
