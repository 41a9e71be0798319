#![allow(dead_code)]

use actix_http::Request;
use actix_web::body::MessageBody;
use actix_web::dev::{Service, ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use chrono::Duration;
use serde_json::{json, Value};
use std::sync::Arc;

use taskvault::auth::{AuthMiddleware, TokenIssuer, TokenVerifier};
use taskvault::routes::{self, AppState};
use taskvault::store::{MemoryTaskStore, MemoryUserStore};

pub const TEST_SECRET: &str = "integration-test-secret-0123456789";
pub const TEST_PASSWORD: &str = "Password123";

/// Fresh in-memory stores and a cheap bcrypt cost.
pub fn state() -> AppState {
    AppState::new(
        Arc::new(MemoryTaskStore::new()),
        Arc::new(MemoryUserStore::new()),
        TokenIssuer::new(TEST_SECRET, Duration::days(7)),
    )
    .with_password_cost(4)
}

pub fn local_verifier() -> TokenVerifier {
    TokenVerifier::new(TEST_SECRET)
}

/// The same app wiring as the binary, minus CORS and logging.
pub fn app(
    state: AppState,
    verifier: TokenVerifier,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    App::new()
        .app_data(web::Data::new(state))
        .wrap(AuthMiddleware::new(Arc::new(verifier)))
        .configure(routes::config)
}

/// Calls the service and returns status plus JSON body (`Null` when empty).
/// Middleware rejections come back as `Err`; they are rendered the way the
/// server would render them.
pub async fn send<S, B>(app: &S, req: Request) -> (StatusCode, Value)
where
    S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    match test::try_call_service(app, req).await {
        Ok(resp) => {
            let status = resp.status();
            let bytes = test::read_body(resp).await;
            (status, parse(&bytes))
        }
        Err(err) => {
            let resp = err.error_response();
            let status = resp.status();
            let bytes = actix_web::body::to_bytes(resp.into_body())
                .await
                .unwrap_or_default();
            (status, parse(&bytes))
        }
    }
}

fn parse(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap_or(Value::Null)
}

/// Registers an account and returns `(user_id, token)`.
pub async fn register<S, B>(app: &S, email: &str) -> (String, String)
where
    S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(json!({
            "email": email,
            "name": "Test User",
            "password": TEST_PASSWORD
        }))
        .to_request();
    let (status, body) = send(app, req).await;
    assert_eq!(status, StatusCode::CREATED, "Registration failed: {}", body);

    let user_id = body["user"]["id"].as_str().unwrap().to_string();
    let token = body["token"].as_str().unwrap().to_string();
    (user_id, token)
}

pub fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", token))
}
