pub mod auth;
pub mod health;
pub mod tasks;

use actix_web::{error::JsonPayloadError, web, HttpRequest};
use std::sync::Arc;

use crate::auth::password::DEFAULT_HASH_COST;
use crate::auth::TokenIssuer;
use crate::error::AppError;
use crate::store::{TaskStore, UserStore};

/// Shared handles every handler needs, registered once as `web::Data<AppState>`.
pub struct AppState {
    pub tasks: Arc<dyn TaskStore>,
    pub users: Arc<dyn UserStore>,
    pub issuer: TokenIssuer,
    pub password_cost: u32,
}

impl AppState {
    pub fn new(tasks: Arc<dyn TaskStore>, users: Arc<dyn UserStore>, issuer: TokenIssuer) -> Self {
        Self {
            tasks,
            users,
            issuer,
            password_cost: DEFAULT_HASH_COST,
        }
    }

    /// Lower bcrypt cost, for tests only.
    pub fn with_password_cost(mut self, cost: u32) -> Self {
        self.password_cost = cost;
        self
    }
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .service(health::health)
        .service(
            web::scope("/api")
                .service(
                    web::scope("/auth")
                        .service(auth::register)
                        .service(auth::login)
                        .service(auth::me),
                )
                .service(tasks::list_tasks)
                .service(tasks::create_task)
                .service(tasks::toggle_complete)
                .service(tasks::get_task)
                .service(tasks::replace_task)
                .service(tasks::update_task)
                .service(tasks::delete_task),
        );
}

/// Malformed JSON bodies get the same `{"error": ...}` shape as every other failure.
fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    AppError::BadRequest(format!("Invalid request body: {}", err)).into()
}
