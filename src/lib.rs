#![doc = "The `taskvault` library crate."]
#![doc = ""]
#![doc = "Multi-tenant task management API: credential hashing, local and remote (JWKS)"]
#![doc = "bearer tokens, owner-scoped task workflows and the task list query engine."]
#![doc = "The binary (`main.rs`) wires these into an actix-web server."]

pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod store;
pub mod workflows;

pub use crate::error::AppError;
pub use crate::routes::AppState;
