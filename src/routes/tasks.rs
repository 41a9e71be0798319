use crate::{
    auth::{ensure_owner, Principal},
    error::AppError,
    models::{TaskInput, TaskListParams, TaskPatch, TaskQuery},
    routes::AppState,
    workflows,
};
use actix_web::{delete, get, patch, post, put, web, HttpRequest, HttpResponse, Responder};
use serde::de::DeserializeOwned;
use validator::Validate;

/// Every route is scoped by the owner in the path. The guard runs before any
/// task data is read or written, so a mismatched owner is always a 403.
fn authorize(principal: &Principal, path_owner: &str) -> Result<(), AppError> {
    ensure_owner(path_owner, principal.id())
}

/// Bodies arrive as raw bytes and are decoded only after [`authorize`], so a
/// foreign owner gets a 403 whatever the body holds.
fn parse_body<T: DeserializeOwned + Validate>(body: &[u8]) -> Result<T, AppError> {
    let parsed: T = serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("Invalid request body: {}", e)))?;
    parsed.validate()?;
    Ok(parsed)
}

/// Retrieves a page of the user's tasks.
///
/// ## Query Parameters:
/// - `status` (optional): `completed` or `pending`.
/// - `priority` (optional): `high`, `medium` or `low`.
/// - `tag` (optional): exact tag, compared after normalization.
/// - `q` (optional): case-insensitive search in titles and descriptions.
/// - `sort` (optional): `title` or `priority`; anything else sorts newest first.
/// - `order` (optional): `asc` or `desc` (default).
/// - `limit` / `offset` (optional): page window, `limit` clamped to 1..=100.
///
/// Unrecognized values fall back to defaults instead of failing.
///
/// ## Responses:
/// - `200 OK`: `{tasks, total, limit, offset, has_more}`.
/// - `401 Unauthorized`: missing or invalid token.
/// - `403 Forbidden`: the path user is not the authenticated user.
#[get("/{user_id}/tasks")]
pub async fn list_tasks(
    state: web::Data<AppState>,
    principal: Principal,
    path: web::Path<String>,
    req: HttpRequest,
) -> Result<impl Responder, AppError> {
    let owner_id = path.into_inner();
    authorize(&principal, &owner_id)?;

    let query = TaskQuery::from(TaskListParams::from_query_str(req.query_string()));
    let page = workflows::list_tasks(state.tasks.as_ref(), &owner_id, &query).await?;
    Ok(HttpResponse::Ok().json(page))
}

/// Creates a new task for the user.
///
/// ## Responses:
/// - `201 Created`: the stored task.
/// - `400 Bad Request`: invalid title, description, priority or subtasks.
#[post("/{user_id}/tasks")]
pub async fn create_task(
    state: web::Data<AppState>,
    principal: Principal,
    path: web::Path<String>,
    body: web::Bytes,
) -> Result<impl Responder, AppError> {
    let owner_id = path.into_inner();
    authorize(&principal, &owner_id)?;

    let task_data: TaskInput = parse_body(&body)?;
    let task = workflows::create_task(state.tasks.as_ref(), &owner_id, task_data.into()).await?;
    Ok(HttpResponse::Created().json(task))
}

/// Retrieves one task.
///
/// ## Responses:
/// - `200 OK`: the task.
/// - `403 Forbidden`: the task belongs to someone else.
/// - `404 Not Found`: no task with that id.
#[get("/{user_id}/tasks/{task_id}")]
pub async fn get_task(
    state: web::Data<AppState>,
    principal: Principal,
    path: web::Path<(String, i64)>,
) -> Result<impl Responder, AppError> {
    let (owner_id, task_id) = path.into_inner();
    authorize(&principal, &owner_id)?;

    let task = workflows::get_task(state.tasks.as_ref(), task_id, &owner_id).await?;
    Ok(HttpResponse::Ok().json(task))
}

/// Updates a task. Only fields present in the body change; `PUT` and `PATCH`
/// share these semantics.
#[patch("/{user_id}/tasks/{task_id}")]
pub async fn update_task(
    state: web::Data<AppState>,
    principal: Principal,
    path: web::Path<(String, i64)>,
    body: web::Bytes,
) -> Result<impl Responder, AppError> {
    apply_patch(state, principal, path, body).await
}

#[put("/{user_id}/tasks/{task_id}")]
pub async fn replace_task(
    state: web::Data<AppState>,
    principal: Principal,
    path: web::Path<(String, i64)>,
    body: web::Bytes,
) -> Result<impl Responder, AppError> {
    apply_patch(state, principal, path, body).await
}

async fn apply_patch(
    state: web::Data<AppState>,
    principal: Principal,
    path: web::Path<(String, i64)>,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let (owner_id, task_id) = path.into_inner();
    authorize(&principal, &owner_id)?;

    let patch_data: TaskPatch = parse_body(&body)?;
    let task = workflows::update_task(state.tasks.as_ref(), task_id, &owner_id, patch_data).await?;
    Ok(HttpResponse::Ok().json(task))
}

/// Flips `completed`. Calling it twice restores the original state.
#[patch("/{user_id}/tasks/{task_id}/complete")]
pub async fn toggle_complete(
    state: web::Data<AppState>,
    principal: Principal,
    path: web::Path<(String, i64)>,
) -> Result<impl Responder, AppError> {
    let (owner_id, task_id) = path.into_inner();
    authorize(&principal, &owner_id)?;

    let task = workflows::toggle_complete(state.tasks.as_ref(), task_id, &owner_id).await?;
    Ok(HttpResponse::Ok().json(task))
}

/// Permanently deletes a task.
///
/// ## Responses:
/// - `204 No Content`: deleted.
/// - `403 Forbidden`: the task belongs to someone else.
/// - `404 Not Found`: no task with that id.
#[delete("/{user_id}/tasks/{task_id}")]
pub async fn delete_task(
    state: web::Data<AppState>,
    principal: Principal,
    path: web::Path<(String, i64)>,
) -> Result<impl Responder, AppError> {
    let (owner_id, task_id) = path.into_inner();
    authorize(&principal, &owner_id)?;

    workflows::delete_task(state.tasks.as_ref(), task_id, &owner_id).await?;
    Ok(HttpResponse::NoContent().finish())
}
