use crate::{
    auth::{
        hash_password_with_cost, verify_password, AuthResponse, LoginRequest, Principal,
        RegisterRequest,
    },
    error::AppError,
    models::User,
    routes::AppState,
};
use actix_web::{get, post, web, HttpResponse, Responder};
use log::{debug, info};
use validator::Validate;

/// Register a new user
///
/// Creates a new user account and returns an authentication token.
/// A duplicate email (case-insensitive) is a 409.
#[post("/register")]
pub async fn register(
    state: web::Data<AppState>,
    register_data: web::Json<RegisterRequest>,
) -> Result<impl Responder, AppError> {
    register_data.validate()?;
    let RegisterRequest {
        email,
        name,
        password,
    } = register_data.into_inner();

    if state.users.find_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict("Email already registered".into()));
    }

    // bcrypt is deliberately slow; keep it off the async workers
    let cost = state.password_cost;
    let password_hash = web::block(move || hash_password_with_cost(&password, cost))
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))??;

    let user = state
        .users
        .insert(User::new(&email, &name, password_hash)?)
        .await?;
    let issued = state.issuer.issue(&user.id)?;
    info!("Registered user {}", user.id);

    Ok(HttpResponse::Created().json(AuthResponse::new(issued, user.profile())))
}

/// Login user
///
/// Authenticates a user and returns an authentication token. Unknown email and
/// wrong password produce the same 401.
#[post("/login")]
pub async fn login(
    state: web::Data<AppState>,
    login_data: web::Json<LoginRequest>,
) -> Result<impl Responder, AppError> {
    let invalid = || AppError::Unauthorized("Email or password is incorrect".into());
    if login_data.validate().is_err() {
        return Err(invalid());
    }
    let LoginRequest { email, password } = login_data.into_inner();

    let Some(user) = state.users.find_by_email(&email).await? else {
        debug!("Login attempt for unknown email");
        return Err(invalid());
    };

    let hash = user.password_hash.clone();
    let matches = web::block(move || verify_password(&password, &hash))
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    if !matches {
        debug!("Login attempt with wrong password for {}", user.id);
        return Err(invalid());
    }

    let issued = state.issuer.issue(&user.id)?;
    Ok(HttpResponse::Ok().json(AuthResponse::new(issued, user.profile())))
}

/// Current user's profile. Remote principals without a local account get a 404.
#[get("/me")]
pub async fn me(
    state: web::Data<AppState>,
    principal: Principal,
) -> Result<impl Responder, AppError> {
    let user = state
        .users
        .find_by_id(principal.id())
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(HttpResponse::Ok().json(user.profile()))
}
