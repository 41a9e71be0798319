use actix_cors::Cors;
use actix_web::{http::header, middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use log::{error, info, warn};
use std::sync::Arc;

use taskvault::auth::jwks::{HttpKeySetSource, JwksCache};
use taskvault::auth::{AuthMiddleware, TokenIssuer, TokenVerifier};
use taskvault::config::Config;
use taskvault::routes::{self, AppState};
use taskvault::store::{
    postgres, MemoryTaskStore, MemoryUserStore, PgTaskStore, PgUserStore, TaskStore, UserStore,
};
use taskvault::AppError;

async fn build_state(config: &Config) -> Result<AppState, AppError> {
    let (tasks, users): (Arc<dyn TaskStore>, Arc<dyn UserStore>) = match &config.database_url {
        Some(url) => {
            let pool = postgres::connect(url, config.database_max_connections).await?;
            info!("Using PostgreSQL storage");
            (
                Arc::new(PgTaskStore::new(pool.clone())),
                Arc::new(PgUserStore::new(pool)),
            )
        }
        None => {
            warn!("DATABASE_URL not set; data is kept in memory and lost on exit");
            (
                Arc::new(MemoryTaskStore::new()),
                Arc::new(MemoryUserStore::new()),
            )
        }
    };

    let issuer = TokenIssuer::new(&config.jwt_secret, config.token_ttl());
    Ok(AppState::new(tasks, users, issuer))
}

fn build_verifier(config: &Config) -> Result<TokenVerifier, AppError> {
    let verifier = TokenVerifier::new(&config.jwt_secret);
    match &config.jwks_url {
        Some(url) => {
            let source = HttpKeySetSource::new(url.clone(), config.jwks_fetch_timeout)?;
            info!("Remote token verification enabled via {}", url);
            Ok(verifier.with_remote_keys(JwksCache::new(
                Arc::new(source),
                config.jwks_cache_ttl,
                config.jwks_fetch_timeout,
            )))
        }
        None => Ok(verifier),
    }
}

fn cors(allowed_origins: &[String]) -> Cors {
    allowed_origins
        .iter()
        .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
        .allowed_methods(vec!["GET", "POST", "PUT", "PATCH", "DELETE"])
        .allowed_headers(vec![header::AUTHORIZATION, header::ACCEPT, header::CONTENT_TYPE])
        .max_age(3600)
}

async fn run() -> Result<(), AppError> {
    let config = Config::from_env()?;
    let state = web::Data::new(build_state(&config).await?);
    let verifier = Arc::new(build_verifier(&config)?);

    info!("Starting server at {}", config.server_url());

    let allowed_origins = config.allowed_origins.clone();
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(AuthMiddleware::new(Arc::clone(&verifier)))
            .wrap(cors(&allowed_origins))
            .wrap(Logger::default())
            .configure(routes::config)
    })
    .bind((config.server_host.as_str(), config.server_port))
    .map_err(|e| AppError::InternalServerError(format!("Failed to bind: {}", e)))?
    .run()
    .await
    .map_err(|e| AppError::InternalServerError(format!("Server error: {}", e)))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
    Ok(())
}
