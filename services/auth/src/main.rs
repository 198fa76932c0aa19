use anyhow::Result;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

mod errors;
mod fingerprint;
mod jwt;
mod middleware;
mod models;
mod oauth;
mod rate_limiter;
mod repositories;
mod revocation;
mod routes;
mod session;
mod validation;

use common::cache::{RedisConfig, RedisPool};
use common::database;
use sqlx::PgPool;

use crate::jwt::{JwtConfig, JwtService};
use crate::oauth::{GoogleAuthConfig, GoogleVerifier};
use crate::rate_limiter::{RateLimiter, RateLimiterConfig};
use crate::repositories::UserRepository;
use crate::revocation::RevocationStore;
use crate::session::SessionService;

/// Default TTL for revocation entries whose token expiry is unreadable
const REVOCATION_DEFAULT_TTL_SECS: u64 = 900;
/// Sweep interval for the in-process revocation map
const REVOCATION_SWEEP_INTERVAL_SECS: u64 = 60;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub session_service: SessionService<UserRepository>,
    pub user_repository: UserRepository,
    pub rate_limiter: RateLimiter,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!("Starting authentication service");

    // Initialize database connection pool
    let db_config = database::DatabaseConfig::from_env()?;
    let pool = database::init_pool(&db_config).await?;

    if database::health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }

    // Token codec: missing secrets abort startup here.
    let jwt_config = JwtConfig::from_env()?;
    let jwt_service = JwtService::new(jwt_config);

    // Redis backs the revocation store when configured; without it the
    // store runs in-process with identical semantics minus cross-process
    // sharing.
    let redis_pool = match std::env::var("REDIS_URL") {
        Ok(_) => Some(RedisPool::new(&RedisConfig::from_env()?).await?),
        Err(_) => {
            warn!("REDIS_URL not set, revocation list is in-process only");
            None
        }
    };

    let revocation = RevocationStore::new(redis_pool, REVOCATION_DEFAULT_TTL_SECS).await;
    revocation.spawn_sweeper(REVOCATION_SWEEP_INTERVAL_SECS);

    let google = GoogleVerifier::new(GoogleAuthConfig::from_env()?);

    let user_repository = UserRepository::new(pool.clone());
    let session_service = SessionService::new(
        user_repository.clone(),
        jwt_service,
        revocation,
        google,
    );
    let rate_limiter = RateLimiter::new(RateLimiterConfig::default());

    let app_state = AppState {
        db_pool: pool,
        session_service,
        user_repository,
        rate_limiter,
    };

    info!("Authentication service initialized successfully");

    // Start the web server
    let app = routes::create_router(app_state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Authentication service listening on 0.0.0.0:{}", port);

    axum::serve(listener, app).await?;

    Ok(())
}
