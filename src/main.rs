use std::sync::Arc;

use axum::{ServiceExt, extract::Request};
use country_projects::{
    AppState,
    config::{AppConfig, Env},
    create_app,
    repository::{PostgresRepository, RepositoryState},
};
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads configuration, initializes logging, connects and migrates the database, provisions
/// the bootstrap super admin and serves the API.
#[tokio::main]
async fn main() {
    // 1. Configuration (fail-fast on missing production secrets)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging: RUST_LOG wins, otherwise sensible local defaults.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "country_projects=debug,tower_http=info,axum=trace".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 3. Database
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    let postgres = PostgresRepository::new(pool);
    postgres
        .migrate()
        .await
        .expect("FATAL: Failed to apply database migrations.");

    let repo = Arc::new(postgres) as RepositoryState;

    // 4. State assembly and bootstrap account
    let bind_addr = config.bind_addr.clone();
    let bootstrap = config.bootstrap_admin.clone();
    let app_state = AppState::new(repo, config);

    if let Some(admin) = bootstrap {
        match app_state.users.ensure_super_admin(&admin).await {
            Ok(true) => tracing::info!(username = %admin.username, "bootstrap super admin created"),
            Ok(false) => tracing::debug!("a super admin already exists, bootstrap skipped"),
            Err(e) => tracing::error!(error = %e, "bootstrap super admin could not be created"),
        }
    }

    // 5. Router and server
    let app = create_app(app_state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .expect("FATAL: Failed to bind the HTTP listener. Check BIND_ADDR.");

    tracing::info!("Listening on {bind_addr}");

    axum::serve(listener, ServiceExt::<Request>::into_make_service(app))
        .await
        .expect("FATAL: HTTP server terminated unexpectedly.");
}
