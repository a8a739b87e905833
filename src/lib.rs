pub mod application;
pub mod auth;
pub mod config;
pub mod db;
pub mod domain;
pub mod errors;
pub mod handlers;
pub mod infrastructure;
pub mod schema;
pub mod state;

use actix_web::{middleware::Logger, web, App, HttpResponse, HttpServer};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use thiserror::Error;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use db::{create_pool, DbPool};

use config::{ConfigError, Settings, StorageBackend};
use errors::AppError;
use handlers::{orders, payments, webhooks, ApiDoc, ApiResponse};
use state::{Adapters, AppState};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database pool: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
    #[error("migrations: {0}")]
    Migration(String),
}

/// Run any pending Diesel migrations against the pool's database.
pub fn run_migrations(pool: &DbPool) -> Result<(), StartupError> {
    let mut conn = pool.get()?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| StartupError::Migration(e.to_string()))?;
    if !applied.is_empty() {
        log::info!("Applied {} migration(s)", applied.len());
    }
    Ok(())
}

/// Wires services for the configured storage backend. Postgres pools are
/// migrated before use.
pub fn init_state(settings: &Settings) -> Result<AppState, StartupError> {
    let adapters = match settings.storage {
        StorageBackend::Memory => {
            log::warn!("Using in-memory storage; state is lost on restart");
            Adapters::in_memory()
        }
        StorageBackend::Postgres => {
            let url = settings
                .database_url
                .as_deref()
                .ok_or(ConfigError::Missing("DATABASE_URL"))?;
            let pool = create_pool(url)?;
            run_migrations(&pool)?;
            Adapters::postgres(pool)
        }
    };
    Ok(AppState::new(settings, adapters))
}

/// Routes and shared data for one `App`. Tests mount this directly with
/// `actix_web::test::init_service`.
pub fn configure(state: web::Data<AppState>) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        let tokens = web::Data::new(state.tokens.clone());
        cfg.app_data(state)
            .app_data(tokens)
            .app_data(web::JsonConfig::default().error_handler(|err, _req| {
                AppError::BadRequest(format!("Invalid JSON body: {}", err)).into()
            }))
            .app_data(web::PathConfig::default().error_handler(|err, _req| {
                AppError::BadRequest(format!("Invalid path: {}", err)).into()
            }))
            .service(
                web::scope("/orders")
                    .route("", web::post().to(orders::create_order))
                    .route("/{id}", web::get().to(orders::get_order))
                    .route("/{id}/accept", web::post().to(orders::accept_order))
                    .route("/{id}/status", web::patch().to(orders::update_status))
                    .route(
                        "/{id}/assign/{driver_id}",
                        web::post().to(orders::assign_driver),
                    )
                    .route(
                        "/{id}/status-history",
                        web::get().to(orders::status_history),
                    ),
            )
            .service(
                web::scope("/payments")
                    .route("/intent", web::post().to(payments::create_intent))
                    .route("/webhook", web::post().to(webhooks::receive_webhook))
                    .route("/{id}", web::get().to(payments::get_intent)),
            );
    }
}

async fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(ApiResponse::<()>::failure("No such route"))
}

/// Build and return an actix-web `Server` bound to `host:port`.
///
/// The caller is responsible for `.await`-ing (or `tokio::spawn`-ing) the
/// returned server.
pub fn build_server(
    state: web::Data<AppState>,
    host: &str,
    port: u16,
) -> std::io::Result<actix_web::dev::Server> {
    Ok(HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .configure(configure(state.clone()))
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", ApiDoc::openapi()),
            )
            .default_service(web::to(not_found))
    })
    .bind((host.to_string(), port))?
    .run())
}
