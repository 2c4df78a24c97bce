//! ESG extraction server - main entry point.
//!
//! Starts the Actix-web server with configured routes and middleware.

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, http::header, web};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use esg_extract_lib::api::{self, ApiDoc};
use esg_extract_lib::auth::TokenVerifier;
use esg_extract_lib::config::{Config, REQUEST_ID_HEADER};
use esg_extract_lib::db::DbPool;
use esg_extract_lib::middleware::RequestLogger;
use esg_extract_lib::services::{
    HttpDocumentAi, PipelineContext, S3Storage, SweeperConfig, start_sweeper_task,
};

/// Container health check: succeeds when the configuration loads.
fn health_check() -> bool {
    Config::from_env().is_ok()
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();

    // Used by the Docker HEALTHCHECK
    if std::env::args().any(|arg| arg == "--health-check") {
        std::process::exit(if health_check() { 0 } else { 1 });
    }

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            error!("  - RUST_ENV must be set to 'development' or 'production'");
            error!("  - In production, DATABASE_URL, ESG_JWT_SECRET, ESG_AI_API_KEY and S3 credentials must be set");
            std::process::exit(1);
        }
    };

    info!("========================================");
    info!("  ESG Extraction Server");
    info!("  Environment: {}", config.environment);
    info!("========================================");

    if config.is_development() {
        warn!("Running in DEVELOPMENT mode - do not use in production!");
    }

    let pool = match DbPool::new(&config).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = pool.run_migrations().await {
        error!("{}", e);
        std::process::exit(1);
    }
    info!("Database ready, migrations applied");

    let storage = match S3Storage::new(&config.storage).await {
        Ok(storage) => storage,
        Err(e) => {
            error!("Failed to initialize object storage: {}", e);
            std::process::exit(1);
        }
    };
    let ai = match HttpDocumentAi::new(&config.ai) {
        Ok(ai) => ai,
        Err(e) => {
            error!("Failed to initialize AI client: {}", e);
            std::process::exit(1);
        }
    };

    let ctx = PipelineContext::new(
        Arc::new(pool),
        Arc::new(storage),
        Arc::new(ai),
        config.policy.clone(),
        config.max_upload_size,
    );

    start_sweeper_task(
        ctx.store.clone(),
        SweeperConfig {
            stale_after: config.policy.stale_attempt_after,
            interval: config.policy.sweep_interval,
        },
    );

    let verifier = TokenVerifier::new(&config.auth);
    let bind_address = config.bind_address();
    let is_development = config.is_development();
    let max_upload_size = config.max_upload_size;

    let worker_count = if is_development { 4 } else { num_cpus::get() };
    info!(
        "Starting server at http://{} ({} workers, {}MB max upload)",
        bind_address,
        worker_count,
        max_upload_size / 1024 / 1024
    );

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_methods(vec!["GET", "POST", "OPTIONS"])
            .allowed_headers(vec![
                header::AUTHORIZATION,
                header::ACCEPT,
                header::CONTENT_TYPE,
                header::HeaderName::from_static(REQUEST_ID_HEADER),
            ])
            .expose_headers(vec![REQUEST_ID_HEADER])
            .max_age(3600);
        let cors = if is_development {
            cors.allowed_origin("http://localhost:3000")
                .allowed_origin("http://127.0.0.1:3000")
        } else {
            cors
        };

        App::new()
            .wrap(cors)
            .wrap(RequestLogger)
            .app_data(web::Data::new(ctx.clone()))
            .app_data(web::Data::new(verifier.clone()))
            // Multipart streams are size-checked while read; this bounds JSON bodies
            .app_data(web::JsonConfig::default().limit(1024 * 1024))
            .service(web::scope("/api/v1").configure(api::configure_api_routes))
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", ApiDoc::openapi()),
            )
    })
    .workers(worker_count)
    .bind(&bind_address)?
    .run()
    .await
}
