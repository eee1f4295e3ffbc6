use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use inflight_guard::{InFlightRegistry, LocalInFlightRegistry, PgAdvisoryRegistry};
use recommendation_service::config::{Config, GuardBackend};
use recommendation_service::db::{PgCatalogRepository, PgRecommendationRepository};
use recommendation_service::handlers::{self, AppState};
use recommendation_service::services::{InferenceBridge, ProcessInferenceRunner, RecomputeOrchestrator};

#[actix_web::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("{},actix_web=info,recommendation_service=debug", config.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting recommendation-service");

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&config.database_url)
        .await
        .context("Failed to create PostgreSQL pool")?;
    info!("PostgreSQL connection pool created");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run recommendation-service migrations")?;
    info!("Database migrations applied");

    let catalog = Arc::new(PgCatalogRepository::new(pool.clone(), config.active_status.clone()));
    let store = Arc::new(PgRecommendationRepository::new(pool.clone()));

    let guard: Arc<dyn InFlightRegistry> = match config.guard_backend {
        GuardBackend::Local => Arc::new(LocalInFlightRegistry::new()),
        GuardBackend::Postgres => Arc::new(PgAdvisoryRegistry::new(pool.clone())),
    };
    info!(backend = guard.backend(), "In-flight guard initialized");

    let mut orchestrator = RecomputeOrchestrator::new(
        catalog.clone(),
        store,
        guard,
        config.engine_settings(),
    )
    .with_registry(config.model_registry());

    if config.inference_enabled {
        let settings = config.inference_settings();
        info!(
            program = %settings.program,
            timeout_secs = settings.timeout.as_secs(),
            parallel = config.inference_parallel,
            "Inference bridge enabled"
        );
        let runner = Arc::new(ProcessInferenceRunner::new(settings));
        let bridge = InferenceBridge::new(runner, config.model_switch())
            .with_parallel(config.inference_parallel);
        orchestrator = orchestrator.with_inference(Arc::new(bridge));
    } else {
        info!("Inference bridge disabled, heuristic variants only");
    }

    let state = web::Data::new(AppState {
        orchestrator: Arc::new(orchestrator),
        interactions: catalog,
    });

    let bind_addr = format!("{}:{}", config.http_host, config.http_port);
    info!("Starting HTTP server on {}", bind_addr);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .configure(handlers::configure)
    })
    .bind(&bind_addr)
    .with_context(|| format!("Failed to bind {bind_addr}"))?
    .run()
    .await
    .context("HTTP server error")?;

    Ok(())
}
