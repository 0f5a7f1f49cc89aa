use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use kyc_gateway::challenge::store::ChallengeStore;
use kyc_gateway::core::config::Config;
use kyc_gateway::core::openapi::ApiDoc;
use kyc_gateway::core::AppState;
use kyc_gateway::kyc::handlers;
use kyc_gateway::stages::registry::StageRegistry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kyc_gateway=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(Config::from_env()?);
    info!("configuration loaded");

    let stages = Arc::new(StageRegistry::new(&config));
    let challenges = Arc::new(ChallengeStore::new(
        &config.hmac_secret,
        config.challenge_ttl_seconds,
        config.challenge_count,
    ));

    let state = AppState {
        config: Arc::clone(&config),
        stages,
        challenges: Arc::clone(&challenges),
    };

    spawn_challenge_sweeper(Arc::clone(&challenges));

    let cors = if config.cors_allowed_origins.iter().any(|o| o == "*") {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    };

    let max_body_bytes = config.max_upload_size_bytes();

    let app = Router::new()
        .route("/health", axum::routing::get(root_health))
        .nest("/api/v1", handlers::routes())
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(cors)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(config.server_address()).await?;
    info!("inference gateway listening on {}", config.server_address());
    axum::serve(listener, app).await?;

    Ok(())
}

async fn root_health() -> &'static str {
    "ok"
}

/// Background sweep bounding Challenge Store memory beyond the
/// opportunistic per-mutation sweep (§4.6).
fn spawn_challenge_sweeper(challenges: Arc<ChallengeStore>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(30));
        loop {
            interval.tick().await;
            challenges.sweep();
        }
    });
}
