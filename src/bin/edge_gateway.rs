use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kyc_gateway::core::config::Config;
use kyc_gateway::core::EdgeState;
use kyc_gateway::edge::client::InferenceClient;
use kyc_gateway::edge::handlers;

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

    let http = reqwest::Client::new();
    let client = InferenceClient::new(http, config.inference_gateway_url.clone());

    let state = EdgeState {
        config: Arc::clone(&config),
        client,
    };

    let cors = if config.cors_allowed_origins.iter().any(|o| o == "*") {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    };

    let max_body_bytes = config.max_upload_size_bytes();

    let app = Router::new()
        .merge(handlers::routes())
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(cors)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(config.server_address()).await?;
    info!("edge gateway listening on {}", config.server_address());
    axum::serve(listener, app).await?;

    Ok(())
}
