pub mod config;
pub mod error;
pub mod extractors;
pub mod openapi;
pub mod response;

use std::sync::Arc;

use crate::challenge::store::ChallengeStore;
use crate::edge::client::InferenceClient;
use crate::stages::registry::StageRegistry;
use config::Config;

/// Shared state for the Inference Gateway.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub stages: Arc<StageRegistry>,
    pub challenges: Arc<ChallengeStore>,
}

/// Shared state for the Edge Gateway.
#[derive(Clone)]
pub struct EdgeState {
    pub config: Arc<Config>,
    pub client: InferenceClient,
}
