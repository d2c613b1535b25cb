use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::{
    colorization::ColorizationApi,
    flow::ColorizationFlow,
    identity::{IdentityProvider, StaticIdentity},
};

/// Shared clients built once from configuration.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub identity: Arc<dyn IdentityProvider>,
    pub api: Arc<ColorizationApi>,
    pub flow: Arc<ColorizationFlow>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Result<Self, StateError> {
        let identity: Arc<dyn IdentityProvider> = Arc::new(StaticIdentity::new(
            config.api_token.clone(),
            config.user_id.clone(),
            config.user_email.clone(),
        ));
        Self::with_identity(config, identity)
    }

    /// Build with an externally managed identity provider.
    pub fn with_identity(config: AppConfig, identity: Arc<dyn IdentityProvider>) -> Result<Self, StateError> {
        let poll = config.poll_config().map_err(StateError::Policy)?;
        let progress = config.progress_config().map_err(StateError::Policy)?;

        let api = Arc::new(ColorizationApi::new(
            &config.api_base_url,
            identity.clone(),
            config.request_timeout(),
        )?);
        let flow = Arc::new(ColorizationFlow::new(api.clone(), poll, progress));

        Ok(Self {
            config: Arc::new(config),
            identity,
            api,
            flow,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Invalid polling or progress settings: {0}")]
    Policy(garde::Report),

    #[error("Failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}
