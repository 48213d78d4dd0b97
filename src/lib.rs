pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod utils;

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::Result;
use crate::services::{
    allow_list_service::TelegramAuthorizer, session_service::SessionService,
    telegram_service::TelegramService,
};
use crate::utils::telegram_auth::WebAppVerifier;
use reqwest::Client;

#[derive(Clone)]
pub struct AppState {
    pub verifier: Arc<WebAppVerifier>,
    pub authorizer: Arc<dyn TelegramAuthorizer>,
    pub sessions: SessionService,
    pub telegram_service: TelegramService,
    pub allow_list_timeout: Duration,
}

impl AppState {
    pub fn new(config: &Config, authorizer: Arc<dyn TelegramAuthorizer>) -> Result<Self> {
        let verifier = WebAppVerifier::new(&config.telegram_bot_token)?
            .with_max_age(config.telegram_auth_max_age);

        let http_client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            verifier: Arc::new(verifier),
            authorizer,
            sessions: SessionService::new(&config.jwt_secret, config.session_ttl_minutes),
            telegram_service: TelegramService::new(
                http_client,
                config.telegram_api_base.clone(),
                config.telegram_bot_token.clone(),
            ),
            allow_list_timeout: config.allow_list_timeout,
        })
    }
}
