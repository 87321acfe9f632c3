use crate::{
    config::Config,
    error::AppError,
    middleware::auth::{Authenticator, JwtValidator},
    services::{ConversationService, JobDirectory, UserDirectory},
    store::ChatStore,
    websocket::{ConnectionRegistry, Gateway},
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub service: ConversationService,
    pub registry: ConnectionRegistry,
    pub gateway: Gateway,
    pub authenticator: Arc<Authenticator>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn ChatStore>,
        users: Arc<dyn UserDirectory>,
        jobs: Arc<dyn JobDirectory>,
    ) -> Result<Self, AppError> {
        let validator = JwtValidator::from_config(&config.jwt_key)?;
        let authenticator = Arc::new(Authenticator::new(validator, users.clone()));
        let service = ConversationService::new(store, users, jobs);
        let registry = ConnectionRegistry::new();
        let gateway = Gateway::new(service.clone(), registry.clone());

        Ok(Self {
            config,
            service,
            registry,
            gateway,
            authenticator,
        })
    }
}
