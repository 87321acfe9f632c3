//! Request extractors that enforce authentication at the type level.
//! A handler that takes an [`AuthenticatedUser`] cannot run for an anonymous caller.

use std::future::Future;
use std::pin::Pin;

use crate::error::AppError;
use crate::middleware::auth::bearer_token;
use crate::models::UserProfile;
use crate::state::AppState;
use actix_web::{web, Error, FromRequest, HttpRequest};

/// Caller resolved from the bearer token
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub UserProfile);

impl std::ops::Deref for AuthenticatedUser {
    type Target = UserProfile;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        let token = bearer_token(req);
        let state = req.app_data::<web::Data<AppState>>().cloned();

        Box::pin(async move {
            let state = state.ok_or(AppError::Internal)?;
            let token = token.ok_or(AppError::Unauthenticated)?;
            let user = state.authenticator.resolve_user(&token).await?;
            Ok(AuthenticatedUser(user))
        })
    }
}
