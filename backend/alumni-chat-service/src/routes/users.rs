use crate::{error::AppError, middleware::guards::AuthenticatedUser, state::AppState};
use actix_web::{get, web, HttpResponse};
use serde::Deserialize;

#[derive(Deserialize)]
pub struct EligibleQuery {
    #[serde(default)]
    pub q: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

/// GET /api/v1/users/eligible?q=&limit=
///
/// People the caller may start a conversation with.
#[get("/users/eligible")]
pub async fn eligible_users(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    query: web::Query<EligibleQuery>,
) -> Result<HttpResponse, AppError> {
    let users = state
        .service
        .eligible_users(&user, &query.q, query.limit)
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "users": users })))
}
