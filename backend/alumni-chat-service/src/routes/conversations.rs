use crate::{
    error::AppError,
    middleware::guards::AuthenticatedUser,
    services::conversation_service::{Paging, DEFAULT_CONVERSATION_PAGE_SIZE},
    state::AppState,
};
use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationRequest {
    pub participant_ids: Vec<Uuid>,
    #[serde(default)]
    pub job_id: Option<Uuid>,
    #[serde(default)]
    pub application_id: Option<Uuid>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortlistRequest {
    pub job_id: Uuid,
    pub application_id: Uuid,
    pub applicant_id: Uuid,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

/// POST /api/v1/conversations
///
/// 409 with `resource_id` when an active conversation with the same
/// participants exists.
#[post("/conversations")]
pub async fn create_conversation(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<CreateConversationRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let view = state
        .service
        .initiate(&user, body.participant_ids, body.job_id, body.application_id)
        .await?;
    Ok(HttpResponse::Created().json(view))
}

/// POST /api/v1/conversations/shortlist
#[post("/conversations/shortlist")]
pub async fn create_from_shortlist(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<ShortlistRequest>,
) -> Result<HttpResponse, AppError> {
    let view = state
        .service
        .initiate_from_shortlist(&user, body.job_id, body.application_id, body.applicant_id)
        .await?;

    // The applicant learns about the new thread on their personal channel
    if let Some(last_message) = &view.last_message {
        let payload = crate::websocket::WsOutboundEvent::ConversationUpdate {
            conversation_id: view.id,
            last_message: last_message.clone(),
        }
        .to_text();
        state.registry.send_to_user(body.applicant_id, &payload).await;
    }

    Ok(HttpResponse::Created().json(view))
}

/// GET /api/v1/conversations?page=&pageSize=
#[get("/conversations")]
pub async fn list_conversations(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    let paging = Paging::new(query.page, query.page_size, DEFAULT_CONVERSATION_PAGE_SIZE)?;
    let conversations = state.service.list_for_user(user.id, paging).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "conversations": conversations,
        "page": paging.page,
        "pageSize": paging.page_size,
    })))
}

/// GET /api/v1/conversations/{id}
#[get("/conversations/{id}")]
pub async fn get_conversation(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let view = state
        .service
        .get_conversation(user.id, path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(view))
}

/// POST /api/v1/conversations/{id}/close
///
/// Idempotent: closing a closed conversation returns it unchanged.
#[post("/conversations/{id}/close")]
pub async fn close_conversation(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let view = state
        .service
        .close_conversation(&user, path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(view))
}
