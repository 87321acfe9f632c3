use crate::{
    error::AppError,
    middleware::guards::AuthenticatedUser,
    models::MessageType,
    routes::conversations::PageQuery,
    services::conversation_service::{Paging, DEFAULT_MESSAGE_PAGE_SIZE},
    state::AppState,
    websocket::events::publish_message,
};
use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(default, rename = "type")]
    pub message_type: Option<MessageType>,
    #[serde(default)]
    pub client_message_id: Option<String>,
}

/// GET /api/v1/conversations/{id}/messages?page=&pageSize=
///
/// Oldest first within the page. Marks the caller's unread messages as read.
#[get("/conversations/{id}/messages")]
pub async fn list_messages(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    let paging = Paging::new(query.page, query.page_size, DEFAULT_MESSAGE_PAGE_SIZE)?;
    let page = state
        .service
        .list_messages(user.id, path.into_inner(), paging)
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

/// POST /api/v1/conversations/{id}/messages
///
/// 201 for a new message, 200 when `clientMessageId` was already accepted.
/// New messages are pushed to live connections like realtime sends.
#[post("/conversations/{id}/messages")]
pub async fn send_message(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    body: web::Json<SendMessageRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let outcome = state
        .service
        .append_message(
            &user,
            path.into_inner(),
            &body.content,
            body.message_type.unwrap_or_default(),
            body.client_message_id,
        )
        .await?;

    if outcome.created {
        publish_message(&state.registry, &outcome.conversation, &outcome.message).await;
        Ok(HttpResponse::Created().json(outcome.message))
    } else {
        Ok(HttpResponse::Ok().json(outcome.message))
    }
}
