pub mod conversations;
pub mod messages;
pub mod users;
pub mod wsroute;

use crate::error::AppError;
use actix_web::{get, web, HttpResponse};

#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().body("OK")
}

/// Register every route. Shared by the binary and the integration tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _| AppError::InvalidArgument(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _| AppError::InvalidArgument(err.to_string()).into()),
    )
    .service(health)
    .service(wsroute::ws_handler)
    .service(
        web::scope("/api/v1")
            .service(conversations::create_conversation)
            .service(conversations::create_from_shortlist)
            .service(conversations::list_conversations)
            .service(conversations::get_conversation)
            .service(conversations::close_conversation)
            .service(messages::list_messages)
            .service(messages::send_message)
            .service(users::eligible_users),
    );
}
