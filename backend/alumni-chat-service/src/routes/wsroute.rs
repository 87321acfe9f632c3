use crate::error::AppError;
use crate::middleware::auth::ws_token;
use crate::models::UserProfile;
use crate::state::AppState;
use crate::websocket::{ConnectionId, ConnectionRegistry, Gateway, WsInboundEvent, WsOutboundEvent};
use actix::{fut, Actor, ActorContext, AsyncContext, StreamHandler};
use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// One authenticated realtime connection.
///
/// Inbound frames are handled one at a time: the actor waits for each event
/// to complete before reading the next, so a connection's events keep their
/// order. Outbound events arrive through the registry queue, consumed as a
/// stream.
struct WsSession {
    conn_id: ConnectionId,
    user: UserProfile,
    gateway: Gateway,
    registry: ConnectionRegistry,
    outbound: Option<UnboundedReceiver<String>>,
    hb: Instant,
    heartbeat_interval: Duration,
    client_timeout: Duration,
}

impl WsSession {
    fn new(
        conn_id: ConnectionId,
        user: UserProfile,
        state: &AppState,
        outbound: UnboundedReceiver<String>,
    ) -> Self {
        Self {
            conn_id,
            user,
            gateway: state.gateway.clone(),
            registry: state.registry.clone(),
            outbound: Some(outbound),
            hb: Instant::now(),
            heartbeat_interval: Duration::from_secs(state.config.ws.heartbeat_interval_secs),
            client_timeout: Duration::from_secs(state.config.ws.client_timeout_secs),
        }
    }

    /// Transport keep-alive only; an idle client that still answers pings stays connected.
    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(self.heartbeat_interval, |act, ctx| {
            if Instant::now().duration_since(act.hb) > act.client_timeout {
                tracing::warn!(user_id = %act.user.id, "WebSocket heartbeat failed, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn dispatch(&mut self, event: WsInboundEvent, ctx: &mut ws::WebsocketContext<Self>) {
        let gateway = self.gateway.clone();
        let user = self.user.clone();
        let conn_id = self.conn_id;
        ctx.wait(fut::wrap_future(async move {
            gateway.handle(conn_id, &user, event).await;
        }));
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(
            user_id = %self.user.id,
            connection_id = %self.conn_id,
            "WebSocket session started"
        );
        self.hb(ctx);
        if let Some(rx) = self.outbound.take() {
            ctx.add_stream(UnboundedReceiverStream::new(rx));
        }
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(
            user_id = %self.user.id,
            connection_id = %self.conn_id,
            "WebSocket session stopped"
        );

        let registry = self.registry.clone();
        let conn_id = self.conn_id;
        actix::spawn(async move {
            registry.unregister(conn_id).await;
        });
    }
}

/// Outbound events queued by the registry
impl StreamHandler<String> for WsSession {
    fn handle(&mut self, payload: String, ctx: &mut Self::Context) {
        ctx.text(payload);
    }

    fn finished(&mut self, ctx: &mut Self::Context) {
        // Registry dropped our queue: server shutdown or pruned connection
        ctx.close(Some(ws::CloseReason {
            code: ws::CloseCode::Away,
            description: Some("server closing connection".into()),
        }));
        ctx.stop();
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.hb = Instant::now();
                match serde_json::from_str::<WsInboundEvent>(&text) {
                    Ok(event) => self.dispatch(event, ctx),
                    Err(e) => {
                        tracing::debug!(user_id = %self.user.id, error = %e, "unparseable frame");
                        ctx.text(
                            WsOutboundEvent::protocol_error(format!("invalid event: {e}")).to_text(),
                        );
                    }
                }
            }
            Ok(ws::Message::Binary(_)) | Ok(ws::Message::Continuation(_)) => {
                ctx.text(
                    WsOutboundEvent::protocol_error("binary frames are not supported").to_text(),
                );
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Nop) => {}
            Err(e) => {
                tracing::warn!(user_id = %self.user.id, error = %e, "WebSocket protocol error");
                ctx.stop();
            }
        }
    }
}

/// GET /ws
///
/// The bearer token is checked before the upgrade; an invalid or missing
/// token gets a 401 and no socket.
#[get("/ws")]
pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let token = ws_token(&req).ok_or(AppError::Unauthenticated)?;
    let user = state.authenticator.resolve_user(&token).await?;

    let (conn_id, rx) = state.registry.register(user.id).await;
    let session = WsSession::new(conn_id, user, &state, rx);

    match ws::start(session, &req, stream) {
        Ok(resp) => Ok(resp),
        Err(e) => {
            state.registry.unregister(conn_id).await;
            Err(e)
        }
    }
}
