//! Realtime client with reconnect and HTTP fallback.
//!
//! One background task owns the socket. Callers talk to it through a command
//! channel and read [`ClientEvent`]s back. Joined rooms are remembered and
//! re-joined after every reconnect. A send that cannot go over the socket is
//! posted to the REST endpoint with the same `clientMessageId`, so the server
//! stores it once whichever path lands first. Socket sends stay outstanding
//! until the server echoes them back; whatever is outstanding when the socket
//! drops is re-posted over REST.

use super::reconnect::{ConnectionStatus, ReconnectPolicy};
use crate::models::MessageView;
use crate::websocket::message_types::{WsInboundEvent, WsOutboundEvent};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct ChatClientConfig {
    /// e.g. `ws://localhost:8085/ws`
    pub ws_url: String,
    /// e.g. `http://localhost:8085/api/v1`
    pub api_base_url: String,
    pub token: String,
    pub reconnect: ReconnectPolicy,
    pub http_timeout: Duration,
}

impl ChatClientConfig {
    pub fn new(
        ws_url: impl Into<String>,
        api_base_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            ws_url: ws_url.into(),
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            reconnect: ReconnectPolicy::default(),
            http_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    Join(Uuid),
    Leave(Uuid),
    Send {
        conversation_id: Uuid,
        content: String,
        client_message_id: String,
    },
    Typing {
        conversation_id: Uuid,
        is_typing: bool,
    },
    /// Start a fresh round of attempts after retries were exhausted
    Reconnect,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Status(ConnectionStatus),
    Server(WsOutboundEvent),
    /// Server copy of a message that went through the REST fallback
    SentViaHttp(MessageView),
    SendFailed {
        conversation_id: Uuid,
        client_message_id: String,
        error: String,
    },
}

/// Handle to the background connection task
pub struct ChatClient {
    commands: mpsc::UnboundedSender<ClientCommand>,
    events: mpsc::UnboundedReceiver<ClientEvent>,
    task: JoinHandle<()>,
}

impl ChatClient {
    /// Spawn the connection task on the current tokio runtime
    pub fn connect(config: ChatClientConfig) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(config, command_rx, event_tx));
        Self {
            commands: command_tx,
            events: event_rx,
            task,
        }
    }

    pub fn join(&self, conversation_id: Uuid) {
        self.command(ClientCommand::Join(conversation_id));
    }

    pub fn leave(&self, conversation_id: Uuid) {
        self.command(ClientCommand::Leave(conversation_id));
    }

    /// Send with a fresh client message id and return it
    pub fn send(&self, conversation_id: Uuid, content: impl Into<String>) -> String {
        let client_message_id = Uuid::new_v4().to_string();
        self.send_with_id(conversation_id, content, client_message_id.clone());
        client_message_id
    }

    /// Send (or resend) with a caller-chosen client message id
    pub fn send_with_id(
        &self,
        conversation_id: Uuid,
        content: impl Into<String>,
        client_message_id: String,
    ) {
        self.command(ClientCommand::Send {
            conversation_id,
            content: content.into(),
            client_message_id,
        });
    }

    pub fn typing(&self, conversation_id: Uuid, is_typing: bool) {
        self.command(ClientCommand::Typing {
            conversation_id,
            is_typing,
        });
    }

    pub fn reconnect(&self) {
        self.command(ClientCommand::Reconnect);
    }

    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        self.events.recv().await
    }

    pub async fn shutdown(self) {
        self.command(ClientCommand::Shutdown);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "chat client task ended abnormally");
        }
    }

    fn command(&self, command: ClientCommand) {
        if self.commands.send(command).is_err() {
            tracing::debug!("chat client task already stopped");
        }
    }
}

enum SessionEnd {
    Dropped,
    Shutdown,
}

enum Wait {
    Elapsed,
    Reconnect,
    Shutdown,
}

/// A socket send the server has not echoed back yet
#[derive(Debug, Clone, PartialEq)]
struct OutstandingSend {
    conversation_id: Uuid,
    content: String,
    client_message_id: String,
}

/// Shared between the socket session and the offline waits
struct Worker {
    config: ChatClientConfig,
    http: reqwest::Client,
    events: mpsc::UnboundedSender<ClientEvent>,
    joined: HashSet<Uuid>,
    // In send order
    outstanding: Vec<OutstandingSend>,
}

async fn run(
    config: ChatClientConfig,
    mut commands: mpsc::UnboundedReceiver<ClientCommand>,
    events: mpsc::UnboundedSender<ClientEvent>,
) {
    let http = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "falling back to default HTTP client");
            reqwest::Client::new()
        });
    let mut worker = Worker {
        config,
        http,
        events,
        joined: HashSet::new(),
        outstanding: Vec::new(),
    };
    let mut attempt = 0u32;

    loop {
        worker.emit(ClientEvent::Status(if attempt == 0 {
            ConnectionStatus::Connecting
        } else {
            ConnectionStatus::Reconnecting { attempt }
        }));

        match open_socket(&worker.config).await {
            Ok(socket) => {
                attempt = 0;
                tracing::info!(url = %worker.config.ws_url, "chat socket connected");
                worker.emit(ClientEvent::Status(ConnectionStatus::Connected));
                match worker.session(socket, &mut commands).await {
                    SessionEnd::Shutdown => break,
                    SessionEnd::Dropped => {
                        tracing::warn!(
                            outstanding = worker.outstanding.len(),
                            "chat socket dropped"
                        );
                        worker.resend_outstanding().await;
                    }
                }
            }
            Err(WsError::Http(response)) if response.status() == StatusCode::UNAUTHORIZED => {
                // Retrying with the same token cannot succeed
                tracing::warn!("chat socket rejected credentials");
                worker.emit(ClientEvent::Status(ConnectionStatus::Disconnected));
                match worker.offline(&mut commands, None).await {
                    Wait::Reconnect => {
                        attempt = 0;
                        continue;
                    }
                    _ => break,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, attempt, "chat socket connect failed");
            }
        }

        attempt += 1;
        let delay = worker.config.reconnect.delay_for(attempt);
        if delay.is_none() {
            worker.emit(ClientEvent::Status(ConnectionStatus::Disconnected));
        }
        match worker.offline(&mut commands, delay).await {
            Wait::Elapsed => {}
            Wait::Reconnect => attempt = 0,
            Wait::Shutdown => break,
        }
    }

    worker.emit(ClientEvent::Status(ConnectionStatus::Disconnected));
}

async fn open_socket(config: &ChatClientConfig) -> Result<Socket, WsError> {
    let mut request = config.ws_url.as_str().into_client_request()?;
    let bearer = HeaderValue::from_str(&format!("Bearer {}", config.token))
        .map_err(|e| WsError::HttpFormat(e.into()))?;
    request.headers_mut().insert(AUTHORIZATION, bearer);
    let (socket, _response) = connect_async(request).await?;
    Ok(socket)
}

impl Worker {
    fn emit(&self, event: ClientEvent) {
        // The handle may be gone while the task drains; nothing to tell then
        let _ = self.events.send(event);
    }

    async fn session(
        &mut self,
        socket: Socket,
        commands: &mut mpsc::UnboundedReceiver<ClientCommand>,
    ) -> SessionEnd {
        let (mut write, mut read) = socket.split();

        let rejoin: Vec<Uuid> = self.joined.iter().copied().collect();
        for conversation_id in rejoin {
            let frame = frame(&WsInboundEvent::JoinConversation { conversation_id });
            if write.send(frame).await.is_err() {
                return SessionEnd::Dropped;
            }
        }

        loop {
            tokio::select! {
                incoming = read.next() => match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        match serde_json::from_str::<WsOutboundEvent>(text.as_str()) {
                            Ok(event) => {
                                self.acknowledge(&event);
                                self.emit(ClientEvent::Server(event));
                            }
                            Err(e) => tracing::debug!(error = %e, "ignoring unrecognised server event"),
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => return SessionEnd::Dropped,
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "chat socket read failed");
                        return SessionEnd::Dropped;
                    }
                    Some(Ok(_)) => {}
                },
                command = commands.recv() => match command {
                    None | Some(ClientCommand::Shutdown) => {
                        let _ = write.send(WsMessage::Close(None)).await;
                        return SessionEnd::Shutdown;
                    }
                    Some(ClientCommand::Reconnect) => {}
                    Some(ClientCommand::Send { conversation_id, content, client_message_id }) => {
                        let event = WsInboundEvent::SendMessage {
                            conversation_id,
                            content: content.clone(),
                            message_type: None,
                            client_message_id: Some(client_message_id.clone()),
                        };
                        if write.send(frame(&event)).await.is_err() {
                            self.send_over_http(conversation_id, content, client_message_id).await;
                            return SessionEnd::Dropped;
                        }
                        self.outstanding.push(OutstandingSend {
                            conversation_id,
                            content,
                            client_message_id,
                        });
                    }
                    Some(command) => {
                        if let Some(event) = self.track(command) {
                            if write.send(frame(&event)).await.is_err() {
                                return SessionEnd::Dropped;
                            }
                        }
                    }
                },
            }
        }
    }

    /// Serve commands while the socket is down. With `delay` set, returns
    /// once it elapses; without, waits for a reconnect request.
    async fn offline(
        &mut self,
        commands: &mut mpsc::UnboundedReceiver<ClientCommand>,
        delay: Option<Duration>,
    ) -> Wait {
        let sleep = tokio::time::sleep(delay.unwrap_or_default());
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep, if delay.is_some() => return Wait::Elapsed,
                command = commands.recv() => match command {
                    None | Some(ClientCommand::Shutdown) => return Wait::Shutdown,
                    Some(ClientCommand::Reconnect) => return Wait::Reconnect,
                    Some(ClientCommand::Send { conversation_id, content, client_message_id }) => {
                        self.send_over_http(conversation_id, content, client_message_id).await;
                    }
                    Some(command) => {
                        // Room changes apply on the next connect; typing is dropped
                        self.track(command);
                    }
                },
            }
        }
    }

    /// Settle the outstanding send a server echo confirms
    fn acknowledge(&mut self, event: &WsOutboundEvent) {
        let confirmed = match event {
            WsOutboundEvent::Message { message } => message.client_message_id.as_deref(),
            WsOutboundEvent::ConversationUpdate { last_message, .. } => {
                last_message.client_message_id.as_deref()
            }
            WsOutboundEvent::UserTyping { .. } | WsOutboundEvent::Error { .. } => None,
        };
        if let Some(client_message_id) = confirmed {
            self.outstanding
                .retain(|send| send.client_message_id != client_message_id);
        }
    }

    /// Re-post sends written to a socket that dropped before echoing them.
    /// The server keys on the client message id, so a send that did land is
    /// returned rather than stored twice.
    async fn resend_outstanding(&mut self) {
        for send in std::mem::take(&mut self.outstanding) {
            self.send_over_http(send.conversation_id, send.content, send.client_message_id)
                .await;
        }
    }

    /// Update the joined set and build the frame for a room or typing command
    fn track(&mut self, command: ClientCommand) -> Option<WsInboundEvent> {
        match command {
            ClientCommand::Join(conversation_id) => {
                self.joined.insert(conversation_id);
                Some(WsInboundEvent::JoinConversation { conversation_id })
            }
            ClientCommand::Leave(conversation_id) => {
                self.joined.remove(&conversation_id);
                Some(WsInboundEvent::LeaveConversation { conversation_id })
            }
            ClientCommand::Typing {
                conversation_id,
                is_typing,
            } => Some(WsInboundEvent::Typing {
                conversation_id,
                is_typing,
            }),
            ClientCommand::Send { .. } | ClientCommand::Reconnect | ClientCommand::Shutdown => {
                None
            }
        }
    }

    async fn send_over_http(
        &self,
        conversation_id: Uuid,
        content: String,
        client_message_id: String,
    ) {
        let result = post_message(
            &self.http,
            &self.config,
            conversation_id,
            &content,
            &client_message_id,
        )
        .await;
        match result {
            Ok(message) => self.emit(ClientEvent::SentViaHttp(message)),
            Err(error) => {
                tracing::warn!(%conversation_id, %client_message_id, %error, "HTTP send failed");
                self.emit(ClientEvent::SendFailed {
                    conversation_id,
                    client_message_id,
                    error,
                });
            }
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendBody<'a> {
    content: &'a str,
    client_message_id: &'a str,
}

async fn post_message(
    http: &reqwest::Client,
    config: &ChatClientConfig,
    conversation_id: Uuid,
    content: &str,
    client_message_id: &str,
) -> Result<MessageView, String> {
    let url = format!(
        "{}/conversations/{}/messages",
        config.api_base_url, conversation_id
    );
    let response = http
        .post(&url)
        .bearer_auth(&config.token)
        .json(&SendBody {
            content,
            client_message_id,
        })
        .send()
        .await
        .map_err(|e| e.to_string())?;

    let status = response.status();
    if !status.is_success() {
        let body: serde_json::Value = response.json().await.unwrap_or_default();
        let message = body
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("request failed");
        return Err(format!("{}: {}", status.as_u16(), message));
    }

    response
        .json::<MessageView>()
        .await
        .map_err(|e| format!("invalid response: {e}"))
}

fn frame(event: &WsInboundEvent) -> WsMessage {
    match serde_json::to_string(event) {
        Ok(text) => WsMessage::text(text),
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize client event");
            WsMessage::text("{}")
        }
    }
}
