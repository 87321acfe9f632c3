//! Full-stack realtime tests against a bound server.

mod common;

use actix_web::{web, App, HttpServer};
use alumni_chat_service::client::{ChatClient, ChatClientConfig, ClientEvent, ReconnectPolicy};
use alumni_chat_service::models::ConversationView;
use alumni_chat_service::routes;
use alumni_chat_service::state::AppState;
use alumni_chat_service::websocket::WsOutboundEvent;
use common::{token_for, Fixture};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{accept_async, connect_async, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

fn start(state: AppState) -> SocketAddr {
    let data = web::Data::new(state);
    let server = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .configure(routes::configure)
    })
    .workers(1)
    .bind(("127.0.0.1", 0))
    .expect("bind test server");
    let addr = server.addrs()[0];
    actix_rt::spawn(server.run());
    addr
}

async fn open(addr: SocketAddr, user_id: Uuid) -> Ws {
    let mut request = format!("ws://{addr}/ws").into_client_request().unwrap();
    request.headers_mut().insert(
        "Authorization",
        format!("Bearer {}", token_for(user_id)).parse().unwrap(),
    );
    let (ws, _) = connect_async(request).await.expect("handshake");
    ws
}

async fn send(ws: &mut Ws, event: Value) {
    ws.send(Message::text(event.to_string())).await.unwrap();
}

async fn next_event(ws: &mut Ws) -> Value {
    loop {
        let frame = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for event")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn wait_for_room(state: &AppState, conversation_id: Uuid, size: usize) {
    tokio::time::timeout(WAIT, async {
        while state.registry.room_size(conversation_id).await < size {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("room never filled");
}

async fn conversation(fx: &Fixture, state: &AppState) -> ConversationView {
    state
        .service
        .initiate(&fx.alumni, vec![fx.student.id], None, None)
        .await
        .unwrap()
}

#[actix_rt::test]
async fn test_handshake_requires_token() {
    let fx = Fixture::new();
    let addr = start(fx.app_state());

    match connect_async(format!("ws://{addr}/ws")).await {
        Err(WsError::Http(response)) => assert_eq!(response.status(), StatusCode::UNAUTHORIZED),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("handshake without a token was accepted"),
    }

    match connect_async(format!("ws://{addr}/ws?token=garbage")).await {
        Err(WsError::Http(response)) => assert_eq!(response.status(), StatusCode::UNAUTHORIZED),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("handshake with a bad token was accepted"),
    }

    // Browser clients pass the token in the query string
    let url = format!("ws://{addr}/ws?token={}", token_for(fx.student.id));
    assert!(connect_async(url).await.is_ok());
}

#[actix_rt::test]
async fn test_two_sockets_in_room_exchange_messages() {
    let fx = Fixture::new();
    let state = fx.app_state();
    let addr = start(state.clone());
    let conv = conversation(&fx, &state).await;

    let mut alumni = open(addr, fx.alumni.id).await;
    let mut student = open(addr, fx.student.id).await;
    send(&mut alumni, json!({"type": "joinConversation", "conversationId": conv.id})).await;
    send(&mut student, json!({"type": "joinConversation", "conversationId": conv.id})).await;
    wait_for_room(&state, conv.id, 2).await;

    send(
        &mut alumni,
        json!({"type": "sendMessage", "conversationId": conv.id, "content": "hello"}),
    )
    .await;

    let event = next_event(&mut student).await;
    assert_eq!(event["type"], "message");
    assert_eq!(event["message"]["content"], "hello");
    assert_eq!(event["message"]["conversationId"], conv.id.to_string());
    assert_eq!(event["message"]["sender"]["id"], fx.alumni.id.to_string());

    let echo = next_event(&mut alumni).await;
    assert_eq!(echo["message"]["id"], event["message"]["id"]);
}

#[actix_rt::test]
async fn test_bad_frames_are_reported_without_disconnecting() {
    let fx = Fixture::new();
    let state = fx.app_state();
    let addr = start(state.clone());
    let conv = conversation(&fx, &state).await;

    let mut outsider = open(addr, fx.other_student.id).await;
    outsider.send(Message::text("not json")).await.unwrap();
    let event = next_event(&mut outsider).await;
    assert_eq!(event["type"], "error");

    send(&mut outsider, json!({"type": "joinConversation", "conversationId": conv.id})).await;
    let event = next_event(&mut outsider).await;
    assert_eq!(event["type"], "error");
    assert_eq!(event["code"], "forbidden");
    assert_eq!(event["conversationId"], conv.id.to_string());

    // Still connected and served
    send(&mut outsider, json!({"type": "typing", "conversationId": Uuid::new_v4(), "isTyping": true})).await;
    let event = next_event(&mut outsider).await;
    assert_eq!(event["code"], "not_found");
}

#[actix_rt::test]
async fn test_chat_client_round_trip_over_socket() {
    let fx = Fixture::new();
    let state = fx.app_state();
    let addr = start(state.clone());
    let conv = conversation(&fx, &state).await;

    let mut student = open(addr, fx.student.id).await;
    let mut client = ChatClient::connect(ChatClientConfig::new(
        format!("ws://{addr}/ws"),
        format!("http://{addr}/api/v1"),
        token_for(fx.alumni.id),
    ));
    client.join(conv.id);
    wait_for_room(&state, conv.id, 1).await;

    let client_message_id = client.send(conv.id, "sent from the client");

    // The student is not in the room, so the push arrives as an inbox update
    let event = next_event(&mut student).await;
    assert_eq!(event["type"], "conversationUpdate");
    assert_eq!(event["lastMessage"]["content"], "sent from the client");

    let confirmed = tokio::time::timeout(WAIT, async {
        loop {
            match client.next_event().await {
                Some(ClientEvent::Server(WsOutboundEvent::Message { message })) => break message,
                Some(_) => continue,
                None => panic!("client stopped"),
            }
        }
    })
    .await
    .expect("no confirmation");
    assert_eq!(confirmed.client_message_id.as_deref(), Some(client_message_id.as_str()));

    client.shutdown().await;
}

#[actix_rt::test]
async fn test_chat_client_falls_back_to_http() {
    let fx = Fixture::new();
    let state = fx.app_state();
    let addr = start(state.clone());
    let conv = conversation(&fx, &state).await;

    // The socket endpoint is wrong, the REST endpoint is fine
    let config = ChatClientConfig::new(
        format!("ws://{addr}/not-a-socket"),
        format!("http://{addr}/api/v1"),
        token_for(fx.alumni.id),
    )
    .with_reconnect(ReconnectPolicy {
        base_delay: Duration::from_millis(200),
        max_delay: Duration::from_millis(200),
        max_retries: 50,
        jitter: 0.0,
    });
    let mut client = ChatClient::connect(config);
    let client_message_id = client.send(conv.id, "over http");

    let delivered = tokio::time::timeout(WAIT, async {
        loop {
            match client.next_event().await {
                Some(ClientEvent::SentViaHttp(message)) => break message,
                Some(ClientEvent::SendFailed { error, .. }) => panic!("send failed: {error}"),
                Some(_) => continue,
                None => panic!("client stopped"),
            }
        }
    })
    .await
    .expect("no HTTP delivery");
    assert_eq!(delivered.content, "over http");
    assert_eq!(delivered.client_message_id.as_deref(), Some(client_message_id.as_str()));

    let page = state
        .service
        .list_messages(
            fx.student.id,
            conv.id,
            alumni_chat_service::services::conversation_service::Paging::new(None, None, 50)
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(page.messages.len(), 1);

    client.shutdown().await;
}

/// Socket endpoint that takes every `sendMessage` frame and hangs up without
/// answering, like a connection that dies mid-flight
async fn start_dropping_socket() -> SocketAddr {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(mut ws) = accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(frame)) = ws.next().await {
                    if let Message::Text(text) = frame {
                        if text.as_str().contains("sendMessage") {
                            return;
                        }
                    }
                }
            });
        }
    });
    addr
}

#[actix_rt::test]
async fn test_chat_client_reposts_send_lost_with_socket() {
    let fx = Fixture::new();
    let state = fx.app_state();
    let api = start(state.clone());
    let socket = start_dropping_socket().await;
    let conv = conversation(&fx, &state).await;

    let config = ChatClientConfig::new(
        format!("ws://{socket}/ws"),
        format!("http://{api}/api/v1"),
        token_for(fx.alumni.id),
    )
    .with_reconnect(ReconnectPolicy {
        base_delay: Duration::from_millis(100),
        max_delay: Duration::from_millis(100),
        max_retries: 50,
        jitter: 0.0,
    });
    let mut client = ChatClient::connect(config);
    let client_message_id = client.send(conv.id, "written then lost");

    let delivered = tokio::time::timeout(WAIT, async {
        loop {
            match client.next_event().await {
                Some(ClientEvent::SentViaHttp(message)) => break message,
                Some(ClientEvent::SendFailed { error, .. }) => panic!("send failed: {error}"),
                Some(_) => continue,
                None => panic!("client stopped"),
            }
        }
    })
    .await
    .expect("lost send was never re-posted");
    assert_eq!(delivered.content, "written then lost");
    assert_eq!(delivered.client_message_id.as_deref(), Some(client_message_id.as_str()));

    let page = state
        .service
        .list_messages(
            fx.alumni.id,
            conv.id,
            alumni_chat_service::services::conversation_service::Paging::new(None, None, 50)
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(page.messages.len(), 1);

    client.shutdown().await;
}
