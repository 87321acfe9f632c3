use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    RwLock,
};
use uuid::Uuid;

pub mod events;
pub mod handlers;
pub mod message_types;

pub use handlers::Gateway;
pub use message_types::{WsInboundEvent, WsOutboundEvent};

/// Unique identifier for one live WebSocket connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Name of the per-user notification channel
pub fn personal_channel(user_id: Uuid) -> String {
    format!("user:{user_id}")
}

struct Connection {
    user_id: Uuid,
    sender: UnboundedSender<String>,
    rooms: HashSet<Uuid>,
}

#[derive(Default)]
struct Inner {
    connections: HashMap<ConnectionId, Connection>,
    // conversation_id -> connections currently viewing it
    rooms: HashMap<Uuid, HashSet<ConnectionId>>,
    // user_id -> connections (the user's personal channel)
    users: HashMap<Uuid, HashSet<ConnectionId>>,
    shut_down: bool,
}

impl Inner {
    fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        let connection = self.connections.remove(&id)?;
        for room in &connection.rooms {
            if let Some(members) = self.rooms.get_mut(room) {
                members.remove(&id);
                if members.is_empty() {
                    self.rooms.remove(room);
                }
            }
        }
        if let Some(conns) = self.users.get_mut(&connection.user_id) {
            conns.remove(&id);
            if conns.is_empty() {
                self.users.remove(&connection.user_id);
            }
        }
        Some(connection)
    }

    /// Send to each target, dropping connections whose receiver is gone
    fn deliver(&mut self, targets: Vec<ConnectionId>, payload: &str) -> usize {
        let mut delivered = 0;
        let mut dead = Vec::new();
        for id in targets {
            match self.connections.get(&id) {
                Some(conn) if conn.sender.send(payload.to_string()).is_ok() => delivered += 1,
                Some(_) => dead.push(id),
                None => {}
            }
        }
        if !dead.is_empty() {
            tracing::debug!("{} dead connections cleaned up during delivery", dead.len());
            for id in dead {
                self.remove(id);
            }
        }
        delivered
    }
}

/// Room and personal-channel index for live connections.
///
/// The registry is a transient cache over persisted membership: it decides
/// where to push events, never who may see them. Created at server start,
/// shared through `AppState`, and torn down with [`ConnectionRegistry::shutdown`].
#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an authenticated connection and subscribe it to the user's
    /// personal channel.
    ///
    /// Returns the connection id and the receiving half of its outbound queue.
    /// After shutdown the receiver is already closed.
    pub async fn register(&self, user_id: Uuid) -> (ConnectionId, UnboundedReceiver<String>) {
        let (tx, rx) = unbounded_channel();
        let id = ConnectionId::new();

        let mut guard = self.inner.write().await;
        if guard.shut_down {
            return (id, rx);
        }
        guard.connections.insert(
            id,
            Connection {
                user_id,
                sender: tx,
                rooms: HashSet::new(),
            },
        );
        guard.users.entry(user_id).or_default().insert(id);

        tracing::debug!(
            connection_id = %id,
            channel = %personal_channel(user_id),
            "connection registered, total connections: {}",
            guard.connections.len()
        );
        (id, rx)
    }

    /// Subscribe a connection to a conversation room. Returns `false` if the
    /// connection is no longer registered.
    pub async fn join(&self, id: ConnectionId, conversation_id: Uuid) -> bool {
        let mut guard = self.inner.write().await;
        match guard.connections.get_mut(&id) {
            Some(conn) => {
                conn.rooms.insert(conversation_id);
            }
            None => return false,
        }
        guard.rooms.entry(conversation_id).or_default().insert(id);
        tracing::debug!(
            connection_id = %id,
            conversation_id = %conversation_id,
            "joined room, room size: {}",
            guard.rooms.get(&conversation_id).map(|r| r.len()).unwrap_or(0)
        );
        true
    }

    /// Unsubscribe from a room; a no-op for rooms never joined
    pub async fn leave(&self, id: ConnectionId, conversation_id: Uuid) {
        let mut guard = self.inner.write().await;
        if let Some(conn) = guard.connections.get_mut(&id) {
            conn.rooms.remove(&conversation_id);
        }
        if let Some(members) = guard.rooms.get_mut(&conversation_id) {
            members.remove(&id);
            if members.is_empty() {
                guard.rooms.remove(&conversation_id);
            }
        }
    }

    /// Remove a connection from every room and from its personal channel.
    ///
    /// Must be called when a WebSocket connection closes.
    pub async fn unregister(&self, id: ConnectionId) {
        let mut guard = self.inner.write().await;
        if let Some(conn) = guard.remove(id) {
            tracing::debug!(
                connection_id = %id,
                user_id = %conn.user_id,
                "connection unregistered, remaining: {}",
                guard.connections.len()
            );
        }
    }

    /// Push to every connection in a room, optionally skipping one
    pub async fn broadcast_to_room(
        &self,
        conversation_id: Uuid,
        payload: &str,
        exclude: Option<ConnectionId>,
    ) -> usize {
        let mut guard = self.inner.write().await;
        let targets: Vec<ConnectionId> = match guard.rooms.get(&conversation_id) {
            Some(members) => members
                .iter()
                .copied()
                .filter(|id| Some(*id) != exclude)
                .collect(),
            None => return 0,
        };
        guard.deliver(targets, payload)
    }

    /// Push to a room with one payload for `owner`'s connections and another
    /// for everyone else's
    pub async fn broadcast_to_room_split(
        &self,
        conversation_id: Uuid,
        owner: Uuid,
        owner_payload: &str,
        others_payload: &str,
    ) -> usize {
        let mut guard = self.inner.write().await;
        let (own, others): (Vec<ConnectionId>, Vec<ConnectionId>) =
            match guard.rooms.get(&conversation_id) {
                Some(members) => members.iter().copied().partition(|id| {
                    guard.connections.get(id).map(|c| c.user_id) == Some(owner)
                }),
                None => return 0,
            };
        guard.deliver(own, owner_payload) + guard.deliver(others, others_payload)
    }

    /// Push to a user's personal channel (all of their connections)
    pub async fn send_to_user(&self, user_id: Uuid, payload: &str) -> usize {
        let mut guard = self.inner.write().await;
        let targets: Vec<ConnectionId> = match guard.users.get(&user_id) {
            Some(conns) => conns.iter().copied().collect(),
            None => return 0,
        };
        guard.deliver(targets, payload)
    }

    /// Push to a single connection
    pub async fn send_to_connection(&self, id: ConnectionId, payload: &str) -> bool {
        let mut guard = self.inner.write().await;
        guard.deliver(vec![id], payload) == 1
    }

    /// Users with at least one connection joined to the room
    pub async fn users_in_room(&self, conversation_id: Uuid) -> HashSet<Uuid> {
        let guard = self.inner.read().await;
        guard
            .rooms
            .get(&conversation_id)
            .map(|members| {
                members
                    .iter()
                    .filter_map(|id| guard.connections.get(id).map(|c| c.user_id))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn is_in_room(&self, id: ConnectionId, conversation_id: Uuid) -> bool {
        let guard = self.inner.read().await;
        guard
            .rooms
            .get(&conversation_id)
            .map(|members| members.contains(&id))
            .unwrap_or(false)
    }

    /// Room size (for debugging/metrics)
    pub async fn room_size(&self, conversation_id: Uuid) -> usize {
        let guard = self.inner.read().await;
        guard.rooms.get(&conversation_id).map(|r| r.len()).unwrap_or(0)
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.connections.len()
    }

    /// Drop every connection. Each session sees its outbound stream end and
    /// closes; later registrations receive an already-closed queue.
    pub async fn shutdown(&self) {
        let mut guard = self.inner.write().await;
        let count = guard.connections.len();
        guard.connections.clear();
        guard.rooms.clear();
        guard.users.clear();
        guard.shut_down = true;
        tracing::info!(connections = count, "connection registry shut down");
    }
}
