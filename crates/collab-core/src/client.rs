//! Per-connected-client state, owned by exactly one `Session`.
use std::time::Instant;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::identity::{SessionPermission, User};
use crate::message::Message;

pub type ClientId = Uuid;

/// Bound on a client's outbound queue. A slow client must not stall the
/// session's serialized event loop: once full, the client is dropped
/// rather than backpressuring the broadcaster.
pub const SEND_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Role {
    pub is_host: bool,
    pub permission: SessionPermission,
}

impl Role {
    pub fn is_writer(&self) -> bool {
        matches!(self.permission, SessionPermission::Writer)
    }
}

/// A single connected client, as tracked by its owning session.
pub struct ClientRecord {
    pub id: ClientId,
    pub user: User,
    pub role: Role,
    tx: mpsc::Sender<Message>,
    pub last_activity: Instant,
}

impl ClientRecord {
    pub fn new(id: ClientId, user: User, role: Role, tx: mpsc::Sender<Message>) -> Self {
        Self {
            id,
            user,
            role,
            tx,
            last_activity: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Attempts to enqueue a message without blocking. Returns `false`
    /// (and the client should be disconnected) if the queue is full.
    pub fn try_send(&self, msg: Message) -> bool {
        self.tx.try_send(msg).is_ok()
    }
}
