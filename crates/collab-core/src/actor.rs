//! The session event loop: one task per session, consuming a
//! multi-producer channel of `{join, leave, clientMsg, tick}` events and
//! serializing every mutation and broadcast through it.
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::{ClientId, ClientRecord};
use crate::dispatcher;
use crate::message::Message;
use crate::ports::DiagramStore;
use crate::session::{Effects, Session, SessionState};

pub const ACTOR_MAILBOX_CAPACITY: usize = 1024;

pub enum SessionCommand {
    Join(ClientRecord),
    Inbound(ClientId, Message),
    Disconnect(ClientId),
    Tick,
}

/// A cheap, cloneable reference to a running session's mailbox.
#[derive(Clone)]
pub struct SessionHandle {
    pub diagram_id: Uuid,
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub async fn send(&self, cmd: SessionCommand) -> bool {
        self.tx.send(cmd).await.is_ok()
    }

    pub fn try_send(&self, cmd: SessionCommand) -> bool {
        self.tx.try_send(cmd).is_ok()
    }
}

/// Applies one batch of `Effects` to the live session: direct messages
/// first, then broadcasts, then finalizes any evictions. A full outbound
/// queue is backpressure, not a stall — the offending client is added to
/// the eviction set instead of blocking the loop.
fn apply_effects(session: &mut Session, effects: Effects) {
    let mut to_remove = effects.remove;

    for (id, msg) in effects.direct {
        if let Some(client) = session.find_by_client(id) {
            if !client.try_send(msg) {
                warn!(client = %id, "outbound queue full, evicting client");
                to_remove.push(id);
            }
        }
    }

    for msg in effects.broadcasts {
        for id in session.client_ids() {
            if let Some(client) = session.find_by_client(id) {
                if !client.try_send(msg.clone()) {
                    warn!(client = %id, "outbound queue full during broadcast, evicting client");
                    to_remove.push(id);
                }
            }
        }
    }

    to_remove.sort();
    to_remove.dedup();
    for id in to_remove {
        session.take_client(id);
    }
}

/// Spawns the session actor task, returning a handle to its mailbox.
/// The task runs until the session becomes empty and terminal (host
/// disconnect, idle sweep, or spoof eviction tearing down everyone).
pub fn spawn(
    mut session: Session,
    store: Arc<dyn DiagramStore>,
    inactivity_timeout: Duration,
) -> SessionHandle {
    let diagram_id = session.diagram_id;
    let (tx, mut rx) = mpsc::channel(ACTOR_MAILBOX_CAPACITY);

    tokio::spawn(async move {
        info!(diagram = %diagram_id, "session started");
        while let Some(cmd) = rx.recv().await {
            match cmd {
                SessionCommand::Join(client) => {
                    debug!(diagram = %diagram_id, client = %client.id, "join");
                    let effects = session.join(client);
                    apply_effects(&mut session, effects);
                }
                SessionCommand::Inbound(sender, msg) => {
                    let kind = msg.message_type();
                    let effects = dispatcher::dispatch(&mut session, sender, msg);
                    if let Some(Message::DiagramOperationEvent { operation, update_vector, .. }) =
                        effects.broadcasts.iter().find(|m| matches!(m, Message::DiagramOperationEvent { .. }))
                    {
                        let store = store.clone();
                        let diagram_id = session.diagram_id;
                        let operation = operation.clone();
                        let update_vector = *update_vector;
                        tokio::spawn(async move {
                            if let Err(e) = store.persist_operation(diagram_id, &operation, update_vector).await {
                                warn!(diagram = %diagram_id, error = %e, "failed to persist operation");
                            }
                        });
                    }
                    debug!(diagram = %diagram_id, sender = %sender, message_type = kind, "dispatched");
                    apply_effects(&mut session, effects);
                }
                SessionCommand::Disconnect(client_id) => {
                    debug!(diagram = %diagram_id, client = %client_id, "disconnect");
                    let effects = session.handle_disconnect(client_id);
                    apply_effects(&mut session, effects);
                }
                SessionCommand::Tick => {
                    let idle = session.is_empty()
                        || session.last_activity.elapsed() > inactivity_timeout;
                    if idle {
                        info!(diagram = %diagram_id, "session idle, tearing down");
                        let effects = session.terminate_idle();
                        apply_effects(&mut session, effects);
                    }
                }
            }

            if session.state != SessionState::Active && session.is_empty() {
                break;
            }
        }
        info!(diagram = %diagram_id, "session ended");
    });

    SessionHandle { diagram_id, tx }
}
