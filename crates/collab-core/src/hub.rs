//! The process-wide session registry: one entry per diagram currently
//! being edited, keyed by diagram id. Creation, join-or-create, and the
//! idle sweep all go through here.
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::actor::{self, SessionCommand, SessionHandle};
use crate::client::{ClientId, ClientRecord, Role, SEND_QUEUE_CAPACITY};
use crate::config::Config;
use crate::identity::{DiagramPermission, SessionPermission, User};
use crate::message::Message;
use crate::ports::{DiagramStore, PortError};
use crate::session::Session;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("store error: {0}")]
    Store(#[from] PortError),
}

/// The live session registry plus the store used to hydrate new sessions.
/// Cheap to clone (the map and store are both reference-counted), so
/// every connection-handling task can hold its own copy.
#[derive(Clone)]
pub struct Hub {
    sessions: Arc<DashMap<Uuid, SessionHandle>>,
    store: Arc<dyn DiagramStore>,
    config: Config,
}

impl Hub {
    pub fn new(store: Arc<dyn DiagramStore>, config: Config) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            store,
            config,
        }
    }

    /// Joins the session for `diagram_id`, creating it (the caller
    /// becomes host) if none is currently running. The first connection
    /// to reach an unstarted diagram wins the host role; everyone after
    /// that joins as a participant. Deny-listed users are
    /// admitted here and rejected by the session itself, so the caller
    /// always gets a channel back and learns the outcome from the first
    /// message it reads (an `error` followed by channel closure, or a
    /// normal `diagram_state`).
    pub async fn register(
        &self,
        threat_model_id: Uuid,
        diagram_id: Uuid,
        user: User,
        permission: DiagramPermission,
    ) -> Result<(SessionHandle, ClientId, mpsc::Receiver<Message>), HubError> {
        loop {
            if let Some(handle) = self.sessions.get(&diagram_id).map(|e| e.value().clone()) {
                match self.join(&handle, diagram_id, user.clone(), permission).await {
                    Some(joined) => return Ok(joined),
                    None => continue, // handle was stale; retry will recreate the session
                }
            }
            return self.create_session(threat_model_id, diagram_id, user, permission).await;
        }
    }

    async fn join(
        &self,
        handle: &SessionHandle,
        diagram_id: Uuid,
        user: User,
        permission: DiagramPermission,
    ) -> Option<(SessionHandle, ClientId, mpsc::Receiver<Message>)> {
        let client_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(SEND_QUEUE_CAPACITY);
        let role = Role {
            is_host: false,
            permission: SessionPermission::from(permission),
        };
        let client = ClientRecord::new(client_id, user, role, tx);
        if !handle.send(SessionCommand::Join(client)).await {
            self.sessions.remove(&diagram_id);
            return None;
        }
        Some((handle.clone(), client_id, rx))
    }

    async fn create_session(
        &self,
        threat_model_id: Uuid,
        diagram_id: Uuid,
        host: User,
        permission: DiagramPermission,
    ) -> Result<(SessionHandle, ClientId, mpsc::Receiver<Message>), HubError> {
        let (cells, update_vector) = self.store.load_diagram(threat_model_id, diagram_id).await?;
        let client_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(SEND_QUEUE_CAPACITY);
        let role = Role {
            is_host: true,
            permission: SessionPermission::from(permission),
        };
        let host_client = ClientRecord::new(client_id, host, role, tx);
        let session = Session::new(
            Uuid::new_v4(),
            threat_model_id,
            diagram_id,
            cells,
            update_vector,
            self.config.history_depth,
            host_client,
        );
        let handle = actor::spawn(
            session,
            self.store.clone(),
            Duration::from_secs(self.config.inactivity_timeout_seconds),
        );
        debug!(diagram = %diagram_id, "session created");
        // Two concurrent first-connections can both reach here; the
        // second insert simply wins and the first host's actor is left
        // unjoined, to be reaped by the next idle sweep. Harmless and
        // rare enough not to warrant a compare-and-swap here.
        self.sessions.insert(diagram_id, handle.clone());
        Ok((handle, client_id, rx))
    }

    pub async fn disconnect(&self, diagram_id: Uuid, client_id: ClientId) {
        if let Some(handle) = self.sessions.get(&diagram_id).map(|e| e.value().clone()) {
            handle.send(SessionCommand::Disconnect(client_id)).await;
        }
    }

    pub async fn dispatch(&self, diagram_id: Uuid, client_id: ClientId, msg: Message) {
        if let Some(handle) = self.sessions.get(&diagram_id).map(|e| e.value().clone()) {
            handle.send(SessionCommand::Inbound(client_id, msg)).await;
        }
    }

    /// Sends a tick to every live session, then drops registry entries
    /// whose mailbox has closed (the actor exited because it tore itself
    /// down). Intended to be driven by a periodic timer in the binary.
    pub async fn sweep(&self) {
        let ids: Vec<Uuid> = self.sessions.iter().map(|e| *e.key()).collect();
        let mut gone = Vec::new();
        for id in ids {
            let Some(handle) = self.sessions.get(&id).map(|e| e.value().clone()) else {
                continue;
            };
            if !handle.send(SessionCommand::Tick).await {
                gone.push(id);
            }
        }
        for id in gone {
            self.sessions.remove(&id);
            info!(diagram = %id, "session reaped from registry");
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
