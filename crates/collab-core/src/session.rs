//! One collaborative diagram session: participants, roles, the presenter,
//! the deny list, the in-memory cells, and the undo/redo history. All
//! mutation goes through `&mut self` methods here; the actor (`actor.rs`)
//! is what serializes calls into these methods onto a single task.
use std::collections::HashMap;
use std::time::Instant;

use chrono::Utc;
use uuid::Uuid;

use crate::cell::{Cell, CellId};
use crate::client::{ClientId, ClientRecord};
use crate::history::{History, HistoryEntry};
use crate::identity::User;
use crate::message::{AuthorizationDenialReason, Message, RelayPayload};
use crate::operation::{self, Operation, Rejection};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Terminating,
    Terminated,
}

/// Outbound side effects produced by a single session mutation. The actor
/// delivers `direct` before `broadcasts` (so e.g. a freshly joined client
/// sees its `diagram_state` before the `participants_update` that follows
/// it), then drops the client records named in `remove` — dropping a
/// `ClientRecord` closes its outbound channel, which is how the transport
/// task learns to close the socket once it has flushed everything queued.
#[derive(Default)]
pub struct Effects {
    pub direct: Vec<(ClientId, Message)>,
    pub broadcasts: Vec<Message>,
    pub remove: Vec<ClientId>,
}

impl Effects {
    pub fn none() -> Self {
        Self::default()
    }

    fn direct_one(client: ClientId, msg: Message) -> Self {
        Self {
            direct: vec![(client, msg)],
            ..Default::default()
        }
    }

    fn broadcast_one(msg: Message) -> Self {
        Self {
            broadcasts: vec![msg],
            ..Default::default()
        }
    }
}

pub struct Session {
    pub id: Uuid,
    pub threat_model_id: Uuid,
    pub diagram_id: Uuid,
    pub host: User,
    pub presenter: Option<User>,
    pub denied_provider_ids: std::collections::HashSet<String>,
    pub cells: HashMap<CellId, Cell>,
    pub update_vector: i64,
    pub last_activity: Instant,
    pub state: SessionState,
    history: History,
    clients: Vec<ClientRecord>,
}

impl Session {
    pub fn new(
        id: Uuid,
        threat_model_id: Uuid,
        diagram_id: Uuid,
        cells: HashMap<CellId, Cell>,
        update_vector: i64,
        history_depth: usize,
        host_client: ClientRecord,
    ) -> Self {
        let host = host_client.user.clone();
        Self {
            id,
            threat_model_id,
            diagram_id,
            presenter: Some(host.clone()),
            host,
            denied_provider_ids: std::collections::HashSet::new(),
            cells,
            update_vector,
            last_activity: Instant::now(),
            state: SessionState::Active,
            history: History::new(history_depth),
            clients: vec![host_client],
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn is_denied(&self, provider_id: &str) -> bool {
        self.denied_provider_ids.contains(provider_id)
    }

    pub fn deny(&mut self, provider_id: String) {
        self.denied_provider_ids.insert(provider_id);
    }

    pub fn participants(&self) -> Vec<User> {
        self.clients.iter().map(|c| c.user.clone()).collect()
    }

    pub fn client_ids(&self) -> Vec<ClientId> {
        self.clients.iter().map(|c| c.id).collect()
    }

    pub fn find_by_client(&self, id: ClientId) -> Option<&ClientRecord> {
        self.clients.iter().find(|c| c.id == id)
    }

    pub fn find_by_identity(&self, user: &User) -> Option<&ClientRecord> {
        self.clients.iter().find(|c| c.user.same_identity(user))
    }

    fn position_by_client(&self, id: ClientId) -> Option<usize> {
        self.clients.iter().position(|c| c.id == id)
    }

    fn remove_client(&mut self, id: ClientId) -> Option<ClientRecord> {
        self.position_by_client(id).map(|idx| self.clients.remove(idx))
    }

    fn participants_update(&self) -> Message {
        self.participants_update_excluding(&[])
    }

    /// Builds a `participants_update` that omits the given client ids,
    /// used when a client is about to be evicted: its `ClientRecord` (and
    /// outbound channel) must stay alive until the actor has delivered the
    /// eviction message, so the exclusion has to happen here rather than
    /// by actually removing it from `self.clients` first.
    fn participants_update_excluding(&self, excluded: &[ClientId]) -> Message {
        Message::ParticipantsUpdate {
            participants: self
                .clients
                .iter()
                .filter(|c| !excluded.contains(&c.id))
                .map(|c| c.user.clone())
                .collect(),
            host: self.host.clone(),
            current_presenter: self.presenter.clone(),
        }
    }

    /// Actually drops a client's record (and so its outbound channel)
    /// after the actor has finished delivering whatever effects named it
    /// in `Effects::remove`.
    pub fn take_client(&mut self, id: ClientId) -> Option<ClientRecord> {
        self.remove_client(id)
    }

    fn diagram_state(&self) -> Message {
        Message::DiagramState {
            diagram_id: self.diagram_id,
            update_vector: self.update_vector,
            cells: self.cells.values().cloned().collect(),
        }
    }

    /// A new participant joins an already-running session (the host join
    /// path goes through `Session::new` instead).
    pub fn join(&mut self, client: ClientRecord) -> Effects {
        // A user removed from this session (deny-listed) stays locked out
        // for its lifetime, even across disconnect/reconnect.
        if self.is_denied(&client.user.provider_id) {
            let id = client.id;
            return Effects {
                direct: vec![(
                    id,
                    Message::Error {
                        message: "removed from this session".to_string(),
                    },
                )],
                broadcasts: vec![],
                remove: vec![id],
            };
        }

        // Invariant: a user appears at most once; a reconnect replaces
        // the stale connection rather than creating a duplicate entry.
        self.remove_client_by_identity(&client.user.clone());
        let id = client.id;
        self.clients.push(client);
        self.touch();
        Effects {
            direct: vec![(id, self.diagram_state())],
            broadcasts: vec![self.participants_update()],
            remove: vec![],
        }
    }

    fn remove_client_by_identity(&mut self, user: &User) -> Option<ClientRecord> {
        let idx = self.clients.iter().position(|c| c.user.same_identity(user))?;
        Some(self.clients.remove(idx))
    }

    // ---- diagram_operation_request ----

    pub fn apply_operation(
        &mut self,
        sender: ClientId,
        operation_id: Uuid,
        base_vector: i64,
        op: Operation,
    ) -> Effects {
        let Some(initiator) = self.find_by_client(sender).map(|c| c.user.clone()) else {
            return Effects::none();
        };

        // Shape/type validation takes precedence over conflict detection
        // (spec precedence: empty -> invalid_operation_type -> validation_failed
        // -> conflict_detected), so an operation with an unknown type or a
        // malformed cell batch is rejected for that reason even against a
        // stale base_vector, rather than surfacing as a spurious conflict.
        if let Err(rej) = operation::validate_shape(&op) {
            let resync = rej.requires_resync();
            return Effects::direct_one(sender, reject_message(operation_id, self.update_vector, rej, resync));
        }

        let touched = op.touched_ids();
        if let Some(affected) =
            operation::detect_conflict(base_vector, self.update_vector, &touched, self.history.undo.iter())
        {
            let rejection = Rejection::ConflictDetected { affected_cells: affected };
            let resync = rejection.requires_resync();
            return Effects::direct_one(sender, reject_message(operation_id, self.update_vector, rejection, resync));
        }

        match operation::apply(&self.cells, &op) {
            Err(rej) => {
                let resync = rej.requires_resync();
                Effects::direct_one(sender, reject_message(operation_id, self.update_vector, rej, resync))
            }
            Ok(applied) => {
                self.cells = applied.cells;
                self.update_vector += 1;
                let sequence = self.update_vector as u64;
                self.history.record_forward(HistoryEntry {
                    forward: op.clone(),
                    inverse: applied.inverse,
                    initiator: initiator.clone(),
                    operation_id,
                    sequence,
                });
                self.touch();
                Effects::broadcast_one(Message::DiagramOperationEvent {
                    initiating_user: initiator,
                    operation_id,
                    sequence_number: sequence,
                    update_vector: self.update_vector,
                    operation: op,
                })
            }
        }
    }

    // ---- undo_request / redo_request ----

    pub fn undo(&mut self, requester: ClientId) -> Effects {
        let Some(requester_user) = self.find_by_client(requester).map(|c| c.user.clone()) else {
            return Effects::none();
        };
        let Some(entry) = self.history.undo.peek().cloned() else {
            return Effects::direct_one(
                requester,
                Message::HistoryOperation {
                    message: "no operations to undo".to_string(),
                },
            );
        };

        match operation::apply(&self.cells, &entry.inverse) {
            Err(_) => {
                self.history.undo.pop();
                // An intervening write has invalidated this inverse's
                // preconditions: the requester's history may be stale
                // relative to everyone else too, so this always forces a
                // resync regardless of the underlying reason code (spec.md
                // §9 open question 4).
                let mut effects = Effects::direct_one(
                    requester,
                    reject_message(
                        entry.operation_id,
                        self.update_vector,
                        Rejection::ValidationFailed {
                            details: "undo preconditions invalidated by a concurrent edit".to_string(),
                        },
                        true,
                    ),
                );
                effects.broadcasts.push(self.state_correction());
                effects
            }
            Ok(applied) => {
                self.history.undo.pop();
                self.cells = applied.cells;
                self.update_vector += 1;
                let sequence = self.update_vector as u64;
                let mut redone_entry = entry.clone();
                redone_entry.operation_id = Uuid::new_v4();
                redone_entry.sequence = sequence;
                redone_entry.initiator = requester_user.clone();
                self.history.record_undo(redone_entry.clone());
                self.touch();
                Effects::broadcast_one(Message::DiagramOperationEvent {
                    initiating_user: requester_user,
                    operation_id: redone_entry.operation_id,
                    sequence_number: sequence,
                    update_vector: self.update_vector,
                    operation: entry.inverse,
                })
            }
        }
    }

    pub fn redo(&mut self, requester: ClientId) -> Effects {
        let Some(requester_user) = self.find_by_client(requester).map(|c| c.user.clone()) else {
            return Effects::none();
        };
        let Some(entry) = self.history.redo.peek().cloned() else {
            return Effects::direct_one(
                requester,
                Message::HistoryOperation {
                    message: "no operations to redo".to_string(),
                },
            );
        };

        match operation::apply(&self.cells, &entry.forward) {
            Err(_) => {
                self.history.redo.pop();
                // Same reasoning as the undo precondition-failure path above:
                // always force a resync, not just on conflict_detected.
                let mut effects = Effects::direct_one(
                    requester,
                    reject_message(
                        entry.operation_id,
                        self.update_vector,
                        Rejection::ValidationFailed {
                            details: "redo preconditions invalidated by a concurrent edit".to_string(),
                        },
                        true,
                    ),
                );
                effects.broadcasts.push(self.state_correction());
                effects
            }
            Ok(applied) => {
                self.history.redo.pop();
                self.cells = applied.cells;
                self.update_vector += 1;
                let sequence = self.update_vector as u64;
                let mut replayed_entry = entry.clone();
                replayed_entry.operation_id = Uuid::new_v4();
                replayed_entry.sequence = sequence;
                replayed_entry.initiator = requester_user.clone();
                self.history.record_redo(replayed_entry.clone());
                self.touch();
                Effects::broadcast_one(Message::DiagramOperationEvent {
                    initiating_user: requester_user,
                    operation_id: replayed_entry.operation_id,
                    sequence_number: sequence,
                    update_vector: self.update_vector,
                    operation: entry.forward,
                })
            }
        }
    }

    fn state_correction(&self) -> Message {
        Message::StateCorrection {
            diagram_id: self.diagram_id,
            update_vector: self.update_vector,
            cells: self.cells.values().cloned().collect(),
        }
    }

    // ---- sync_request / sync_status_request ----

    pub fn sync(&self, requester: ClientId, update_vector: Option<i64>) -> Effects {
        if let Some(v) = update_vector {
            if v == self.update_vector {
                return Effects::direct_one(
                    requester,
                    Message::SyncStatusResponse {
                        update_vector: self.update_vector,
                    },
                );
            }
        }
        Effects::direct_one(requester, self.diagram_state())
    }

    pub fn sync_status(&self, requester: ClientId) -> Effects {
        Effects::direct_one(
            requester,
            Message::SyncStatusResponse {
                update_vector: self.update_vector,
            },
        )
    }

    // ---- presenter_request ----

    pub fn presenter_request(&mut self, requester: ClientId) -> Effects {
        let Some(user) = self.find_by_client(requester).map(|c| c.user.clone()) else {
            return Effects::none();
        };
        if user.same_identity(&self.host) {
            if self.presenter.as_ref() == Some(&user) {
                return Effects::none();
            }
            self.presenter = Some(user);
            return Effects::broadcast_one(self.participants_update());
        }
        if self.presenter.as_ref() == Some(&user) {
            return Effects::none();
        }
        match self.find_by_identity(&self.host.clone()) {
            Some(host_client) => Effects::direct_one(
                host_client.id,
                Message::PresenterRequestEvent { requesting_user: user },
            ),
            None => Effects::none(),
        }
    }

    // ---- host-authoritative requests: change_presenter / presenter_denied / remove_participant ----

    /// Resolves a host-authoritative target identity. `Ok` carries the
    /// matching connected client id. `Err` carries the full spoof-eviction
    /// effects for the sender: the sender, not the named
    /// target, is evicted and denied, and since the sender is always the
    /// host for these message types the whole session is torn down.
    fn resolve_target_or_spoof(&mut self, sender: ClientId, target: &User) -> Result<ClientId, Effects> {
        let exact_match = self
            .clients
            .iter()
            .find(|c| c.user.matches_exactly(target))
            .map(|c| c.id);
        match exact_match {
            Some(id) => Ok(id),
            None => Err(self.evict_spoofing_host(sender)),
        }
    }

    fn evict_spoofing_host(&mut self, sender: ClientId) -> Effects {
        let Some(sender_user) = self.find_by_client(sender).map(|c| c.user.clone()) else {
            return Effects::none();
        };
        self.deny(sender_user.provider_id.clone());
        self.state = SessionState::Terminating;

        let mut direct = vec![(
            sender,
            Message::Error {
                message: "providing false information about other users".to_string(),
            },
        )];
        let mut remove = vec![sender];
        for other in self.client_ids() {
            if other == sender {
                continue;
            }
            direct.push((
                other,
                Message::Error {
                    message: "host disconnected".to_string(),
                },
            ));
            remove.push(other);
        }
        Effects {
            direct,
            broadcasts: vec![],
            remove,
        }
    }

    pub fn change_presenter(&mut self, sender: ClientId, target: User) -> Effects {
        match self.resolve_target_or_spoof(sender, &target) {
            Err(effects) => effects,
            Ok(target_id) => {
                let Some(target_user) = self.find_by_client(target_id).map(|c| c.user.clone()) else {
                    return Effects::none();
                };
                self.presenter = Some(target_user);
                Effects::broadcast_one(self.participants_update())
            }
        }
    }

    pub fn presenter_denied(&mut self, sender: ClientId, target: User) -> Effects {
        match self.resolve_target_or_spoof(sender, &target) {
            Err(effects) => effects,
            Ok(target_id) => Effects::direct_one(target_id, Message::PresenterDeniedEvent),
        }
    }

    pub fn remove_participant(&mut self, sender: ClientId, target: User) -> Effects {
        match self.resolve_target_or_spoof(sender, &target) {
            Err(effects) => effects,
            Ok(target_id) => {
                self.deny(target.provider_id.clone());
                let mut effects = Effects::direct_one(
                    target_id,
                    Message::Error {
                        message: "removed".to_string(),
                    },
                );
                effects.remove.push(target_id);
                effects
                    .broadcasts
                    .push(self.participants_update_excluding(&[target_id]));
                effects
            }
        }
    }

    // ---- presenter relays ----

    pub fn presenter_cursor(&self, sender: ClientId, payload: RelayPayload) -> Effects {
        self.relay_if_presenter(sender, Message::PresenterCursor(payload))
    }

    pub fn presenter_selection(&self, sender: ClientId, payload: RelayPayload) -> Effects {
        self.relay_if_presenter(sender, Message::PresenterSelection(payload))
    }

    fn relay_if_presenter(&self, sender: ClientId, msg: Message) -> Effects {
        let Some(sender_user) = self.find_by_client(sender).map(|c| c.user.clone()) else {
            return Effects::none();
        };
        if self.presenter.as_ref() != Some(&sender_user) {
            return Effects::none();
        }
        let direct = self
            .client_ids()
            .into_iter()
            .filter(|id| *id != sender)
            .map(|id| (id, msg.clone()))
            .collect();
        Effects {
            direct,
            broadcasts: vec![],
            remove: vec![],
        }
    }

    // ---- idle sweep ----

    /// Tears the session down after a cleanup tick finds it idle: every connected client (if any) gets a direct error before
    /// being handed to the actor's removal list.
    pub fn terminate_idle(&mut self) -> Effects {
        self.state = SessionState::Terminated;
        let ids = self.client_ids();
        let direct = ids
            .iter()
            .map(|&id| {
                (
                    id,
                    Message::Error {
                        message: "session timed out due to inactivity".to_string(),
                    },
                )
            })
            .collect();
        Effects {
            direct,
            broadcasts: vec![],
            remove: ids,
        }
    }

    // ---- disconnects ----

    pub fn handle_disconnect(&mut self, client_id: ClientId) -> Effects {
        let Some(departing) = self.find_by_client(client_id).map(|c| c.user.clone()) else {
            return Effects::none();
        };

        if departing.same_identity(&self.host) {
            self.state = SessionState::Terminating;
            let mut direct = Vec::new();
            let mut remove = Vec::new();
            for id in self.client_ids() {
                if id == client_id {
                    continue;
                }
                direct.push((
                    id,
                    Message::Error {
                        message: "host disconnected".to_string(),
                    },
                ));
                remove.push(id);
            }
            self.remove_client(client_id);
            return Effects {
                direct,
                broadcasts: vec![],
                remove,
            };
        }

        let was_presenter = self.presenter.as_ref() == Some(&departing);
        self.remove_client(client_id);

        if was_presenter {
            self.presenter = if self.find_by_identity(&self.host.clone()).is_some() {
                Some(self.host.clone())
            } else {
                self.clients
                    .iter()
                    .find(|c| c.role.is_writer())
                    .map(|c| c.user.clone())
            };
        }

        Effects::broadcast_one(self.participants_update())
    }
}

/// `requires_resync` is taken from the caller rather than derived purely
/// from `rejection.code()`: most rejections carry the resync bit implied
/// by their reason (only `conflict_detected` does by default), but some
/// callers know the session state has drifted for a reason the code alone
/// doesn't capture (e.g. an undo/redo whose inverse no longer applies) and
/// must force it regardless of the underlying reason.
fn reject_message(operation_id: Uuid, update_vector: i64, rejection: Rejection, requires_resync: bool) -> Message {
    let reason = rejection.code().to_string();
    let (message, affected_cells) = match &rejection {
        Rejection::ValidationFailed { details } => (details.clone(), None),
        Rejection::ConflictDetected { affected_cells } => (
            "operation conflicts with a more recent change".to_string(),
            Some(affected_cells.clone()),
        ),
        Rejection::NoStateChange => ("operation would not change diagram state".to_string(), None),
        Rejection::DiagramNotFound => ("diagram not found".to_string(), None),
        Rejection::PermissionDenied => ("permission denied".to_string(), None),
        Rejection::InvalidOperationType => ("unknown operation type".to_string(), None),
        Rejection::EmptyOperation => ("operation contained no cells".to_string(), None),
        Rejection::EmptyHistory => ("history is empty".to_string(), None),
    };
    Message::OperationRejected {
        operation_id,
        sequence_number: None,
        update_vector,
        reason,
        message,
        affected_cells,
        requires_resync,
        timestamp: Utc::now(),
    }
}

pub fn authorization_denied(original_operation_id: Option<Uuid>, reason: AuthorizationDenialReason) -> Message {
    Message::AuthorizationDenied {
        original_operation_id,
        reason,
    }
}
