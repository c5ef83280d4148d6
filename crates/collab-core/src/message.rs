//! The wire protocol: one tagged enum covering every `message_type` value
//! from both directions. The dispatcher decides, for each variant,
//! whether it is legal coming from a client.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cell::{Cell, CellId};
use crate::identity::User;
use crate::operation::Operation;

/// Presenter relays (`presenter_cursor`, `presenter_selection`) carry
/// arbitrary advisory payloads the core never interprets; it only
/// authorizes and rebroadcasts them, preserving extra fields unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RelayPayload {
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationDenialReason {
    InsufficientPermissions,
    ReadOnlyUser,
    InvalidUser,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "message_type", rename_all = "snake_case")]
pub enum Message {
    // --- Client -> server ---
    DiagramOperationRequest {
        operation_id: Uuid,
        base_vector: i64,
        operation: Operation,
    },
    UndoRequest,
    RedoRequest,
    SyncRequest {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        update_vector: Option<i64>,
    },
    SyncStatusRequest,
    PresenterRequest,
    ChangePresenterRequest {
        target: User,
    },
    PresenterDeniedRequest {
        target: User,
    },
    RemoveParticipantRequest {
        removed_user: User,
    },
    PresenterCursor(RelayPayload),
    PresenterSelection(RelayPayload),

    // --- Server -> client (server-only; rejected if received from a client) ---
    DiagramState {
        diagram_id: Uuid,
        update_vector: i64,
        cells: Vec<Cell>,
    },
    DiagramOperationEvent {
        initiating_user: User,
        operation_id: Uuid,
        sequence_number: u64,
        update_vector: i64,
        operation: Operation,
    },
    OperationRejected {
        operation_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        sequence_number: Option<u64>,
        update_vector: i64,
        reason: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        affected_cells: Option<Vec<CellId>>,
        requires_resync: bool,
        timestamp: DateTime<Utc>,
    },
    AuthorizationDenied {
        original_operation_id: Option<Uuid>,
        reason: AuthorizationDenialReason,
    },
    ParticipantsUpdate {
        participants: Vec<User>,
        host: User,
        current_presenter: Option<User>,
    },
    SyncStatusResponse {
        update_vector: i64,
    },
    PresenterRequestEvent {
        requesting_user: User,
    },
    PresenterDeniedEvent,
    HistoryOperation {
        message: String,
    },
    Error {
        message: String,
    },
    StateCorrection {
        diagram_id: Uuid,
        update_vector: i64,
        cells: Vec<Cell>,
    },
}

impl Message {
    /// Server-only wire types: a client sending one of these is a
    /// protocol violation.
    pub fn is_server_only(&self) -> bool {
        matches!(
            self,
            Message::DiagramState { .. }
                | Message::DiagramOperationEvent { .. }
                | Message::OperationRejected { .. }
                | Message::AuthorizationDenied { .. }
                | Message::ParticipantsUpdate { .. }
                | Message::SyncStatusResponse { .. }
                | Message::PresenterRequestEvent { .. }
                | Message::PresenterDeniedEvent
                | Message::HistoryOperation { .. }
                | Message::Error { .. }
                | Message::StateCorrection { .. }
        )
    }

    pub fn message_type(&self) -> &'static str {
        match self {
            Message::DiagramOperationRequest { .. } => "diagram_operation_request",
            Message::UndoRequest => "undo_request",
            Message::RedoRequest => "redo_request",
            Message::SyncRequest { .. } => "sync_request",
            Message::SyncStatusRequest => "sync_status_request",
            Message::PresenterRequest => "presenter_request",
            Message::ChangePresenterRequest { .. } => "change_presenter_request",
            Message::PresenterDeniedRequest { .. } => "presenter_denied_request",
            Message::RemoveParticipantRequest { .. } => "remove_participant_request",
            Message::PresenterCursor(_) => "presenter_cursor",
            Message::PresenterSelection(_) => "presenter_selection",
            Message::DiagramState { .. } => "diagram_state",
            Message::DiagramOperationEvent { .. } => "diagram_operation_event",
            Message::OperationRejected { .. } => "operation_rejected",
            Message::AuthorizationDenied { .. } => "authorization_denied",
            Message::ParticipantsUpdate { .. } => "participants_update",
            Message::SyncStatusResponse { .. } => "sync_status_response",
            Message::PresenterRequestEvent { .. } => "presenter_request_event",
            Message::PresenterDeniedEvent => "presenter_denied_event",
            Message::HistoryOperation { .. } => "history_operation",
            Message::Error { .. } => "error",
            Message::StateCorrection { .. } => "state_correction",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_only_types_are_flagged() {
        assert!(Message::Error {
            message: "x".into()
        }
        .is_server_only());
        assert!(!Message::UndoRequest.is_server_only());
    }

    #[test]
    fn round_trips_through_json() {
        let msg = Message::UndoRequest;
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"undo_request\""));
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.message_type(), "undo_request");
    }
}
