//! End-to-end scenarios driven directly against `Session`/`dispatcher`,
//! without a real socket: conflict detection and resync, undo/redo
//! round-trips, reader rejection, spoofed host-authoritative requests,
//! deny-list re-entry, and host-disconnect cascade.
use collab_core::{
    dispatcher, CellId, CellOp, CellOpKind, ClientRecord, DiagramPermission, Effects, Message, Operation,
    Role, Session, SessionPermission, User,
};
use std::collections::HashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

fn user(id: &str) -> User {
    User::new("google", id, format!("{id}@example.com"), id.to_string())
}

fn client(id: Uuid, u: User, permission: DiagramPermission, is_host: bool) -> (ClientRecord, mpsc::Receiver<Message>) {
    let (tx, rx) = mpsc::channel(32);
    let role = Role {
        is_host,
        permission: SessionPermission::from(permission),
    };
    (ClientRecord::new(id, u, role, tx), rx)
}

fn new_session(host_id: Uuid, host: User) -> (Session, mpsc::Receiver<Message>) {
    let (host_client, rx) = client(host_id, host, DiagramPermission::Owner, true);
    let session = Session::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), HashMap::new(), 0, 100, host_client);
    (session, rx)
}

fn add_op(id: CellId) -> Operation {
    Operation::patch(vec![CellOp {
        id,
        op: CellOpKind::Add,
        data: Some(serde_json::json!({"label": "threat"})),
    }])
}

fn drain(effects: Effects, for_client: Uuid) -> Option<Message> {
    effects
        .direct
        .into_iter()
        .find(|(id, _)| *id == for_client)
        .map(|(_, m)| m)
        .or_else(|| effects.broadcasts.into_iter().next())
}

#[test]
fn conflict_detected_then_resync_on_stale_base_vector() {
    let host_id = Uuid::new_v4();
    let (mut session, _host_rx) = new_session(host_id, user("host"));

    let writer_id = Uuid::new_v4();
    let (writer_client, _writer_rx) = client(writer_id, user("writer"), DiagramPermission::Writer, false);
    session.join(writer_client);

    let cell_id = CellId::new_v4();
    let first = dispatcher::dispatch(
        &mut session,
        host_id,
        Message::DiagramOperationRequest {
            operation_id: Uuid::new_v4(),
            base_vector: 0,
            operation: add_op(cell_id),
        },
    );
    assert!(matches!(first.broadcasts.first(), Some(Message::DiagramOperationEvent { .. })));
    assert_eq!(session.update_vector, 1);

    // The writer's request still carries base_vector 0: its edit touches
    // the same cell the host's already-applied operation touched.
    let conflicting = dispatcher::dispatch(
        &mut session,
        writer_id,
        Message::DiagramOperationRequest {
            operation_id: Uuid::new_v4(),
            base_vector: 0,
            operation: Operation::patch(vec![CellOp {
                id: cell_id,
                op: CellOpKind::Update,
                data: Some(serde_json::json!({"label": "overwritten"})),
            }]),
        },
    );
    let rejection = drain(conflicting, writer_id).expect("writer receives a direct rejection");
    match rejection {
        Message::OperationRejected { reason, requires_resync, affected_cells, .. } => {
            assert_eq!(reason, "conflict_detected");
            assert!(requires_resync);
            assert_eq!(affected_cells, Some(vec![cell_id]));
        }
        other => panic!("expected operation_rejected, got {other:?}"),
    }

    // The writer resyncs and gets the authoritative state.
    let resync = dispatcher::dispatch(&mut session, writer_id, Message::SyncRequest { update_vector: None });
    match drain(resync, writer_id).unwrap() {
        Message::DiagramState { update_vector, cells, .. } => {
            assert_eq!(update_vector, 1);
            assert_eq!(cells.len(), 1);
        }
        other => panic!("expected diagram_state, got {other:?}"),
    }
}

#[test]
fn undo_then_redo_round_trips_to_the_same_state() {
    let host_id = Uuid::new_v4();
    let (mut session, _rx) = new_session(host_id, user("host"));
    let cell_id = CellId::new_v4();

    dispatcher::dispatch(
        &mut session,
        host_id,
        Message::DiagramOperationRequest {
            operation_id: Uuid::new_v4(),
            base_vector: 0,
            operation: add_op(cell_id),
        },
    );
    assert_eq!(session.update_vector, 1);
    assert!(session.cells.contains_key(&cell_id));

    dispatcher::dispatch(&mut session, host_id, Message::UndoRequest);
    assert_eq!(session.update_vector, 2);
    assert!(!session.cells.contains_key(&cell_id));

    dispatcher::dispatch(&mut session, host_id, Message::RedoRequest);
    assert_eq!(session.update_vector, 3);
    assert!(session.cells.contains_key(&cell_id));
}

#[test]
fn reader_write_attempt_is_denied() {
    let host_id = Uuid::new_v4();
    let (mut session, _rx) = new_session(host_id, user("host"));

    let reader_id = Uuid::new_v4();
    let (reader_client, _reader_rx) = client(reader_id, user("reader"), DiagramPermission::Reader, false);
    session.join(reader_client);

    let effects = dispatcher::dispatch(
        &mut session,
        reader_id,
        Message::DiagramOperationRequest {
            operation_id: Uuid::new_v4(),
            base_vector: 0,
            operation: add_op(CellId::new_v4()),
        },
    );
    assert_eq!(session.update_vector, 0);
    match drain(effects, reader_id).unwrap() {
        Message::AuthorizationDenied { reason, .. } => {
            assert_eq!(reason, collab_core::AuthorizationDenialReason::ReadOnlyUser);
        }
        other => panic!("expected authorization_denied, got {other:?}"),
    }
}

#[test]
fn spoofed_remove_participant_evicts_the_sender_and_ends_the_session() {
    let host_id = Uuid::new_v4();
    let host_user = user("host");
    let (mut session, _rx) = new_session(host_id, host_user);

    let participant_id = Uuid::new_v4();
    let (participant_client, _p_rx) = client(participant_id, user("participant"), DiagramPermission::Writer, false);
    session.join(participant_client);

    // A host-authoritative message naming a target whose full identity
    // does not match any connected client is treated as a spoof: the
    // sender (the host connection itself) is the one evicted.
    let forged_target = User::new("google", "participant", "attacker@example.com", "Not Participant");
    let effects = dispatcher::dispatch(
        &mut session,
        host_id,
        Message::RemoveParticipantRequest { removed_user: forged_target },
    );

    assert!(effects.remove.contains(&host_id));
    assert!(session.is_denied("host"));
    assert_eq!(session.state, collab_core::SessionState::Terminating);
}

#[test]
fn denied_user_cannot_re_enter_the_session() {
    let host_id = Uuid::new_v4();
    let (mut session, _rx) = new_session(host_id, user("host"));

    let removed = user("removed");
    let removed_id = Uuid::new_v4();
    let (removed_client, _removed_rx) = client(removed_id, removed.clone(), DiagramPermission::Writer, false);
    session.join(removed_client);

    dispatcher::dispatch(
        &mut session,
        host_id,
        Message::RemoveParticipantRequest { removed_user: removed.clone() },
    );
    assert!(session.is_denied("removed"));

    let (retry_client, _retry_rx) = client(Uuid::new_v4(), removed, DiagramPermission::Writer, false);
    let rejoin = session.join(retry_client);
    assert!(rejoin.direct.iter().any(|(_, m)| matches!(m, Message::Error { .. })));
    assert!(!rejoin.remove.is_empty());
}

#[test]
fn host_disconnect_cascades_to_every_other_participant() {
    let host_id = Uuid::new_v4();
    let (mut session, _rx) = new_session(host_id, user("host"));

    let a_id = Uuid::new_v4();
    let (a_client, _a_rx) = client(a_id, user("a"), DiagramPermission::Writer, false);
    session.join(a_client);
    let b_id = Uuid::new_v4();
    let (b_client, _b_rx) = client(b_id, user("b"), DiagramPermission::Reader, false);
    session.join(b_client);

    let effects = session.handle_disconnect(host_id);
    assert_eq!(effects.remove.len(), 2);
    assert!(effects.remove.contains(&a_id));
    assert!(effects.remove.contains(&b_id));
    assert_eq!(session.state, collab_core::SessionState::Terminating);
}

#[test]
fn invalid_operation_type_takes_precedence_over_stale_conflict() {
    let host_id = Uuid::new_v4();
    let (mut session, _rx) = new_session(host_id, user("host"));
    let cell_id = CellId::new_v4();

    dispatcher::dispatch(
        &mut session,
        host_id,
        Message::DiagramOperationRequest {
            operation_id: Uuid::new_v4(),
            base_vector: 0,
            operation: add_op(cell_id),
        },
    );
    assert_eq!(session.update_vector, 1);

    // base_vector is stale against the same cell the prior operation
    // touched, which would read as conflict_detected -- but the batch's
    // type is malformed, so that check must win first.
    let mut malformed = add_op(cell_id);
    malformed.op_type = "rebase".to_string();
    let effects = dispatcher::dispatch(
        &mut session,
        host_id,
        Message::DiagramOperationRequest {
            operation_id: Uuid::new_v4(),
            base_vector: 0,
            operation: malformed,
        },
    );
    match drain(effects, host_id).unwrap() {
        Message::OperationRejected { reason, requires_resync, .. } => {
            assert_eq!(reason, "invalid_operation_type");
            assert!(!requires_resync);
        }
        other => panic!("expected operation_rejected, got {other:?}"),
    }
}

#[test]
fn undo_precondition_failure_forces_resync() {
    let host_id = Uuid::new_v4();
    let (mut session, _rx) = new_session(host_id, user("host"));
    let cell_id = CellId::new_v4();

    dispatcher::dispatch(
        &mut session,
        host_id,
        Message::DiagramOperationRequest {
            operation_id: Uuid::new_v4(),
            base_vector: 0,
            operation: add_op(cell_id),
        },
    );
    assert_eq!(session.update_vector, 1);

    // Simulate the cell having vanished out from under the pending undo
    // entry, so its inverse (remove cell_id) no longer applies.
    session.cells.remove(&cell_id);

    let effects = session.undo(host_id);
    match drain(effects, host_id).expect("host receives a direct rejection") {
        Message::OperationRejected { reason, requires_resync, .. } => {
            assert_eq!(reason, "validation_failed");
            assert!(requires_resync);
        }
        other => panic!("expected operation_rejected, got {other:?}"),
    }
}
