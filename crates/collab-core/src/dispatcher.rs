//! Validates and routes one inbound frame for a session: session-active
//! and known-sender checks, then writer/host gating, followed by dispatch
//! to the matching `Session` method.
use crate::client::ClientId;
use crate::message::{AuthorizationDenialReason, Message};
use crate::session::{self, Effects, Session, SessionState};

fn is_writer(session: &Session, sender: ClientId) -> bool {
    session
        .find_by_client(sender)
        .map(|c| c.role.is_writer())
        .unwrap_or(false)
}

fn is_host(session: &Session, sender: ClientId) -> bool {
    session
        .find_by_client(sender)
        .map(|c| c.user.same_identity(&session.host))
        .unwrap_or(false)
}

fn protocol_violation(sender: ClientId, message: &str) -> Effects {
    Effects {
        direct: vec![(
            sender,
            Message::Error {
                message: message.to_string(),
            },
        )],
        broadcasts: vec![],
        remove: vec![sender],
    }
}

/// Dispatch one message already known to have arrived from `sender`.
/// Returns the side effects the caller (the session actor) must deliver.
pub fn dispatch(session: &mut Session, sender: ClientId, msg: Message) -> Effects {
    if session.state != SessionState::Active {
        return Effects::none();
    }
    if session.find_by_client(sender).is_none() {
        return Effects::none();
    }

    if msg.is_server_only() {
        return protocol_violation(sender, "server-only message type received from client");
    }

    match msg {
        Message::DiagramOperationRequest {
            operation_id,
            base_vector,
            operation,
        } => {
            if !is_writer(session, sender) {
                return Effects {
                    direct: vec![(
                        sender,
                        session::authorization_denied(
                            Some(operation_id),
                            AuthorizationDenialReason::ReadOnlyUser,
                        ),
                    )],
                    broadcasts: vec![],
                    remove: vec![],
                };
            }
            session.apply_operation(sender, operation_id, base_vector, operation)
        }

        Message::UndoRequest => {
            if !is_writer(session, sender) {
                return Effects {
                    direct: vec![(
                        sender,
                        session::authorization_denied(None, AuthorizationDenialReason::ReadOnlyUser),
                    )],
                    broadcasts: vec![],
                    remove: vec![],
                };
            }
            session.undo(sender)
        }

        Message::RedoRequest => {
            if !is_writer(session, sender) {
                return Effects {
                    direct: vec![(
                        sender,
                        session::authorization_denied(None, AuthorizationDenialReason::ReadOnlyUser),
                    )],
                    broadcasts: vec![],
                    remove: vec![],
                };
            }
            session.redo(sender)
        }

        Message::SyncRequest { update_vector } => session.sync(sender, update_vector),
        Message::SyncStatusRequest => session.sync_status(sender),
        Message::PresenterRequest => session.presenter_request(sender),

        Message::ChangePresenterRequest { target } => {
            if !is_host(session, sender) {
                return Effects {
                    direct: vec![(
                        sender,
                        session::authorization_denied(
                            None,
                            AuthorizationDenialReason::InsufficientPermissions,
                        ),
                    )],
                    broadcasts: vec![],
                    remove: vec![],
                };
            }
            session.change_presenter(sender, target)
        }

        Message::PresenterDeniedRequest { target } => {
            if !is_host(session, sender) {
                return Effects {
                    direct: vec![(
                        sender,
                        session::authorization_denied(
                            None,
                            AuthorizationDenialReason::InsufficientPermissions,
                        ),
                    )],
                    broadcasts: vec![],
                    remove: vec![],
                };
            }
            session.presenter_denied(sender, target)
        }

        Message::RemoveParticipantRequest { removed_user } => {
            if !is_host(session, sender) {
                return Effects {
                    direct: vec![(
                        sender,
                        session::authorization_denied(
                            None,
                            AuthorizationDenialReason::InsufficientPermissions,
                        ),
                    )],
                    broadcasts: vec![],
                    remove: vec![],
                };
            }
            session.remove_participant(sender, removed_user)
        }

        Message::PresenterCursor(payload) => session.presenter_cursor(sender, payload),
        Message::PresenterSelection(payload) => session.presenter_selection(sender, payload),

        // Server-only variants were already rejected above.
        _ => Effects::none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{CellId, CellOp, CellOpKind};
    use crate::client::{ClientRecord, Role};
    use crate::identity::{SessionPermission, User};
    use crate::operation::Operation;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn make_client(id: ClientId, user: User, writer: bool, host: bool) -> (ClientRecord, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(16);
        let permission = if writer {
            SessionPermission::Writer
        } else {
            SessionPermission::Reader
        };
        (ClientRecord::new(id, user, Role { is_host: host, permission }, tx), rx)
    }

    #[test]
    fn reader_is_denied_write_operations() {
        let host_user = User::new("google", "host", "h@x.com", "Host");
        let host_id = Uuid::new_v4();
        let (host_client, _rx) = make_client(host_id, host_user, true, true);
        let mut session = Session::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Default::default(),
            0,
            100,
            host_client,
        );

        let reader_user = User::new("google", "reader", "r@x.com", "Reader");
        let reader_id = Uuid::new_v4();
        let (reader_client, _rx2) = make_client(reader_id, reader_user, false, false);
        session.join(reader_client);

        let op = Operation::patch(vec![CellOp {
            id: CellId::new_v4(),
            op: CellOpKind::Add,
            data: Some(serde_json::json!({})),
        }]);
        let effects = dispatch(
            &mut session,
            reader_id,
            Message::DiagramOperationRequest {
                operation_id: Uuid::new_v4(),
                base_vector: 0,
                operation: op,
            },
        );
        assert_eq!(session.update_vector, 0);
        assert_eq!(effects.direct.len(), 1);
        assert!(matches!(
            effects.direct[0].1,
            Message::AuthorizationDenied {
                reason: AuthorizationDenialReason::ReadOnlyUser,
                ..
            }
        ));
    }

    #[test]
    fn server_only_message_from_client_is_a_protocol_violation() {
        let host_user = User::new("google", "host", "h@x.com", "Host");
        let host_id = Uuid::new_v4();
        let (host_client, _rx) = make_client(host_id, host_user, true, true);
        let mut session = Session::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Default::default(),
            0,
            100,
            host_client,
        );

        let effects = dispatch(
            &mut session,
            host_id,
            Message::Error {
                message: "nope".to_string(),
            },
        );
        assert_eq!(effects.remove, vec![host_id]);
    }
}
