//! The collaboration core: a pure, transport-agnostic state machine for
//! real-time multi-user diagram editing sessions. Nothing in this crate
//! performs I/O — `apps/collab-server` owns the sockets, the HTTP
//! upgrade, and the concrete port implementations, and drives this crate
//! entirely through `Hub` and the `SessionCommand` mailbox.

pub mod actor;
pub mod cell;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod history;
pub mod hub;
pub mod identity;
pub mod message;
pub mod operation;
pub mod ports;
pub mod session;

pub use actor::{SessionCommand, SessionHandle};
pub use cell::{Cell, CellId, CellOp, CellOpKind};
pub use client::{ClientId, ClientRecord, Role};
pub use config::Config;
pub use hub::{Hub, HubError};
pub use identity::{DiagramPermission, SessionPermission, User};
pub use message::{AuthorizationDenialReason, Message, RelayPayload};
pub use operation::{Operation, Rejection};
pub use ports::{AuthProvider, Clock, DiagramStore, PermissionProvider, PortError, SystemClock};
pub use session::{Effects, Session, SessionState};
