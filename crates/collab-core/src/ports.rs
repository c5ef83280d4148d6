//! The ports the core requires from its external collaborators:
//! authentication, permission lookup, the diagram store, and a clock.
//! The core never implements these for production; it only defines the
//! traits `apps/collab-server` wires concrete adapters into.
use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::cell::{Cell, CellId};
use crate::identity::{DiagramPermission, User};
use crate::operation::Operation;

#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("authentication failed")]
    AuthenticationFailed,
    #[error("diagram not found")]
    DiagramNotFound,
    #[error("store error: {0}")]
    Store(String),
}

/// Authenticates the identity behind a connection upgrade. Out of scope
/// for this core: a concrete OAuth-backed implementation lives
/// outside this crate.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn authenticate(&self, bearer_token: Option<&str>) -> Result<User, PortError>;
}

/// Resolves a user's permission on a diagram.
#[async_trait]
pub trait PermissionProvider: Send + Sync {
    async fn permission_for(
        &self,
        user: &User,
        threat_model_id: Uuid,
        diagram_id: Uuid,
    ) -> Result<DiagramPermission, PortError>;
}

/// The persistent store: loads a diagram's cells and update vector on
/// session creation, and is informed of every successfully applied
/// operation so it can persist the new state. Ordering per diagram must
/// be preserved even if the implementation is asynchronous.
#[async_trait]
pub trait DiagramStore: Send + Sync {
    async fn load_diagram(
        &self,
        threat_model_id: Uuid,
        diagram_id: Uuid,
    ) -> Result<(HashMap<CellId, Cell>, i64), PortError>;

    async fn persist_operation(
        &self,
        diagram_id: Uuid,
        operation: &Operation,
        new_update_vector: i64,
    ) -> Result<(), PortError>;
}

/// Monotonic time source for activity tracking, injected so sweeps and
/// timeouts are deterministic in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> std::time::Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> std::time::Instant {
        std::time::Instant::now()
    }
}
