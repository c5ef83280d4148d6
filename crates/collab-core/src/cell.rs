//! Diagram cells are opaque payloads to the core: it tracks identity for
//! conflict detection and stores the data verbatim, never interpreting it.
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type CellId = Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub id: CellId,
    #[serde(flatten)]
    pub data: serde_json::Value,
}

/// The three mutation kinds a single cell within an operation can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellOpKind {
    Add,
    Update,
    Remove,
}

/// One cell-level mutation within an `Operation` batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellOp {
    pub id: CellId,
    pub op: CellOpKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}
