//! The operation engine: validates, conflict-checks, and applies a patch
//! batch against the in-memory diagram cells, producing the forward event
//! and its inverse in one atomic step.
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::cell::{Cell, CellId, CellOp, CellOpKind};
use crate::history::HistoryEntry;

/// A batch of cell mutations, applied transactionally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    #[serde(rename = "type")]
    pub op_type: String,
    pub cells: Vec<CellOp>,
}

impl Operation {
    pub fn patch(cells: Vec<CellOp>) -> Self {
        Self {
            op_type: "patch".to_string(),
            cells,
        }
    }

    pub fn touched_ids(&self) -> HashSet<CellId> {
        self.cells.iter().map(|c| c.id).collect()
    }
}

/// Exhaustive rejection reasons the engine (and session) can emit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
    ValidationFailed { details: String },
    ConflictDetected { affected_cells: Vec<CellId> },
    NoStateChange,
    DiagramNotFound,
    PermissionDenied,
    InvalidOperationType,
    EmptyOperation,
    EmptyHistory,
}

impl Rejection {
    /// Whether the client must resync before retrying.
    pub fn requires_resync(&self) -> bool {
        matches!(self, Rejection::ConflictDetected { .. })
    }

    pub fn code(&self) -> &'static str {
        match self {
            Rejection::ValidationFailed { .. } => "validation_failed",
            Rejection::ConflictDetected { .. } => "conflict_detected",
            Rejection::NoStateChange => "no_state_change",
            Rejection::DiagramNotFound => "diagram_not_found",
            Rejection::PermissionDenied => "permission_denied",
            Rejection::InvalidOperationType => "invalid_operation_type",
            Rejection::EmptyOperation => "empty_operation",
            Rejection::EmptyHistory => "empty_history",
        }
    }
}

/// Result of a successful apply: the committed cells, the computed
/// inverse batch, and which cell ids were touched (for conflict checks
/// against later operations).
pub struct Applied {
    pub cells: HashMap<CellId, Cell>,
    pub inverse: Operation,
    pub touched: HashSet<CellId>,
}

/// Structural validation: empty batch, unknown type, missing `data` where
/// the cell op requires it. Does not touch the cell map. Exposed so
/// callers can run shape validation ahead of conflict detection, matching
/// the precedence order empty → invalid_operation_type → validation_failed
/// → conflict_detected.
pub fn validate_shape(op: &Operation) -> Result<(), Rejection> {
    if op.cells.is_empty() {
        return Err(Rejection::EmptyOperation);
    }
    if op.op_type != "patch" {
        return Err(Rejection::InvalidOperationType);
    }
    for cell_op in &op.cells {
        match cell_op.op {
            CellOpKind::Add | CellOpKind::Update => {
                if cell_op.data.is_none() {
                    return Err(Rejection::ValidationFailed {
                        details: format!("cell {} missing data for {:?}", cell_op.id, cell_op.op),
                    });
                }
            }
            CellOpKind::Remove => {}
        }
    }
    Ok(())
}

/// Conflict detection: the request is stale (`base_vector < update_vector`)
/// and its touched cell ids intersect the union of cell ids touched by
/// history entries with sequence strictly greater than `base_vector`.
pub fn detect_conflict<'a>(
    base_vector: i64,
    update_vector: i64,
    touched: &HashSet<CellId>,
    history: impl IntoIterator<Item = &'a HistoryEntry>,
) -> Option<Vec<CellId>> {
    if base_vector >= update_vector {
        return None;
    }
    let mut affected: Vec<CellId> = Vec::new();
    for entry in history
        .into_iter()
        .filter(|e| e.sequence as i64 > base_vector)
    {
        for id in entry.forward.touched_ids() {
            if touched.contains(&id) && !affected.contains(&id) {
                affected.push(id);
            }
        }
    }
    if affected.is_empty() {
        None
    } else {
        Some(affected)
    }
}

/// Applies `op` to a workspace copy of `cells`, returning the committed
/// map and the computed inverse. Never mutates `cells` directly; the
/// caller commits `Applied::cells` only once every other rejection check
/// has passed.
pub fn apply(cells: &HashMap<CellId, Cell>, op: &Operation) -> Result<Applied, Rejection> {
    validate_shape(op)?;

    let mut workspace = cells.clone();
    let mut inverse_ops: Vec<CellOp> = Vec::with_capacity(op.cells.len());
    let mut touched = HashSet::with_capacity(op.cells.len());

    for cell_op in &op.cells {
        touched.insert(cell_op.id);
        match cell_op.op {
            CellOpKind::Add => {
                if workspace.contains_key(&cell_op.id) {
                    return Err(Rejection::ValidationFailed {
                        details: format!("cell {} already exists", cell_op.id),
                    });
                }
                let data = cell_op.data.clone().unwrap_or(serde_json::Value::Null);
                workspace.insert(
                    cell_op.id,
                    Cell {
                        id: cell_op.id,
                        data,
                    },
                );
                inverse_ops.push(CellOp {
                    id: cell_op.id,
                    op: CellOpKind::Remove,
                    data: None,
                });
            }
            CellOpKind::Update => {
                let prior = workspace.get(&cell_op.id).cloned().ok_or_else(|| {
                    Rejection::ValidationFailed {
                        details: format!("cell {} does not exist", cell_op.id),
                    }
                })?;
                let data = cell_op.data.clone().unwrap_or(serde_json::Value::Null);
                workspace.insert(
                    cell_op.id,
                    Cell {
                        id: cell_op.id,
                        data,
                    },
                );
                inverse_ops.push(CellOp {
                    id: cell_op.id,
                    op: CellOpKind::Update,
                    data: Some(prior.data),
                });
            }
            CellOpKind::Remove => {
                let prior = workspace.remove(&cell_op.id).ok_or_else(|| {
                    Rejection::ValidationFailed {
                        details: format!("cell {} does not exist", cell_op.id),
                    }
                })?;
                inverse_ops.push(CellOp {
                    id: cell_op.id,
                    op: CellOpKind::Add,
                    data: Some(prior.data),
                });
            }
        }
    }

    if workspace == *cells {
        return Err(Rejection::NoStateChange);
    }

    // Inverse undoes in reverse order so a multi-cell batch round-trips.
    inverse_ops.reverse();

    Ok(Applied {
        cells: workspace,
        inverse: Operation::patch(inverse_ops),
        touched,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn add(id: CellId, data: serde_json::Value) -> CellOp {
        CellOp {
            id,
            op: CellOpKind::Add,
            data: Some(data),
        }
    }

    #[test]
    fn empty_operation_rejected() {
        let cells = HashMap::new();
        let op = Operation::patch(vec![]);
        assert!(matches!(apply(&cells, &op), Err(Rejection::EmptyOperation)));
    }

    #[test]
    fn add_then_inverse_is_remove() {
        let cells = HashMap::new();
        let id = CellId::new_v4();
        let op = Operation::patch(vec![add(id, json!({"x": 1}))]);
        let applied = apply(&cells, &op).unwrap();
        assert!(applied.cells.contains_key(&id));
        assert_eq!(applied.inverse.cells.len(), 1);
        assert_eq!(applied.inverse.cells[0].op, CellOpKind::Remove);
    }

    #[test]
    fn update_missing_cell_rejected() {
        let cells = HashMap::new();
        let id = CellId::new_v4();
        let op = Operation::patch(vec![CellOp {
            id,
            op: CellOpKind::Update,
            data: Some(json!({"x": 2})),
        }]);
        assert!(matches!(
            apply(&cells, &op),
            Err(Rejection::ValidationFailed { .. })
        ));
    }

    #[test]
    fn no_op_update_rejected_as_no_state_change() {
        let id = CellId::new_v4();
        let mut cells = HashMap::new();
        cells.insert(
            id,
            Cell {
                id,
                data: json!({"x": 1}),
            },
        );
        let op = Operation::patch(vec![CellOp {
            id,
            op: CellOpKind::Update,
            data: Some(json!({"x": 1})),
        }]);
        assert!(matches!(apply(&cells, &op), Err(Rejection::NoStateChange)));
    }

    #[test]
    fn conflict_detected_when_base_vector_stale_and_overlapping() {
        let id = CellId::new_v4();
        let history = vec![HistoryEntry {
            forward: Operation::patch(vec![add(id, json!({}))]),
            inverse: Operation::patch(vec![]),
            initiator: crate::identity::User::new("google", "1", "a@b.com", "A"),
            operation_id: uuid::Uuid::new_v4(),
            sequence: 5,
        }];
        let touched: HashSet<CellId> = std::iter::once(id).collect();
        let affected = detect_conflict(3, 5, &touched, &history);
        assert_eq!(affected, Some(vec![id]));
    }

    #[test]
    fn no_conflict_when_base_vector_current() {
        let id = CellId::new_v4();
        let touched: HashSet<CellId> = std::iter::once(id).collect();
        assert_eq!(detect_conflict(5, 5, &touched, &[] as &[HistoryEntry]), None);
    }
}
