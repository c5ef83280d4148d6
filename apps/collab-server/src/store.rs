//! Reference `DiagramStore`: diagrams live in memory for the lifetime of
//! the process. Real deployments put a real persistence engine behind
//! this trait; that engine's design is out of scope here.
use std::collections::HashMap;

use async_trait::async_trait;
use collab_core::{Cell, CellId, DiagramStore, Operation, PortError};
use parking_lot::Mutex;
use uuid::Uuid;

pub struct InMemoryDiagramStore {
    diagrams: Mutex<HashMap<Uuid, (HashMap<CellId, Cell>, i64)>>,
}

impl InMemoryDiagramStore {
    pub fn new() -> Self {
        Self {
            diagrams: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryDiagramStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DiagramStore for InMemoryDiagramStore {
    async fn load_diagram(
        &self,
        _threat_model_id: Uuid,
        diagram_id: Uuid,
    ) -> Result<(HashMap<CellId, Cell>, i64), PortError> {
        let diagrams = self.diagrams.lock();
        Ok(diagrams
            .get(&diagram_id)
            .cloned()
            .unwrap_or_else(|| (HashMap::new(), 0)))
    }

    async fn persist_operation(
        &self,
        diagram_id: Uuid,
        operation: &Operation,
        new_update_vector: i64,
    ) -> Result<(), PortError> {
        let mut diagrams = self.diagrams.lock();
        let (cells, vector) = diagrams.entry(diagram_id).or_insert_with(|| (HashMap::new(), 0));
        for cell_op in &operation.cells {
            match cell_op.op {
                collab_core::CellOpKind::Add | collab_core::CellOpKind::Update => {
                    let data = cell_op.data.clone().unwrap_or(serde_json::Value::Null);
                    cells.insert(
                        cell_op.id,
                        Cell {
                            id: cell_op.id,
                            data,
                        },
                    );
                }
                collab_core::CellOpKind::Remove => {
                    cells.remove(&cell_op.id);
                }
            }
        }
        *vector = new_update_vector;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use collab_core::{CellOp, CellOpKind};

    #[tokio::test]
    async fn persists_then_reloads() {
        let store = InMemoryDiagramStore::new();
        let diagram_id = Uuid::new_v4();
        let cell_id = Uuid::new_v4();
        let op = Operation::patch(vec![CellOp {
            id: cell_id,
            op: CellOpKind::Add,
            data: Some(serde_json::json!({"x": 1})),
        }]);
        store.persist_operation(diagram_id, &op, 1).await.unwrap();
        let (cells, vector) = store.load_diagram(Uuid::new_v4(), diagram_id).await.unwrap();
        assert_eq!(vector, 1);
        assert!(cells.contains_key(&cell_id));
    }
}
