//! Reference `PermissionProvider`: grants writer access by default and
//! reader access when the connection explicitly asks for it. Resolving
//! real per-diagram ACLs against a threat-modeling backend is out of
//! scope for this core.
use async_trait::async_trait;
use collab_core::{DiagramPermission, PermissionProvider, PortError, User};
use uuid::Uuid;

pub struct StaticPermissionProvider {
    pub force_reader: bool,
}

#[async_trait]
impl PermissionProvider for StaticPermissionProvider {
    async fn permission_for(
        &self,
        _user: &User,
        _threat_model_id: Uuid,
        _diagram_id: Uuid,
    ) -> Result<DiagramPermission, PortError> {
        Ok(if self.force_reader {
            DiagramPermission::Reader
        } else {
            DiagramPermission::Writer
        })
    }
}
