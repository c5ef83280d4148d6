//! Shared application state handed to every Axum handler.
use std::sync::Arc;

use collab_core::{AuthProvider, Config, Hub, PermissionProvider};

#[derive(Clone)]
pub struct AppState {
    pub hub: Hub,
    pub auth: Arc<dyn AuthProvider>,
    pub permissions: Arc<dyn PermissionProvider>,
    pub config: Config,
}
