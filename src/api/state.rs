//! API shared state

use std::ops::Deref;
use std::sync::Arc;

use crate::control_plane::ControlPlane;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    plane: Arc<ControlPlane>,
}

impl ApiState {
    pub fn new(plane: Arc<ControlPlane>) -> Self {
        Self { plane }
    }
}

impl Deref for ApiState {
    type Target = ControlPlane;

    fn deref(&self) -> &Self::Target {
        &self.plane
    }
}
