//! Shared state handed to both the trading wire frontend and the HTTP
//! introspection surface. Both run on their own thread; everything reachable
//! from here is `Arc`-shared and internally synchronized.

use std::sync::Arc;

use crate::coordinator::SubmissionCoordinator;
use crate::registry::Registry;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<SubmissionCoordinator>,
}

impl AppState {
    pub fn new(coordinator: Arc<SubmissionCoordinator>) -> Self {
        Self { coordinator }
    }

    pub fn registry(&self) -> &Registry {
        self.coordinator.registry()
    }
}
