//! Shared handler state.

use std::sync::Arc;

use crate::controller::MetadataController;

/// State handed to every HTTP handler.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<MetadataController>,
    /// Trust `X-Forwarded-For` for the client identity.
    pub xff: bool,
}

impl AppState {
    pub fn new(controller: Arc<MetadataController>, xff: bool) -> Self {
        Self { controller, xff }
    }
}
