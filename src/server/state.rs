use std::sync::Arc;

use crate::share::ShareService;

/// Router state; clones share one service.
#[derive(Clone)]
pub struct AppState {
    pub share: Arc<ShareService>,
}

impl AppState {
    pub fn new(share: Arc<ShareService>) -> Self {
        Self { share }
    }
}
