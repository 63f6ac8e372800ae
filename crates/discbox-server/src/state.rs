use std::sync::Arc;

use discbox::{Config, Scheduler};

/// Shared application state handed to every handler.
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub config: Arc<Config>,
}
