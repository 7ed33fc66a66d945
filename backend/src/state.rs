use std::sync::Arc;

use crate::{config::Config, repositories::user::UserStore, services::session::SessionService};

/// Shared application state handed to every handler and the auth guard.
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub sessions: Arc<SessionService>,
    pub config: Config,
}

impl AppState {
    pub fn new(users: Arc<dyn UserStore>, sessions: Arc<SessionService>, config: Config) -> Self {
        Self {
            users,
            sessions,
            config,
        }
    }
}
