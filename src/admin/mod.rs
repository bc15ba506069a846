//! Admin status endpoint.
//!
//! ```text
//! GET /admin/status   (Authorization: Bearer <api_key>)
//!     → StatusInfo as JSON
//! ```

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{middleware, routing::get, Router};

use crate::watcher::WatcherPlugin;

use self::auth::admin_auth_middleware;
use self::handlers::get_status;

/// Shared state of the admin router.
#[derive(Clone)]
pub struct AdminState {
    pub watcher: Arc<dyn WatcherPlugin>,
    pub api_key: Arc<str>,
}

pub fn setup_admin_router(watcher: Arc<dyn WatcherPlugin>, api_key: &str) -> Router {
    let state = AdminState {
        watcher,
        api_key: Arc::from(api_key),
    };
    Router::new()
        .route("/admin/status", get(get_status))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ))
        .with_state(state)
}
