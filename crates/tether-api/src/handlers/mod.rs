//! HTTP and WebSocket handlers.

pub mod query;
pub mod signaling;
pub mod socket;
pub mod status;

use std::sync::Arc;

use tether_services::{Bridge, Router, Signaler};

#[derive(Clone)]
pub struct ApiState {
    pub bridge: Arc<Bridge>,
    pub router: Arc<Router>,
    /// None when peer channels are disabled.
    pub signaler: Option<Arc<Signaler>>,
}

impl ApiState {
    pub fn new(router: Arc<Router>, signaler: Option<Arc<Signaler>>) -> Self {
        Self {
            bridge: router.bridge().clone(),
            router,
            signaler,
        }
    }
}

// Re-export handler functions for use in router setup.
pub use query::{handle_ping, handle_query};
pub use signaling::handle_offer;
pub use socket::handle_socket;
pub use status::handle_status;
