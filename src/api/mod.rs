//! # Keypad HTTP Surface
//!
//! The request/response side the keypad talks to. Each route is a thin adapter over the
//! core services; no route holds state of its own.
//!
//! | Route              | Purpose                                               |
//! |--------------------|-------------------------------------------------------|
//! | `POST /api/command`| Issue an arm or disarm command and wait for its result |
//! | `GET /api/state`   | Last known panel state                                |
//! | `GET /api/sensors` | Door and window sensors, `?open_only=true` to filter  |
//! | `GET /ws`          | Push channel for state changes and shared failures    |
//! | `GET /healthz`     | Liveness plus broker connection state                 |

pub mod handlers;
pub mod push;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::sync::watch;

use crate::broadcast::BroadcasterHandle;
use crate::correlator::CommandCorrelator;
use crate::mqtt::BusStatus;
use crate::sensors::SensorProxy;

pub use handlers::CommandResponse;

/// Shared services handed to every route.
#[derive(Clone)]
pub struct AppState {
    pub correlator: Arc<CommandCorrelator>,
    pub broadcaster: BroadcasterHandle,
    pub sensors: Arc<SensorProxy>,
    pub bus_status: watch::Receiver<BusStatus>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/command", post(handlers::command))
        .route("/api/state", get(handlers::current_state))
        .route("/api/sensors", get(handlers::sensors))
        .route("/healthz", get(handlers::health))
        .route("/ws", get(push::ws_handler))
        .with_state(state)
}
