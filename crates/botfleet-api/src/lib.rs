//! botfleet-api — operator REST API for the fleet controller.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/api/v1/cycle` | Start a control cycle now (409 if one is running) |
//! | GET | `/api/v1/status` | Fleet status snapshot |
//! | GET | `/api/v1/workers` | Running and disabled worker sets |
//! | GET | `/api/v1/hosts/{index}` | Raw status document of one host |
//! | GET | `/metrics` | Prometheus exposition |

pub mod handlers;
pub mod prometheus;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use botfleet_controller::Controller;

pub use prometheus::render_prometheus;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub controller: Arc<Controller>,
}

/// Build the complete API router (REST + metrics).
pub fn build_router(controller: Arc<Controller>) -> Router {
    let state = ApiState { controller };

    let api_routes = Router::new()
        .route("/cycle", post(handlers::trigger_cycle))
        .route("/status", get(handlers::get_status))
        .route("/workers", get(handlers::list_workers))
        .route("/hosts/{index}", get(handlers::get_host))
        .with_state(state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::prometheus_metrics).with_state(state))
}
