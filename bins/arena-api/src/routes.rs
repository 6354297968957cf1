// Route table for the Arena API

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/challenges", get(handlers::list_challenges))
        .route("/challenges/:id", get(handlers::get_challenge))
        .route("/challenges/:id/run", post(handlers::run_challenge))
        .route("/challenges/:id/submit", post(handlers::submit_challenge))
        .route("/job/:job_id", get(handlers::get_job_result))
        .route("/users/:user_id/stats", get(handlers::user_stats))
        .route("/status", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics))
}
