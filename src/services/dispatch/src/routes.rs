//! Routes module for the dispatch service
//!
//! This module defines all HTTP routes for the dispatch service:
//! - Notification intake and lookup
//! - Background job triggers
//! - Health and metrics endpoints

use crate::controller::JobController;
use crate::handlers::{health_handler, jobs_handler, metrics_handler, notifications_handler};

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};

/// Build the main router for the dispatch service
pub fn create_router(controller: Arc<JobController>) -> Router {
    let api_router = create_api_router(Arc::clone(&controller));
    let health_router = create_health_router(controller);

    // Main router with middleware
    Router::new()
        .merge(api_router)
        .merge(health_router)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(CompressionLayer::new())
                .layer(TimeoutLayer::new(Duration::from_secs(30)))
                .into_inner(),
        )
}

/// Create API routes for REST endpoints
fn create_api_router(controller: Arc<JobController>) -> Router {
    Router::new()
        // Notification endpoints
        .route(
            "/api/v1/notifications",
            post(notifications_handler::create_notification),
        )
        .route(
            "/api/v1/notifications",
            get(notifications_handler::list_notifications),
        )
        .route(
            "/api/v1/notifications/:id",
            get(notifications_handler::get_notification),
        )
        // Job trigger endpoints
        .route(
            "/api/v1/jobs/process-pending",
            post(jobs_handler::process_pending),
        )
        .route(
            "/api/v1/jobs/retry-failed",
            post(jobs_handler::retry_failed),
        )
        .with_state(controller)
}

/// Create health and metrics routes
fn create_health_router(controller: Arc<JobController>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(controller)
}
