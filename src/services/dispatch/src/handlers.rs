//! Request handlers for the dispatch service
//!
//! This module contains all HTTP request handlers for the dispatch API:
//! - Notification intake and lookup handlers
//! - Job trigger handlers
//! - Health and metrics handlers

use crate::controller::JobController;
use crate::error::{DispatchError, Result};
use relay_shared::{CreateNotificationRequest, JobKind, NotificationFilter, NotificationStatus};

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

pub mod notifications_handler {
    use super::*;

    #[derive(Debug, Deserialize)]
    pub struct ListQuery {
        pub user_id: Option<i64>,
        pub status: Option<NotificationStatus>,
        pub limit: Option<u32>,
        pub offset: Option<u32>,
    }

    impl From<ListQuery> for NotificationFilter {
        fn from(query: ListQuery) -> Self {
            NotificationFilter {
                user_id: query.user_id,
                status: query.status,
                limit: query.limit,
                offset: query.offset,
            }
        }
    }

    /// Accept a new notification for delivery.
    pub async fn create_notification(
        State(controller): State<Arc<JobController>>,
        Json(request): Json<CreateNotificationRequest>,
    ) -> Result<impl IntoResponse> {
        info!("Creating notification for user: {}", request.user_id);

        match controller.create_notification(request).await {
            Ok(record) => {
                info!("Notification created successfully: {}", record.id);
                Ok((StatusCode::CREATED, Json(record)))
            }
            Err(e) => {
                error!("Failed to create notification: {}", e);
                Err(e)
            }
        }
    }

    /// Get a notification by ID.
    pub async fn get_notification(
        State(controller): State<Arc<JobController>>,
        Path(id): Path<Uuid>,
    ) -> Result<impl IntoResponse> {
        match controller.get_notification(id).await? {
            Some(record) => Ok(Json(record)),
            None => Err(DispatchError::not_found("notification")),
        }
    }

    /// List notifications with optional filtering.
    pub async fn list_notifications(
        State(controller): State<Arc<JobController>>,
        Query(query): Query<ListQuery>,
    ) -> Result<impl IntoResponse> {
        match controller.list_notifications(query.into()).await {
            Ok(records) => {
                info!("Retrieved {} notifications", records.len());
                Ok(Json(records))
            }
            Err(e) => {
                error!("Failed to list notifications: {}", e);
                Err(e)
            }
        }
    }
}

pub mod jobs_handler {
    use super::*;

    /// Trigger a pending sweep. Returns immediately with an acknowledgement.
    pub async fn process_pending(
        State(controller): State<Arc<JobController>>,
    ) -> Result<impl IntoResponse> {
        let ack = controller.trigger(JobKind::ProcessPending);
        Ok((StatusCode::ACCEPTED, Json(ack)))
    }

    /// Trigger a retry sweep. Returns immediately with an acknowledgement.
    pub async fn retry_failed(
        State(controller): State<Arc<JobController>>,
    ) -> Result<impl IntoResponse> {
        let ack = controller.trigger(JobKind::RetryFailed);
        Ok((StatusCode::ACCEPTED, Json(ack)))
    }
}

/// Health check handler
pub async fn health_handler(
    State(controller): State<Arc<JobController>>,
) -> Result<impl IntoResponse> {
    let (channel_name, channel_healthy) = controller.channel_health().await;

    match controller.status_counts().await {
        Ok(counts) => {
            let status = if channel_healthy {
                "healthy"
            } else {
                "degraded"
            };
            Ok(Json(serde_json::json!({
                "status": status,
                "service": "relay-dispatch",
                "channel": {
                    "name": channel_name,
                    "healthy": channel_healthy,
                },
                "records": counts,
                "timestamp": chrono::Utc::now(),
            })))
        }
        Err(e) => {
            error!("Health check failed: {}", e);
            Err(e)
        }
    }
}

/// Prometheus metrics handler
pub async fn metrics_handler(
    State(controller): State<Arc<JobController>>,
) -> Result<impl IntoResponse> {
    let body = controller.metrics().export_metrics()?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}
