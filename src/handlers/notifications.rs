use crate::{
    auth::CurrentUser, entities::notification, notifications::NotificationDispatcher,
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(Debug, Deserialize, Default, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NotificationQuery {
    /// Only unread notifications (defaults to true)
    pub unread: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NotificationView {
    pub id: Uuid,
    pub message: String,
    #[schema(example = "request_approved")]
    pub notification_type: String,
    pub request_id: Option<Uuid>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    /// Same document a live subscriber receives
    #[schema(value_type = Object)]
    pub payload: serde_json::Value,
}

impl From<notification::Model> for NotificationView {
    fn from(model: notification::Model) -> Self {
        let payload = NotificationDispatcher::payload(&model);
        Self {
            id: model.id,
            message: model.message,
            notification_type: model.notification_type,
            request_id: model.request_id,
            is_read: model.is_read,
            created_at: model.created_at,
            payload,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MarkAllReadResult {
    pub updated: u64,
}

#[utoipa::path(
    get,
    path = "/api/v1/notifications",
    params(NotificationQuery),
    responses(
        (status = 200, description = "Notifications of the caller, newest first", body = [NotificationView])
    ),
    tag = "notifications"
)]
pub async fn list_notifications(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<NotificationQuery>,
) -> ApiResult<Vec<NotificationView>> {
    let unread_only = query.unread.unwrap_or(true);
    let records = state
        .services
        .notifications
        .list(user.id, unread_only)
        .await?;
    Ok(Json(ApiResponse::success(
        records.into_iter().map(NotificationView::from).collect(),
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/notifications/:id/read",
    params(("id" = Uuid, Path, description = "Notification ID")),
    responses(
        (status = 200, description = "Notification marked as read", body = NotificationView),
        (status = 403, description = "Notification belongs to another user", body = crate::errors::ErrorResponse),
        (status = 404, description = "Notification not found", body = crate::errors::ErrorResponse)
    ),
    tag = "notifications"
)]
pub async fn mark_read(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<NotificationView> {
    let updated = state.services.notifications.mark_read(id, &user).await?;
    Ok(Json(ApiResponse::success(updated.into())))
}

#[utoipa::path(
    post,
    path = "/api/v1/notifications/read-all",
    responses(
        (status = 200, description = "Number of notifications flipped to read", body = MarkAllReadResult)
    ),
    tag = "notifications"
)]
pub async fn mark_all_read(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<MarkAllReadResult> {
    let updated = state.services.notifications.mark_all_read(&user).await?;
    Ok(Json(ApiResponse::success(MarkAllReadResult { updated })))
}
