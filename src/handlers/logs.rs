use crate::{auth::CurrentUser, entities::activity_log, ApiResponse, ApiResult, AppState};
use axum::{
    extract::{Query, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

const DEFAULT_LIMIT: u64 = 100;

#[derive(Debug, Deserialize, Default, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LogQuery {
    pub limit: Option<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ActivityEntry {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    #[schema(example = "request_status_changed")]
    pub action: String,
    pub details: String,
    pub timestamp: DateTime<Utc>,
}

impl From<activity_log::Model> for ActivityEntry {
    fn from(model: activity_log::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            action: model.action,
            details: model.details,
            timestamp: model.timestamp,
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/logs",
    params(LogQuery),
    responses(
        (status = 200, description = "Most recent activity first", body = [ActivityEntry]),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse)
    ),
    tag = "logs"
)]
pub async fn list_logs(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<LogQuery>,
) -> ApiResult<Vec<ActivityEntry>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    let records = state.services.logs.list(&user, limit).await?;
    Ok(Json(ApiResponse::success(
        records.into_iter().map(ActivityEntry::from).collect(),
    )))
}
