use std::str::FromStr;

use crate::{
    auth::CurrentUser,
    entities::request::{self, Priority, RequestStatus, RequestType},
    errors::ServiceError,
    services::requests::SubmitRequestInput,
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(Debug, Deserialize, Default, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RequestListQuery {
    /// Filter by status (pending, approved, denied, issued, completed)
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRequestBody {
    pub item_id: Uuid,
    #[schema(example = 2)]
    pub quantity: i32,
    #[schema(value_type = Option<String>, example = "new")]
    pub request_type: Option<RequestType>,
    #[schema(value_type = Option<String>, example = "normal")]
    pub priority: Option<Priority>,
    pub purpose: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStatusBody {
    #[schema(example = "approved")]
    pub status: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RequestSummary {
    pub id: Uuid,
    pub item_id: Uuid,
    pub requester_id: Uuid,
    pub quantity: i32,
    #[schema(example = "pending")]
    pub status: String,
    #[schema(example = "new")]
    pub request_type: String,
    #[schema(example = "normal")]
    pub priority: String,
    pub purpose: Option<String>,
    /// First unit issued against this request
    pub issued_item_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<request::Model> for RequestSummary {
    fn from(model: request::Model) -> Self {
        Self {
            id: model.id,
            item_id: model.item_id,
            requester_id: model.requester_id,
            quantity: model.quantity,
            status: model.status.to_string(),
            request_type: model.request_type.to_string(),
            priority: model.priority.to_string(),
            purpose: model.purpose,
            issued_item_id: model.issued_item_id,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

pub(crate) fn parse_request_status(raw: &str) -> Result<RequestStatus, ServiceError> {
    RequestStatus::from_str(raw.trim())
        .map_err(|_| ServiceError::ValidationError(format!("unknown request status '{}'", raw)))
}

#[utoipa::path(
    post,
    path = "/api/v1/requests",
    request_body = CreateRequestBody,
    responses(
        (status = 201, description = "Request submitted", body = RequestSummary),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse)
    ),
    tag = "requests"
)]
pub async fn create_request(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(body): Json<CreateRequestBody>,
) -> Result<(StatusCode, Json<ApiResponse<RequestSummary>>), ServiceError> {
    let input = SubmitRequestInput {
        item_id: body.item_id,
        quantity: body.quantity,
        request_type: body.request_type.unwrap_or_default(),
        priority: body.priority.unwrap_or_default(),
        purpose: body.purpose,
    };

    let created = state.services.requests.submit(input, &user).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(RequestSummary::from(created))),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/requests",
    params(RequestListQuery),
    responses(
        (status = 200, description = "Requests listed", body = [RequestSummary]),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    tag = "requests"
)]
pub async fn list_requests(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<RequestListQuery>,
) -> ApiResult<Vec<RequestSummary>> {
    let status = query
        .status
        .as_deref()
        .map(parse_request_status)
        .transpose()?;

    let records = state.services.requests.list(&user, status).await?;
    Ok(Json(ApiResponse::success(
        records.into_iter().map(RequestSummary::from).collect(),
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/requests/:id",
    params(("id" = Uuid, Path, description = "Request ID")),
    responses(
        (status = 200, description = "Request fetched", body = RequestSummary),
        (status = 404, description = "Request not found", body = crate::errors::ErrorResponse)
    ),
    tag = "requests"
)]
pub async fn get_request(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<RequestSummary> {
    let found = state.services.requests.get(id, &user).await?;
    Ok(Json(ApiResponse::success(found.into())))
}

#[utoipa::path(
    put,
    path = "/api/v1/requests/:id/status",
    params(("id" = Uuid, Path, description = "Request ID")),
    request_body = UpdateStatusBody,
    responses(
        (status = 200, description = "Status updated", body = RequestSummary),
        (status = 400, description = "Transition not allowed", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Request not found", body = crate::errors::ErrorResponse)
    ),
    tag = "requests"
)]
pub async fn update_request_status(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateStatusBody>,
) -> ApiResult<RequestSummary> {
    let target = parse_request_status(&body.status)?;
    let updated = state
        .services
        .requests
        .update_status(id, target, &user)
        .await?;
    Ok(Json(ApiResponse::success(updated.into())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn parses_known_statuses() {
        assert_eq!(parse_request_status("approved").ok(), Some(RequestStatus::Approved));
        assert_eq!(parse_request_status(" issued ").ok(), Some(RequestStatus::Issued));
        assert_matches!(
            parse_request_status("shipped"),
            Err(ServiceError::ValidationError(_))
        );
    }
}
