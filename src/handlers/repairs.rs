use std::str::FromStr;

use crate::{
    auth::CurrentUser,
    entities::repair_request::{self, RepairStatus},
    errors::ServiceError,
    services::repairs::SubmitRepairInput,
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
pub struct RepairListQuery {
    /// Filter by status (pending, repair-in-process, repaired, damaged)
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRepairBody {
    pub issued_item_id: Uuid,
    #[schema(example = "Zipper torn on the left side")]
    pub description: String,
    /// Reference to an uploaded photo
    pub image: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateRepairStatusBody {
    #[schema(example = "repair-in-process")]
    pub status: String,
    /// Stored on the damage record when the status is `damaged`
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RepairSummary {
    pub id: Uuid,
    pub issued_item_id: Uuid,
    pub item_id: Uuid,
    pub requester_id: Uuid,
    #[schema(example = "pending")]
    pub status: String,
    pub description: String,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<repair_request::Model> for RepairSummary {
    fn from(model: repair_request::Model) -> Self {
        Self {
            id: model.id,
            issued_item_id: model.issued_item_id,
            item_id: model.item_id,
            requester_id: model.requester_id,
            status: model.status.to_string(),
            description: model.description,
            image: model.image,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

fn parse_repair_status(raw: &str) -> Result<RepairStatus, ServiceError> {
    RepairStatus::from_str(raw.trim())
        .map_err(|_| ServiceError::ValidationError(format!("unknown repair status '{}'", raw)))
}

#[utoipa::path(
    post,
    path = "/api/v1/repair-requests",
    request_body = CreateRepairBody,
    responses(
        (status = 201, description = "Repair request submitted", body = RepairSummary),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Issued item not found", body = crate::errors::ErrorResponse)
    ),
    tag = "repairs"
)]
pub async fn create_repair_request(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(body): Json<CreateRepairBody>,
) -> Result<(StatusCode, Json<ApiResponse<RepairSummary>>), ServiceError> {
    let input = SubmitRepairInput {
        issued_item_id: body.issued_item_id,
        description: body.description,
        image: body.image,
    };
    let created = state.services.repairs.submit(input, &user).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(RepairSummary::from(created))),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/repair-requests",
    params(RepairListQuery),
    responses(
        (status = 200, description = "Repair requests listed", body = [RepairSummary])
    ),
    tag = "repairs"
)]
pub async fn list_repair_requests(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<RepairListQuery>,
) -> ApiResult<Vec<RepairSummary>> {
    let status = query
        .status
        .as_deref()
        .map(parse_repair_status)
        .transpose()?;
    let records = state.services.repairs.list(&user, status).await?;
    Ok(Json(ApiResponse::success(
        records.into_iter().map(RepairSummary::from).collect(),
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/repair-requests/:id",
    params(("id" = Uuid, Path, description = "Repair request ID")),
    responses(
        (status = 200, description = "Repair request fetched", body = RepairSummary),
        (status = 404, description = "Repair request not found", body = crate::errors::ErrorResponse)
    ),
    tag = "repairs"
)]
pub async fn get_repair_request(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<RepairSummary> {
    let found = state.services.repairs.get(id, &user).await?;
    Ok(Json(ApiResponse::success(found.into())))
}

#[utoipa::path(
    put,
    path = "/api/v1/repair-requests/:id/status",
    params(("id" = Uuid, Path, description = "Repair request ID")),
    request_body = UpdateRepairStatusBody,
    responses(
        (status = 200, description = "Status updated", body = RepairSummary),
        (status = 400, description = "Transition not allowed", body = crate::errors::ErrorResponse),
        (status = 403, description = "Only logistics officers complete repairs", body = crate::errors::ErrorResponse),
        (status = 409, description = "Item already marked as damaged", body = crate::errors::ErrorResponse)
    ),
    tag = "repairs"
)]
pub async fn update_repair_status(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateRepairStatusBody>,
) -> ApiResult<RepairSummary> {
    let target = parse_repair_status(&body.status)?;
    let updated = state
        .services
        .repairs
        .update_status(id, target, &user, body.notes)
        .await?;
    Ok(Json(ApiResponse::success(updated.into())))
}
