use crate::{
    auth::CurrentUser,
    entities::{damaged_item, issued_item},
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(Debug, Deserialize, Default, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct IssuedItemQuery {
    /// Holder filter, honoured for roles that can see every unit
    pub assigned_to: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct MarkDamagedBody {
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IssuedItemSummary {
    pub id: Uuid,
    pub item_id: Uuid,
    pub request_id: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub assigned_at: DateTime<Utc>,
    #[schema(example = "NPC/ALPHA/MS/FAK/001")]
    pub serial_number: String,
    pub expiration_date: Option<NaiveDate>,
}

impl From<issued_item::Model> for IssuedItemSummary {
    fn from(model: issued_item::Model) -> Self {
        Self {
            id: model.id,
            item_id: model.item_id,
            request_id: model.request_id,
            assigned_to: model.assigned_to,
            assigned_at: model.assigned_at,
            serial_number: model.serial_number,
            expiration_date: model.expiration_date,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DamageRecord {
    pub id: Uuid,
    pub issued_item_id: Uuid,
    pub repair_request_id: Option<Uuid>,
    pub marked_by: Uuid,
    pub notes: Option<String>,
    pub marked_at: DateTime<Utc>,
}

impl From<damaged_item::Model> for DamageRecord {
    fn from(model: damaged_item::Model) -> Self {
        Self {
            id: model.id,
            issued_item_id: model.issued_item_id,
            repair_request_id: model.repair_request_id,
            marked_by: model.marked_by,
            notes: model.notes,
            marked_at: model.marked_at,
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/issued-items",
    params(IssuedItemQuery),
    responses(
        (status = 200, description = "Issued units listed", body = [IssuedItemSummary])
    ),
    tag = "issued-items"
)]
pub async fn list_issued_items(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<IssuedItemQuery>,
) -> ApiResult<Vec<IssuedItemSummary>> {
    let records = state
        .services
        .issuance
        .list_for(&user, query.assigned_to)
        .await?;
    Ok(Json(ApiResponse::success(
        records.into_iter().map(IssuedItemSummary::from).collect(),
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/issued-items/:id/damage",
    params(("id" = Uuid, Path, description = "Issued item ID")),
    request_body = MarkDamagedBody,
    responses(
        (status = 200, description = "Unit marked as damaged", body = DamageRecord),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Issued item not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Already marked as damaged", body = crate::errors::ErrorResponse)
    ),
    tag = "issued-items"
)]
pub async fn mark_damaged(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    body: Option<Json<MarkDamagedBody>>,
) -> ApiResult<DamageRecord> {
    let notes = body.and_then(|Json(body)| body.notes);
    let damaged = state
        .services
        .issuance
        .mark_damaged(id, &user, notes)
        .await?;
    Ok(Json(ApiResponse::success(damaged.into())))
}
