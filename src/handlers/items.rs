use crate::{
    auth::CurrentUser, entities::item, errors::ServiceError, services::items::CreateItemInput,
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(Debug, Deserialize, Default, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ItemListQuery {
    #[serde(default)]
    pub include_deleted: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateItemBody {
    #[schema(example = "First Aid Kit")]
    pub name: String,
    #[schema(example = "Medical Supplies")]
    pub category: String,
    #[schema(example = 10)]
    pub quantity: i32,
    pub expiration_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ItemSummary {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    /// Units in stock
    pub quantity: i32,
    #[schema(example = "available")]
    pub status: String,
    pub expiration_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<item::Model> for ItemSummary {
    fn from(model: item::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            category: model.category,
            quantity: model.quantity,
            status: model.status.to_string(),
            expiration_date: model.expiration_date,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/items",
    request_body = CreateItemBody,
    responses(
        (status = 201, description = "Item created", body = ItemSummary),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse)
    ),
    tag = "items"
)]
pub async fn create_item(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(body): Json<CreateItemBody>,
) -> Result<(StatusCode, Json<ApiResponse<ItemSummary>>), ServiceError> {
    let input = CreateItemInput {
        name: body.name,
        category: body.category,
        quantity: body.quantity,
        expiration_date: body.expiration_date,
    };
    let created = state.services.items.create_item(input, &user).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(ItemSummary::from(created))),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/items",
    params(ItemListQuery),
    responses(
        (status = 200, description = "Catalog listed", body = [ItemSummary])
    ),
    tag = "items"
)]
pub async fn list_items(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(query): Query<ItemListQuery>,
) -> ApiResult<Vec<ItemSummary>> {
    let records = state.services.items.list_items(query.include_deleted).await?;
    Ok(Json(ApiResponse::success(
        records.into_iter().map(ItemSummary::from).collect(),
    )))
}

#[utoipa::path(
    delete,
    path = "/api/v1/items/:id",
    params(("id" = Uuid, Path, description = "Item ID")),
    responses(
        (status = 200, description = "Item soft-deleted", body = ItemSummary),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Item not found", body = crate::errors::ErrorResponse)
    ),
    tag = "items"
)]
pub async fn delete_item(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<ItemSummary> {
    let deleted = state.services.items.delete_item(id, &user).await?;
    Ok(Json(ApiResponse::success(deleted.into())))
}
