use axum::{response::Json, routing::get, Router};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Equipment Tracker API",
        version = "0.1.0",
        description = r#"
# Equipment Tracker API

Unit leaders request equipment and repairs; administrators approve; logistics
officers issue serial-numbered units, run repairs and record damage.

## Identity

Every `/api/v1` call carries the caller's user id in the `x-user-id` header.
Permissions follow the caller's role.

## Notifications

Lifecycle changes store a notification per recipient and push the same
document to the live channel `user_{id}_notifications`. Clients that miss a
push reconcile through `GET /api/v1/notifications`.
        "#
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "requests", description = "Equipment request lifecycle"),
        (name = "repairs", description = "Repair request lifecycle"),
        (name = "issued-items", description = "Serial-numbered units and damage"),
        (name = "notifications", description = "Per-user notifications"),
        (name = "items", description = "Item catalog"),
        (name = "logs", description = "Activity log")
    ),
    paths(
        crate::handlers::requests::create_request,
        crate::handlers::requests::list_requests,
        crate::handlers::requests::get_request,
        crate::handlers::requests::update_request_status,

        crate::handlers::repairs::create_repair_request,
        crate::handlers::repairs::list_repair_requests,
        crate::handlers::repairs::get_repair_request,
        crate::handlers::repairs::update_repair_status,

        crate::handlers::issued_items::list_issued_items,
        crate::handlers::issued_items::mark_damaged,

        crate::handlers::notifications::list_notifications,
        crate::handlers::notifications::mark_read,
        crate::handlers::notifications::mark_all_read,

        crate::handlers::items::create_item,
        crate::handlers::items::list_items,
        crate::handlers::items::delete_item,

        crate::handlers::logs::list_logs
    ),
    components(
        schemas(
            crate::ResponseMeta,

            crate::handlers::requests::CreateRequestBody,
            crate::handlers::requests::UpdateStatusBody,
            crate::handlers::requests::RequestSummary,

            crate::handlers::repairs::CreateRepairBody,
            crate::handlers::repairs::UpdateRepairStatusBody,
            crate::handlers::repairs::RepairSummary,

            crate::handlers::issued_items::MarkDamagedBody,
            crate::handlers::issued_items::IssuedItemSummary,
            crate::handlers::issued_items::DamageRecord,

            crate::handlers::notifications::NotificationView,
            crate::handlers::notifications::MarkAllReadResult,

            crate::handlers::items::CreateItemBody,
            crate::handlers::items::ItemSummary,

            crate::handlers::logs::ActivityEntry,

            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

/// Serves the generated document at `/api-docs/openapi.json`
pub fn docs_routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route(
        "/api-docs/openapi.json",
        get(|| async { Json(ApiDocV1::openapi()) }),
    )
}
