use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{CurrentUser, Permission},
    config::LifecycleConfig,
    entities::{
        item,
        request::{self, Priority, RequestStatus, RequestType},
        user,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    notifications::{EntityKind, NotificationDispatcher, NotificationType, Transition},
    services::issuance::IssuanceService,
};

/// Input for a new equipment request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmitRequestInput {
    pub item_id: Uuid,
    #[validate(range(min = 1, max = 1000, message = "quantity must be between 1 and 1000"))]
    pub quantity: i32,
    #[serde(default)]
    pub request_type: RequestType,
    #[serde(default)]
    pub priority: Priority,
    #[validate(length(max = 2000))]
    pub purpose: Option<String>,
}

/// Allowed request status changes. `completed` is a manual end state that
/// deployments opt into.
pub fn is_valid_transition(from: RequestStatus, to: RequestStatus, allow_completion: bool) -> bool {
    use RequestStatus::*;

    match (from, to) {
        (Pending, Approved) | (Pending, Denied) => true,
        (Approved, Issued) => true,
        (Issued, Completed) => allow_completion,
        _ => false,
    }
}

fn required_permission(target: RequestStatus) -> Permission {
    match target {
        RequestStatus::Issued => Permission::IssueItems,
        _ => Permission::ApproveRequests,
    }
}

fn transition_notice(target: RequestStatus) -> Option<(Transition, NotificationType)> {
    match target {
        RequestStatus::Approved => Some((Transition::Approved, NotificationType::RequestApproved)),
        RequestStatus::Denied => Some((Transition::Denied, NotificationType::RequestDenied)),
        RequestStatus::Issued => Some((Transition::Issued, NotificationType::ItemIssued)),
        RequestStatus::Completed => Some((Transition::Completed, NotificationType::RequestCompleted)),
        RequestStatus::Pending => None,
    }
}

/// Request lifecycle: submission, approval, denial, issuance and completion
#[derive(Clone)]
pub struct RequestService {
    db: Arc<DatabaseConnection>,
    issuance: IssuanceService,
    dispatcher: NotificationDispatcher,
    event_sender: EventSender,
    lifecycle: LifecycleConfig,
}

impl RequestService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        issuance: IssuanceService,
        dispatcher: NotificationDispatcher,
        event_sender: EventSender,
        lifecycle: LifecycleConfig,
    ) -> Self {
        Self {
            db,
            issuance,
            dispatcher,
            event_sender,
            lifecycle,
        }
    }

    /// Creates a pending request and tells the approvers about it
    #[instrument(skip(self, actor), fields(actor_id = %actor.id, item_id = %input.item_id))]
    pub async fn submit(
        &self,
        input: SubmitRequestInput,
        actor: &CurrentUser,
    ) -> Result<request::Model, ServiceError> {
        actor.require(Permission::RequestItems)?;
        input.validate()?;

        let txn = self.db.begin().await?;

        let item = item::Entity::find_by_id(input.item_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::ValidationError(format!("item {} does not exist", input.item_id))
            })?;
        if item.is_deleted() {
            return Err(ServiceError::ValidationError(format!(
                "item {} is no longer available",
                item.name
            )));
        }

        let requester_name = user::Entity::find_by_id(actor.id)
            .one(&txn)
            .await?
            .map(|u| u.username)
            .unwrap_or_else(|| actor.id.to_string());

        let created = request::ActiveModel {
            id: Set(Uuid::new_v4()),
            item_id: Set(item.id),
            requester_id: Set(actor.id),
            quantity: Set(input.quantity),
            status: Set(RequestStatus::Pending),
            request_type: Set(input.request_type),
            priority: Set(input.priority),
            purpose: Set(input.purpose.clone()),
            issued_item_id: Set(None),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&txn)
        .await?;

        let message = format!(
            "New {} priority request from {} for {} x {}",
            created.priority, requester_name, created.quantity, item.name
        );
        let notifications = self
            .dispatcher
            .fan_out(
                &txn,
                EntityKind::Request,
                Transition::Submitted,
                Some(actor.id),
                NotificationType::RequestSubmitted,
                &message,
                Some(created.id),
            )
            .await?;

        txn.commit().await?;
        info!(request_id = %created.id, "request submitted");

        self.dispatcher.publish_all(&notifications).await;
        self.event_sender
            .send_or_log(Event::RequestSubmitted {
                request_id: created.id,
                item_id: created.item_id,
                requester_id: created.requester_id,
                quantity: created.quantity,
            })
            .await;

        Ok(created)
    }

    /// Moves a request to `new_status`, applying that transition's side effects.
    ///
    /// The status write, any minted units and the notification records commit
    /// together; live delivery happens after the commit.
    #[instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn update_status(
        &self,
        request_id: Uuid,
        new_status: RequestStatus,
        actor: &CurrentUser,
    ) -> Result<request::Model, ServiceError> {
        actor.require(required_permission(new_status))?;

        let txn = self.db.begin().await?;

        // Concurrent transitions of the same request queue behind this row lock.
        let current = request::Entity::find_by_id(request_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Request", request_id))?;
        let old_status = current.status;

        // Replaying issuance must never mint a second batch.
        if old_status == RequestStatus::Issued
            && new_status == RequestStatus::Issued
            && current.issued_item_id.is_some()
        {
            info!(request_id = %request_id, "request already issued; nothing to do");
            txn.commit().await?;
            return Ok(current);
        }

        if old_status.is_terminal()
            || !is_valid_transition(old_status, new_status, self.lifecycle.allow_request_completion)
        {
            error!("Invalid status transition from {} to {}", old_status, new_status);
            return Err(ServiceError::InvalidTransition(format!(
                "Cannot transition request from '{}' to '{}'",
                old_status, new_status
            )));
        }

        // Backends without row locks still get exactly one winner: the claim
        // only matches while the status is the one just validated.
        let claimed = request::Entity::update_many()
            .col_expr(request::Column::Status, Expr::value(new_status))
            .filter(request::Column::Id.eq(request_id))
            .filter(request::Column::Status.eq(old_status))
            .exec(&txn)
            .await?;
        if claimed.rows_affected == 0 {
            return Err(ServiceError::InvalidTransition(format!(
                "request {} left '{}' while being updated",
                request_id, old_status
            )));
        }

        let item = item::Entity::find_by_id(current.item_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Item", current.item_id))?;

        let mut active: request::ActiveModel = current.clone().into();
        active.status = Set(new_status);

        let mut serials = Vec::new();
        let message = match new_status {
            RequestStatus::Issued => {
                let requester = user::Entity::find_by_id(current.requester_id)
                    .one(&txn)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("User", current.requester_id))?;

                let minted = self
                    .issuance
                    .issue_within(&txn, &item, &requester, current.quantity, Some(current.id))
                    .await?;
                active.issued_item_id = Set(minted.first().map(|unit| unit.id));
                serials = minted.into_iter().map(|unit| unit.serial_number).collect();

                format!(
                    "{} x {} issued to you. Serial numbers: {}",
                    current.quantity,
                    item.name,
                    serials.join(", ")
                )
            }
            RequestStatus::Approved => format!(
                "Request for {} x {} has been approved",
                current.quantity, item.name
            ),
            RequestStatus::Denied => format!(
                "Your request for {} x {} has been denied",
                current.quantity, item.name
            ),
            RequestStatus::Completed => {
                format!("Your request for {} has been completed", item.name)
            }
            RequestStatus::Pending => String::new(),
        };

        let updated = active.update(&txn).await?;

        let notifications = match transition_notice(new_status) {
            Some((transition, notification_type)) => {
                self.dispatcher
                    .fan_out(
                        &txn,
                        EntityKind::Request,
                        transition,
                        Some(updated.requester_id),
                        notification_type,
                        &message,
                        Some(updated.id),
                    )
                    .await?
            }
            None => Vec::new(),
        };

        txn.commit().await.map_err(|e| {
            error!("Failed to commit transaction for request {}: {}", request_id, e);
            ServiceError::DatabaseError(e)
        })?;

        info!(
            "Request {} status updated from '{}' to '{}'",
            request_id, old_status, new_status
        );

        self.dispatcher.publish_all(&notifications).await;
        self.event_sender
            .send_or_log(Event::RequestStatusChanged {
                request_id,
                actor_id: actor.id,
                old_status: old_status.to_string(),
                new_status: new_status.to_string(),
            })
            .await;
        if !serials.is_empty() {
            self.event_sender
                .send_or_log(Event::ItemsIssued {
                    request_id: Some(request_id),
                    actor_id: actor.id,
                    serial_numbers: serials,
                })
                .await;
        }

        Ok(updated)
    }

    fn sees_all(actor: &CurrentUser) -> bool {
        actor.can(Permission::ApproveRequests)
            || actor.can(Permission::IssueItems)
            || actor.can(Permission::ViewReports)
    }

    pub async fn get(&self, request_id: Uuid, actor: &CurrentUser) -> Result<request::Model, ServiceError> {
        let found = request::Entity::find_by_id(request_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Request", request_id))?;

        if found.requester_id != actor.id && !Self::sees_all(actor) {
            return Err(ServiceError::PermissionDenied(
                "requests of other users are not visible to this role".to_string(),
            ));
        }
        Ok(found)
    }

    /// Newest first; requesters only see their own
    pub async fn list(
        &self,
        actor: &CurrentUser,
        status: Option<RequestStatus>,
    ) -> Result<Vec<request::Model>, ServiceError> {
        let mut query = request::Entity::find().order_by_desc(request::Column::CreatedAt);
        if !Self::sees_all(actor) {
            query = query.filter(request::Column::RequesterId.eq(actor.id));
        }
        if let Some(status) = status {
            query = query.filter(request::Column::Status.eq(status));
        }
        Ok(query.all(&*self.db).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use sea_orm::Iterable;

    #[rstest]
    #[case(RequestStatus::Pending, RequestStatus::Approved)]
    #[case(RequestStatus::Pending, RequestStatus::Denied)]
    #[case(RequestStatus::Approved, RequestStatus::Issued)]
    fn allows_documented_transitions(#[case] from: RequestStatus, #[case] to: RequestStatus) {
        assert!(is_valid_transition(from, to, false));
    }

    #[test]
    fn rejects_everything_else() {
        let allowed = [
            (RequestStatus::Pending, RequestStatus::Approved),
            (RequestStatus::Pending, RequestStatus::Denied),
            (RequestStatus::Approved, RequestStatus::Issued),
        ];
        for from in RequestStatus::iter() {
            for to in RequestStatus::iter() {
                if !allowed.contains(&(from, to)) {
                    assert!(
                        !is_valid_transition(from, to, false),
                        "{} -> {} should be rejected",
                        from,
                        to
                    );
                }
            }
        }
    }

    #[test]
    fn completion_is_opt_in() {
        assert!(!is_valid_transition(RequestStatus::Issued, RequestStatus::Completed, false));
        assert!(is_valid_transition(RequestStatus::Issued, RequestStatus::Completed, true));
        assert!(!is_valid_transition(RequestStatus::Approved, RequestStatus::Completed, true));
    }

    #[test]
    fn issuing_needs_issue_permission() {
        assert_eq!(required_permission(RequestStatus::Issued), Permission::IssueItems);
        assert_eq!(required_permission(RequestStatus::Denied), Permission::ApproveRequests);
    }
}
